use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for aptpack

/// Get the aptpack config directory
pub fn aptpack_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("aptpack");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Get the aptpack data directory
pub fn aptpack_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("aptpack");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

/// Directory holding the remote command journal
pub fn command_journal_dir() -> Result<PathBuf> {
    let logs_dir = aptpack_data_dir()?.join("remote_logs");
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating remote logs directory at {}", logs_dir.display()))?;
    Ok(logs_dir)
}
