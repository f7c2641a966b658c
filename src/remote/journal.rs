use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;

use crate::common::paths;

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteCommandLog {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub command: String,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
}

/// Append-only JSONL record of every remote command, written only in debug
/// mode. Operators diff it against the ledger when a package goes missing.
#[derive(Debug, Clone)]
pub struct CommandJournal {
    log_file: Option<PathBuf>,
}

impl CommandJournal {
    pub fn new() -> Result<Self> {
        if !crate::ui::is_debug_enabled() {
            return Ok(Self::disabled());
        }
        Self::in_dir(paths::command_journal_dir()?)
    }

    pub fn in_dir(log_dir: PathBuf) -> Result<Self> {
        create_dir_all(&log_dir).context("Failed to create remote log directory")?;
        Ok(Self {
            log_file: Some(log_dir.join("remote_commands.jsonl")),
        })
    }

    pub fn disabled() -> Self {
        Self { log_file: None }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    pub fn record(
        &self,
        host: &str,
        command: &str,
        stdout: &[String],
        stderr: &[String],
        exit_code: Option<i32>,
    ) -> Result<()> {
        let Some(log_file) = &self.log_file else {
            return Ok(());
        };

        let log_entry = RemoteCommandLog {
            timestamp: Utc::now(),
            host: host.to_string(),
            command: command.to_string(),
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit_code,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("Failed to open remote command log")?;

        let json_line =
            serde_json::to_string(&log_entry).context("Failed to serialize remote command log")?;

        writeln!(file, "{json_line}").context("Failed to write to remote command log")?;

        Ok(())
    }
}
