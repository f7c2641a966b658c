use anyhow::{Context, Result};
use duct::cmd;
use std::path::Path;

use crate::common::{create_spinner, finish_spinner_with_success};
use crate::ui::prelude::*;

/// Clone the metadata repository holding the `package.list` tree.
///
/// An existing checkout is reused as is; refreshing it is left to the
/// operator.
pub fn clone_metadata(url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        emit(
            Level::Info,
            "metadata.clone.skip",
            &format!("Using existing metadata checkout at {}", dest.display()),
            None,
        );
        return Ok(());
    }

    let pb = create_spinner(format!("Cloning {}...", url));
    let output = cmd!("git", "clone", url, dest)
        .stdout_capture()
        .stderr_capture()
        .stdin_null()
        .unchecked()
        .run()
        .context("Failed to run git clone")?;

    if !output.status.success() {
        pb.finish_and_clear();
        anyhow::bail!(
            "Failed to clone {}: {}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    finish_spinner_with_success(pb, format!("Cloned metadata into {}", dest.display()));
    Ok(())
}
