use anyhow::{Context, Result};
use duct::cmd;
use std::path::Path;

fn run_tar(args: Vec<std::ffi::OsString>, what: &str) -> Result<()> {
    let output = cmd("tar", args)
        .stdout_null()
        .stderr_capture()
        .stdin_null()
        .unchecked()
        .run()
        .with_context(|| format!("Failed to run tar while {}", what))?;

    if !output.status.success() {
        anyhow::bail!(
            "tar failed while {}: {}",
            what,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Pack `parent/dir_name` into a gzip tarball whose entries start with `dir_name/`.
pub fn pack_dir(parent: &Path, dir_name: &str, archive: &Path) -> Result<()> {
    run_tar(
        vec![
            "-czf".into(),
            archive.into(),
            "-C".into(),
            parent.into(),
            dir_name.into(),
        ],
        &format!("packing {}", archive.display()),
    )
}

/// Extract a gzip tarball into `into`.
pub fn unpack(archive: &Path, into: &Path) -> Result<()> {
    std::fs::create_dir_all(into)
        .with_context(|| format!("creating {}", into.display()))?;
    run_tar(
        vec!["-xzf".into(), archive.into(), "-C".into(), into.into()],
        &format!("unpacking {}", archive.display()),
    )
}
