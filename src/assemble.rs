//! Local repository assembly with `reprepro`.

use anyhow::{Context, Result};
use duct::cmd;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::config::RepositoryConfig;
use crate::ui::prelude::*;

/// `conf/distributions` for a single-distribution repository.
pub fn distributions_content(config: &RepositoryConfig) -> String {
    format!(
        "Codename: {}\nSuite: {}\nComponents: {}\nArchitectures: {}\n",
        config.codename,
        config.suite,
        config.components.join(" "),
        config.architectures.join(" ")
    )
}

/// All `.deb` files directly inside `dir`, sorted.
pub fn find_debs(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir_str = dir
        .to_str()
        .with_context(|| format!("non UTF-8 path {}", dir.display()))?;
    let pattern = format!("{}/*.deb", glob::Pattern::escape(dir_str));
    let mut debs: Vec<PathBuf> = glob::glob(&pattern)
        .context("building .deb glob")?
        .filter_map(|p| p.ok())
        .collect();
    debs.sort();
    Ok(debs)
}

#[derive(Debug, Default)]
pub struct AssemblyReport {
    pub included: usize,
    pub rejected: Vec<PathBuf>,
}

pub struct RepositoryAssembler {
    repo_dir: PathBuf,
    config: RepositoryConfig,
}

impl RepositoryAssembler {
    pub fn new(repo_dir: PathBuf, config: RepositoryConfig) -> Self {
        Self { repo_dir, config }
    }

    /// Fresh `conf/` and `incoming/` plus the distributions file. A stale
    /// repository from an earlier run is removed first.
    pub fn create_layout(&self) -> Result<()> {
        if self.repo_dir.exists() {
            fs::remove_dir_all(&self.repo_dir)
                .with_context(|| format!("removing stale {}", self.repo_dir.display()))?;
        }
        fs::create_dir_all(self.repo_dir.join("conf"))
            .context("creating repository conf directory")?;
        fs::create_dir_all(self.repo_dir.join("incoming"))
            .context("creating repository incoming directory")?;
        fs::write(
            self.repo_dir.join("conf/distributions"),
            distributions_content(&self.config),
        )
        .context("writing conf/distributions")?;
        Ok(())
    }

    /// Feed every `.deb` to `reprepro includedeb`, one at a time so that a
    /// single bad package does not drop the rest.
    pub fn include_debs(&self, debs: &[PathBuf]) -> Result<AssemblyReport> {
        let mut report = AssemblyReport::default();
        if debs.is_empty() {
            return Ok(report);
        }
        which::which("reprepro")
            .context("reprepro is not installed (run `aptpack prepare-repo`)")?;

        for deb in debs {
            let output = cmd!(
                "reprepro",
                "-b",
                &self.repo_dir,
                "includedeb",
                &self.config.codename,
                deb
            )
            .stdout_null()
            .stderr_capture()
            .stdin_null()
            .unchecked()
            .run()
            .context("Failed to run reprepro")?;

            if output.status.success() {
                report.included += 1;
            } else {
                emit(
                    Level::Warn,
                    "assemble.include.failed",
                    &format!(
                        "reprepro rejected {}: {}",
                        deb.display(),
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                    None,
                );
                report.rejected.push(deb.clone());
            }
        }
        Ok(report)
    }

    /// Pack the repository directory into `archive` and delete the directory.
    pub fn pack(&self, archive: &Path) -> Result<()> {
        let parent = self
            .repo_dir
            .parent()
            .context("repository directory has no parent")?;
        let name = self
            .repo_dir
            .file_name()
            .and_then(|n| n.to_str())
            .context("repository directory has no usable name")?;
        archive::pack_dir(parent, name, archive)?;
        fs::remove_dir_all(&self.repo_dir)
            .with_context(|| format!("removing {}", self.repo_dir.display()))?;
        Ok(())
    }

    pub fn assemble(&self, debs_dir: &Path, archive: &Path) -> Result<AssemblyReport> {
        emit(
            Level::Info,
            "assemble.start",
            "Initializing local repository...",
            None,
        );
        self.create_layout()?;

        let debs = find_debs(debs_dir)?;
        if debs.is_empty() {
            emit(
                Level::Warn,
                "assemble.empty",
                &format!("No .deb files found in {}", debs_dir.display()),
                None,
            );
        }
        let report = self.include_debs(&debs)?;
        self.pack(archive)?;

        emit(
            Level::Success,
            "assemble.done",
            &format!(
                "Created {} with {} packages ({} rejected)",
                archive.display(),
                report.included,
                report.rejected.len()
            ),
            None,
        );
        Ok(report)
    }
}

/// Install `reprepro` on the local machine.
pub fn install_reprepro() -> Result<()> {
    if which::which("reprepro").is_ok() {
        emit(
            Level::Info,
            "prepare.present",
            "reprepro is already installed",
            None,
        );
        return Ok(());
    }

    cmd!("sudo", "apt-get", "install", "-y", "reprepro")
        .run()
        .context("Failed to install reprepro")?;
    emit(Level::Success, "prepare.done", "Installed reprepro", None);
    Ok(())
}
