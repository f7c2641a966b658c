//! End-to-end runs: metadata tree to packed local repository.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::assemble::RepositoryAssembler;
use crate::common::shell::shell_quote;
use crate::common::{create_spinner, finish_spinner_with_success};
use crate::config::Config;
use crate::manifest::{self, ManifestFilter};
use crate::metadata;
use crate::remote::{CommandJournal, RemoteChannel, SshChannel, SshTarget};
use crate::resolve::{CandidateOutcome, Resolution, Resolver, ResolverOptions};
use crate::ui::prelude::*;

/// File names derived from the target OS and the optional release note
/// (`ubuntu` + `20` gives `depends_ubuntu20.txt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Tarball of the remote working directory, in the remote login directory.
    pub remote_archive: String,
    pub ledger_file: String,
    pub repo_archive: String,
}

impl ArtifactNames {
    pub fn new(os_name: &str, note: Option<&str>) -> Self {
        let suffix = format!("{}{}", os_name, note.unwrap_or(""));
        Self {
            remote_archive: format!("packages_from_{}.tar.gz", suffix),
            ledger_file: format!("depends_{}.txt", suffix),
            repo_archive: format!("depends_{}.tar.gz", suffix),
        }
    }
}

/// Clear the remote working directory (and a stale packed archive, if named).
pub fn reset_workspace_command(workdir: &str, remote_archive: Option<&str>) -> String {
    let workdir = shell_quote(workdir);
    match remote_archive {
        Some(archive) => format!(
            "rm -rf {} {} && mkdir -p {}",
            workdir,
            shell_quote(archive),
            workdir
        ),
        None => format!("rm -rf {} && mkdir -p {}", workdir, workdir),
    }
}

pub fn pack_workspace_command(workdir: &str, remote_archive: &str) -> String {
    format!(
        "cd ~/ && tar -czvf {} {}",
        shell_quote(remote_archive),
        shell_quote(workdir)
    )
}

/// Open the ssh channel described by the config.
pub fn connect(config: &Config) -> Result<SshChannel> {
    let target = SshTarget::from_config(&config.remote)?;
    let journal = CommandJournal::new()?;
    if let Some(path) = journal.path() {
        emit(
            Level::Debug,
            "remote.journal",
            &format!("Logging remote commands to {}", path.display()),
            None,
        );
    }
    Ok(SshChannel::connect(target, journal)?)
}

pub fn reset_workspace(
    channel: &mut dyn RemoteChannel,
    workdir: &str,
    remote_archive: Option<&str>,
) {
    emit(
        Level::Debug,
        "remote.workspace.reset",
        &format!("Resetting remote working directory {}", workdir),
        None,
    );
    channel.execute(&reset_workspace_command(workdir, remote_archive));
}

pub fn resolve_on_remote(
    channel: &mut dyn RemoteChannel,
    config: &Config,
    names: &BTreeSet<String>,
) -> Resolution {
    Resolver::new(channel, ResolverOptions::from_config(config)).resolve(names)
}

/// Candidates that never reached the ledger, each with the requested
/// package that first pulled it in.
pub fn missing_candidates(resolution: &Resolution) -> BTreeMap<String, String> {
    let mut missing = BTreeMap::new();
    for report in &resolution.candidates {
        if matches!(report.outcome, CandidateOutcome::Resolved(_)) {
            continue;
        }
        let id = report.candidate.id();
        if !resolution.ledger.contains(&id) {
            missing.entry(id).or_insert_with(|| report.package.clone());
        }
    }
    missing
}

/// Print what did not make it into the ledger.
pub fn report_gaps(resolution: &Resolution) {
    let empty: Vec<&str> = resolution.empty_packages().collect();
    if !empty.is_empty() {
        emit(
            Level::Warn,
            "resolve.gaps.packages",
            &format!("Packages without candidates: {}", empty.join(", ")),
            Some(serde_json::json!({ "packages": empty })),
        );
    }

    let missing = missing_candidates(resolution);
    if !missing.is_empty() {
        let listed: Vec<String> = missing
            .iter()
            .map(|(id, package)| format!("{} (via {})", id, package))
            .collect();
        emit(
            Level::Warn,
            "resolve.gaps.candidates",
            &format!(
                "{} candidates missing from the ledger: {}",
                missing.len(),
                listed.join(", ")
            ),
            Some(serde_json::json!({ "candidates": missing })),
        );
    }
}

pub fn write_ledger(resolution: &Resolution, path: &Path) -> Result<()> {
    resolution.ledger.serialize(path)?;
    emit(
        Level::Success,
        "ledger.written",
        &format!(
            "Saved {} package records to {}",
            resolution.ledger.len(),
            path.display()
        ),
        None,
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub os_name: String,
    pub release: Option<String>,
    pub module: Option<String>,
    pub note: Option<String>,
    pub work_dir: PathBuf,
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Remote half of a build: reset, resolve, pack and fetch.
///
/// The ledger is written before a failed fetch is reported so that the
/// resolution survives a broken transfer. Returns the local archive path.
pub fn collect_remote(
    channel: &mut dyn RemoteChannel,
    config: &Config,
    names: &BTreeSet<String>,
    artifacts: &ArtifactNames,
    work_dir: &Path,
) -> Result<PathBuf> {
    reset_workspace(
        channel,
        &config.remote.workdir,
        Some(artifacts.remote_archive.as_str()),
    );
    let resolution = resolve_on_remote(channel, config, names);
    report_gaps(&resolution);

    let pb = create_spinner(format!(
        "Packing {} on the remote machine...",
        artifacts.remote_archive
    ));
    channel.execute(&pack_workspace_command(
        &config.remote.workdir,
        &artifacts.remote_archive,
    ));
    pb.finish_and_clear();

    let local_archive = work_dir.join(&artifacts.remote_archive);
    let fetched = channel.fetch(&artifacts.remote_archive, &local_archive);

    write_ledger(&resolution, &work_dir.join(&artifacts.ledger_file))?;
    fetched.context("Failed to retrieve packed artifacts")?;
    Ok(local_archive)
}

/// Replace the local copy of the remote working directory with the
/// contents of `archive`. Returns the directory holding the `.deb` files.
pub fn unpack_workspace(archive: &Path, work_dir: &Path, workdir: &str) -> Result<PathBuf> {
    let debs_dir = work_dir.join(workdir);
    match fs::remove_dir_all(&debs_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing stale {}", debs_dir.display()));
        }
    }

    let pb = create_spinner(format!("Unpacking {}...", archive.display()));
    archive::unpack(archive, work_dir)?;
    finish_spinner_with_success(pb, "Unpacked artifacts from the remote machine");
    Ok(debs_dir)
}

/// Clone, scan, resolve remotely, fetch and assemble.
pub fn build(config: &Config, opts: &BuildOptions) -> Result<()> {
    let names = ArtifactNames::new(&opts.os_name, opts.note.as_deref());
    let checkout = resolve_path(&opts.work_dir, &config.metadata.checkout_dir);

    if let Err(e) = metadata::clone_metadata(&config.metadata.git_url, &checkout) {
        emit(
            Level::Error,
            "metadata.clone.failed",
            &format!("Error cloning metadata repository: {:#}", e),
            None,
        );
    }

    let filter = ManifestFilter::new(
        opts.module.as_deref(),
        Some(opts.os_name.as_str()),
        opts.release.as_deref(),
    )?;
    let scan = manifest::scan(&checkout.join(&config.metadata.manifest_subdir), &filter)?;
    if scan.names.is_empty() {
        anyhow::bail!(
            "No package names found for {} under {}",
            opts.os_name,
            checkout.display()
        );
    }
    emit(
        Level::Info,
        "manifest.scan.done",
        &format!(
            "Found {} packages in {} manifests",
            scan.names.len(),
            scan.manifests.len()
        ),
        None,
    );

    let mut channel = connect(config)?;
    let collected = collect_remote(&mut channel, config, &scan.names, &names, &opts.work_dir);
    channel.close();
    let local_archive = collected?;

    let debs_dir = unpack_workspace(&local_archive, &opts.work_dir, &config.remote.workdir)?;
    let assembler =
        RepositoryAssembler::new(opts.work_dir.join("repo"), config.repository.clone());
    assembler.assemble(&debs_dir, &opts.work_dir.join(&names.repo_archive))?;
    Ok(())
}
