//! Remote dependency resolution.
//!
//! For every requested package the remote `apt` is asked to simulate an
//! install; every package it would install is downloaded into the remote
//! working directory and checksummed, and the result lands in the
//! [`ArtifactLedger`]. Nothing in here is fatal: each candidate ends up with
//! a [`CandidateOutcome`] and the run moves on.

use std::fmt;

use crate::apt::{self, DownloadListing, InstallCandidate, ListingError};
use crate::config::{Config, OrphanPolicy};
use crate::ledger::{ArtifactLedger, DownloadRecord};
use crate::remote::RemoteChannel;
use crate::ui::prelude::*;

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Remote directory `apt download` writes into.
    pub workdir: String,
    /// Largest simulation stderr line count still treated as a clean run.
    pub stderr_threshold: usize,
    pub orphans: OrphanPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            workdir: "depends".to_string(),
            stderr_threshold: 3,
            orphans: OrphanPolicy::Keep,
        }
    }
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workdir: config.remote.workdir.clone(),
            stderr_threshold: config.resolve.stderr_threshold,
            orphans: config.resolve.orphans,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Another requested package already brought this exact version in.
    AlreadyResolved,
    /// The simulation for the requesting package printed too much on stderr.
    NoisySimulation { stderr_lines: usize, threshold: usize },
    /// `apt download` printed nothing (failed, or the command never ran).
    EmptyDownload,
    MalformedListing(ListingError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyResolved => write!(f, "already resolved"),
            SkipReason::NoisySimulation {
                stderr_lines,
                threshold,
            } => write!(
                f,
                "simulation wrote {} stderr lines (threshold {})",
                stderr_lines, threshold
            ),
            SkipReason::EmptyDownload => write!(f, "download produced no output"),
            SkipReason::MalformedListing(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Resolved(DownloadRecord),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CandidateReport {
    /// The requested package whose simulation produced this candidate.
    pub package: String,
    pub candidate: InstallCandidate,
    pub outcome: CandidateOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub package: String,
    pub candidates: usize,
    /// `Inst` lines the parser could not read.
    pub malformed_lines: usize,
    pub stderr_lines: usize,
}

/// Everything one resolution run produced.
#[derive(Debug, Default)]
pub struct Resolution {
    pub ledger: ArtifactLedger,
    pub packages: Vec<PackageReport>,
    pub candidates: Vec<CandidateReport>,
}

impl Resolution {
    pub fn skipped(&self) -> impl Iterator<Item = (&CandidateReport, &SkipReason)> {
        self.candidates.iter().filter_map(|r| match &r.outcome {
            CandidateOutcome::Skipped(reason) => Some((r, reason)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&CandidateReport, &str)> {
        self.candidates.iter().filter_map(|r| match &r.outcome {
            CandidateOutcome::Failed(reason) => Some((r, reason.as_str())),
            _ => None,
        })
    }

    /// Requested packages that ended up with no candidate at all.
    pub fn empty_packages(&self) -> impl Iterator<Item = &str> {
        self.packages
            .iter()
            .filter(|p| p.candidates == 0)
            .map(|p| p.package.as_str())
    }
}

pub struct Resolver<'a> {
    channel: &'a mut dyn RemoteChannel,
    options: ResolverOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(channel: &'a mut dyn RemoteChannel, options: ResolverOptions) -> Self {
        Self { channel, options }
    }

    /// Resolve every requested name, strictly one remote command at a time.
    pub fn resolve<I, S>(&mut self, names: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolution = Resolution::default();
        for name in names {
            self.resolve_package(name.as_ref(), &mut resolution);
        }

        emit(
            Level::Info,
            "resolve.done",
            &format!(
                "Resolved {} artifacts for {} packages ({} skipped, {} failed)",
                resolution.ledger.len(),
                resolution.packages.len(),
                resolution.skipped().count(),
                resolution.failed().count()
            ),
            Some(serde_json::json!({
                "artifacts": resolution.ledger.len(),
                "packages": resolution.packages.len(),
            })),
        );
        resolution
    }

    fn resolve_package(&mut self, package: &str, resolution: &mut Resolution) {
        emit(
            Level::Info,
            "resolve.package.start",
            &format!("Working on {}...", package),
            Some(serde_json::json!({ "package": package })),
        );

        let simulation = self.channel.execute(&apt::simulate_install_command(package));
        let stderr_lines = simulation.stderr.len();

        let mut report = PackageReport {
            package: package.to_string(),
            stderr_lines,
            ..PackageReport::default()
        };

        for parsed in apt::parse_simulation(&simulation.stdout) {
            let Some(candidate) = parsed else {
                report.malformed_lines += 1;
                continue;
            };
            report.candidates += 1;

            let outcome = self.resolve_candidate(&candidate, stderr_lines, &mut resolution.ledger);
            log_outcome(package, &candidate, &outcome);
            resolution.candidates.push(CandidateReport {
                package: package.to_string(),
                candidate,
                outcome,
            });
        }

        if report.malformed_lines > 0 {
            emit(
                Level::Warn,
                "resolve.package.malformed",
                &format!(
                    "{}: ignored {} unreadable install line(s)",
                    package, report.malformed_lines
                ),
                None,
            );
        }
        if report.candidates == 0 {
            emit(
                Level::Warn,
                "resolve.package.empty",
                &format!("{}: simulation produced no install candidates", package),
                Some(serde_json::json!({ "stderr": simulation.stderr })),
            );
        }
        resolution.packages.push(report);
    }

    fn resolve_candidate(
        &mut self,
        candidate: &InstallCandidate,
        simulation_stderr_lines: usize,
        ledger: &mut ArtifactLedger,
    ) -> CandidateOutcome {
        let id = candidate.id();
        if ledger.contains(&id) {
            return CandidateOutcome::Skipped(SkipReason::AlreadyResolved);
        }

        emit(
            Level::Debug,
            "resolve.candidate.download",
            &format!("Downloading dependency: {}...", id),
            None,
        );
        let download = self
            .channel
            .execute(&apt::download_command(&self.options.workdir, candidate));

        let Some(first_line) = download.stdout.first() else {
            return CandidateOutcome::Skipped(SkipReason::EmptyDownload);
        };
        let listing = DownloadListing::parse(first_line);

        if simulation_stderr_lines > self.options.stderr_threshold {
            if let Ok(listing) = &listing {
                self.discard_orphan(listing);
            }
            return CandidateOutcome::Skipped(SkipReason::NoisySimulation {
                stderr_lines: simulation_stderr_lines,
                threshold: self.options.stderr_threshold,
            });
        }

        let listing = match listing {
            Ok(listing) => listing,
            Err(e) => return CandidateOutcome::Skipped(SkipReason::MalformedListing(e)),
        };

        let checksum = self
            .channel
            .execute(&apt::checksum_command(&self.options.workdir, &listing));
        let Some(checksum_line) = checksum.stdout.into_iter().next() else {
            return CandidateOutcome::Failed(format!(
                "checksum unavailable for {}/{}",
                self.options.workdir,
                listing.file_name()
            ));
        };

        let record = DownloadRecord::new(listing, checksum_line);
        ledger.record(id, record.clone());
        CandidateOutcome::Resolved(record)
    }

    fn discard_orphan(&mut self, listing: &DownloadListing) {
        if self.options.orphans != OrphanPolicy::Remove {
            return;
        }
        emit(
            Level::Debug,
            "resolve.orphan.remove",
            &format!("Removing rejected artifact {}", listing.file_name()),
            None,
        );
        self.channel
            .execute(&apt::remove_artifact_command(&self.options.workdir, listing));
    }
}

fn log_outcome(package: &str, candidate: &InstallCandidate, outcome: &CandidateOutcome) {
    let data = Some(serde_json::json!({
        "package": package,
        "candidate": candidate.id(),
    }));
    match outcome {
        CandidateOutcome::Resolved(record) => emit(
            Level::Success,
            "resolve.candidate.resolved",
            &format!(
                "  {} {} [{}] ({})",
                record.name,
                record.version,
                record.architecture,
                record.digest()
            ),
            data,
        ),
        CandidateOutcome::Skipped(SkipReason::AlreadyResolved) => emit(
            Level::Debug,
            "resolve.candidate.duplicate",
            &format!("  {} already resolved", candidate),
            data,
        ),
        CandidateOutcome::Skipped(reason) => emit(
            Level::Warn,
            "resolve.candidate.skipped",
            &format!("  {} skipped: {}", candidate, reason),
            data,
        ),
        CandidateOutcome::Failed(reason) => emit(
            Level::Warn,
            "resolve.candidate.failed",
            &format!("  {} failed: {}", candidate, reason),
            data,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::scripted::ScriptedChannel;

    const CURL_LISTING: &str =
        "Get:1 http://archive.ubuntu.com/ubuntu focal/main amd64 curl amd64 7.68.0-1ubuntu2 [161 kB]";

    fn listing(name: &str, version: &str) -> String {
        format!(
            "Get:1 http://archive.ubuntu.com/ubuntu focal/main amd64 {} amd64 {} [1 kB]",
            name, version
        )
    }

    fn md5(name: &str, version: &str) -> (String, String) {
        let path = format!("depends/{}_{}_amd64.deb", name, version);
        (format!("md5sum {}", path), format!("{}sum  {}", name, path))
    }

    /// A channel that knows how to download and checksum each given package.
    fn with_artifacts(mut channel: ScriptedChannel, artifacts: &[(&str, &str)]) -> ScriptedChannel {
        for (name, version) in artifacts {
            let (md5_cmd, md5_out) = md5(name, version);
            channel = channel
                .respond(
                    &format!("cd depends && apt download {}={}", name, version),
                    &[listing(name, version).as_str()],
                    &[],
                )
                .respond(&md5_cmd, &[md5_out.as_str()], &[]);
        }
        channel
    }

    #[test]
    fn test_single_package_resolves_one_entry() {
        let mut channel = ScriptedChannel::new()
            .respond(
                "apt install -s curl",
                &["Inst curl (7.68.0-1ubuntu2 amd64)"],
                &[],
            )
            .respond(
                "cd depends && apt download curl=7.68.0-1ubuntu2",
                &[CURL_LISTING],
                &[],
            )
            .respond(
                "md5sum depends/curl_7.68.0-1ubuntu2_amd64.deb",
                &["abc123  depends/curl_7.68.0-1ubuntu2_amd64.deb"],
                &[],
            );

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl"]);

        assert_eq!(resolution.ledger.len(), 1);
        let record = resolution.ledger.get("curl=7.68.0-1ubuntu2").unwrap();
        assert_eq!(
            record.to_string(),
            "http://archive.ubuntu.com/ubuntu | focal/main | 7.68.0-1ubuntu2 | amd64 | abc123  depends/curl_7.68.0-1ubuntu2_amd64.deb"
        );
        assert_eq!(
            channel.issued,
            vec![
                "apt install -s curl",
                "cd depends && apt download curl=7.68.0-1ubuntu2",
                "md5sum depends/curl_7.68.0-1ubuntu2_amd64.deb",
            ]
        );
    }

    #[test]
    fn test_noisy_simulation_records_nothing() {
        let channel = ScriptedChannel::new().respond(
            "apt install -s curl",
            &[
                "Inst libcurl4 (7.68.0-1ubuntu2 amd64)",
                "Inst curl (7.68.0-1ubuntu2 amd64)",
            ],
            &["W: one", "W: two", "W: three", "W: four", "W: five"],
        );
        let mut channel =
            with_artifacts(channel, &[("libcurl4", "7.68.0-1ubuntu2"), ("curl", "7.68.0-1ubuntu2")]);

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl"]);

        assert!(resolution.ledger.is_empty());
        let reasons: Vec<_> = resolution.skipped().map(|(_, r)| r.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::NoisySimulation {
                    stderr_lines: 5,
                    threshold: 3
                };
                2
            ]
        );
        // Downloads still ran; nothing was checksummed or removed.
        assert_eq!(channel.count("md5sum depends/curl_7.68.0-1ubuntu2_amd64.deb"), 0);
        assert!(!channel.issued.iter().any(|c| c.starts_with("rm -f")));
    }

    #[test]
    fn test_threshold_is_inclusive_and_configurable() {
        let stderr = ["W: a", "W: b", "W: c"];
        let channel = ScriptedChannel::new().respond(
            "apt install -s curl",
            &["Inst curl (7.68.0-1ubuntu2 amd64)"],
            &stderr,
        );
        let mut channel = with_artifacts(channel, &[("curl", "7.68.0-1ubuntu2")]);

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl"]);
        assert_eq!(resolution.ledger.len(), 1);

        let strict = ResolverOptions {
            stderr_threshold: 2,
            ..ResolverOptions::default()
        };
        let resolution = Resolver::new(&mut channel, strict).resolve(["curl"]);
        assert!(resolution.ledger.is_empty());
    }

    #[test]
    fn test_orphan_removal_policy() {
        let channel = ScriptedChannel::new().respond(
            "apt install -s curl",
            &["Inst curl (7.68.0-1ubuntu2 amd64)"],
            &["E: 1", "E: 2", "E: 3", "E: 4"],
        );
        let mut channel = with_artifacts(channel, &[("curl", "7.68.0-1ubuntu2")]);

        let options = ResolverOptions {
            orphans: OrphanPolicy::Remove,
            ..ResolverOptions::default()
        };
        let resolution = Resolver::new(&mut channel, options).resolve(["curl"]);

        assert!(resolution.ledger.is_empty());
        assert_eq!(
            channel.count("rm -f depends/curl_7.68.0-1ubuntu2_amd64.deb"),
            1
        );
    }

    #[test]
    fn test_malformed_install_line_is_dropped() {
        let channel = ScriptedChannel::new().respond(
            "apt install -s curl",
            &[
                "Inst badformat",
                "Inst curl (7.68.0-1ubuntu2 amd64)",
            ],
            &[],
        );
        let mut channel = with_artifacts(channel, &[("curl", "7.68.0-1ubuntu2")]);

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl"]);

        assert_eq!(resolution.ledger.len(), 1);
        assert!(resolution.ledger.contains("curl=7.68.0-1ubuntu2"));
        assert_eq!(resolution.packages[0].malformed_lines, 1);
        assert_eq!(resolution.packages[0].candidates, 1);
        assert!(!channel.issued.iter().any(|c| c.contains("badformat")));
    }

    #[test]
    fn test_shared_dependency_recorded_once() {
        let channel = ScriptedChannel::new()
            .respond(
                "apt install -s curl",
                &["Inst libssl (1.1.1 amd64)", "Inst curl (7.68.0 amd64)"],
                &[],
            )
            .respond(
                "apt install -s wget",
                &["Inst libssl (1.1.1 amd64)", "Inst wget (1.20.3 amd64)"],
                &[],
            );
        let mut channel = with_artifacts(
            channel,
            &[("libssl", "1.1.1"), ("curl", "7.68.0"), ("wget", "1.20.3")],
        );

        let resolution =
            Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl", "wget"]);

        assert_eq!(resolution.ledger.len(), 3);
        let keys: Vec<&str> = resolution.ledger.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["libssl=1.1.1", "curl=7.68.0", "wget=1.20.3"]);
        assert_eq!(channel.count("cd depends && apt download libssl=1.1.1"), 1);
        assert_eq!(
            resolution
                .skipped()
                .filter(|(_, r)| **r == SkipReason::AlreadyResolved)
                .count(),
            1
        );
    }

    #[test]
    fn test_shared_dependency_independent_of_order() {
        let build = || {
            let channel = ScriptedChannel::new()
                .respond("apt install -s a", &["Inst libssl (1.1.1 amd64)"], &[])
                .respond("apt install -s b", &["Inst libssl (1.1.1 amd64)"], &[]);
            with_artifacts(channel, &[("libssl", "1.1.1")])
        };

        for order in [["a", "b"], ["b", "a"]] {
            let mut channel = build();
            let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(order);
            assert_eq!(resolution.ledger.len(), 1);
            assert!(resolution.ledger.contains("libssl=1.1.1"));
        }
    }

    #[test]
    fn test_failed_candidate_is_retried_by_later_package() {
        // The first simulation is noisy, the second is clean.
        let channel = ScriptedChannel::new()
            .respond(
                "apt install -s a",
                &["Inst libssl (1.1.1 amd64)"],
                &["1", "2", "3", "4"],
            )
            .respond("apt install -s b", &["Inst libssl (1.1.1 amd64)"], &[]);
        let mut channel = with_artifacts(channel, &[("libssl", "1.1.1")]);

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["a", "b"]);

        assert!(resolution.ledger.contains("libssl=1.1.1"));
        assert_eq!(channel.count("cd depends && apt download libssl=1.1.1"), 2);
    }

    #[test]
    fn test_empty_download_and_missing_checksum() {
        let mut channel = ScriptedChannel::new()
            .respond(
                "apt install -s pkg",
                &["Inst gone (1.0 amd64)", "Inst nosum (2.0 amd64)"],
                &[],
            )
            .respond(
                "cd depends && apt download nosum=2.0",
                &[listing("nosum", "2.0").as_str()],
                &[],
            );

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["pkg"]);

        assert!(resolution.ledger.is_empty());
        let outcomes: Vec<_> = resolution.candidates.iter().map(|r| &r.outcome).collect();
        assert_eq!(
            outcomes[0],
            &CandidateOutcome::Skipped(SkipReason::EmptyDownload)
        );
        assert_eq!(
            outcomes[1],
            &CandidateOutcome::Failed(
                "checksum unavailable for depends/nosum_2.0_amd64.deb".to_string()
            )
        );
        assert_eq!(resolution.failed().count(), 1);
    }

    #[test]
    fn test_malformed_listing_is_skipped() {
        let mut channel = ScriptedChannel::new()
            .respond("apt install -s pkg", &["Inst odd (1.0 amd64)"], &[])
            .respond(
                "cd depends && apt download odd=1.0",
                &["Get:1 truncated"],
                &[],
            );

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["pkg"]);

        assert!(resolution.ledger.is_empty());
        assert!(matches!(
            resolution.candidates[0].outcome,
            CandidateOutcome::Skipped(SkipReason::MalformedListing(_))
        ));
    }

    #[test]
    fn test_unknown_package_has_no_candidates() {
        let mut channel = ScriptedChannel::new().respond(
            "apt install -s nope",
            &[],
            &["E: Unable to locate package nope"],
        );

        let resolution = Resolver::new(&mut channel, ResolverOptions::default()).resolve(["nope"]);

        assert!(resolution.ledger.is_empty());
        assert_eq!(resolution.empty_packages().collect::<Vec<_>>(), vec!["nope"]);
        assert_eq!(channel.issued.len(), 1);
    }

    #[test]
    fn test_same_script_gives_same_ledger() {
        let run = || {
            let channel = ScriptedChannel::new()
                .respond(
                    "apt install -s curl",
                    &["Inst libssl (1.1.1 amd64)", "Inst curl (7.68.0 amd64)"],
                    &[],
                )
                .respond("apt install -s wget", &["Inst wget (1.20.3 amd64)"], &[]);
            let mut channel = with_artifacts(
                channel,
                &[("libssl", "1.1.1"), ("curl", "7.68.0"), ("wget", "1.20.3")],
            );
            let resolution =
                Resolver::new(&mut channel, ResolverOptions::default()).resolve(["curl", "wget"]);
            let mut out = Vec::new();
            resolution.ledger.write_to(&mut out).unwrap();
            String::from_utf8(out).unwrap()
        };

        let first = run();
        assert_eq!(first.lines().count(), 3);
        assert_eq!(first, run());
    }

    #[test]
    fn test_custom_workdir_flows_into_commands() {
        let mut channel = ScriptedChannel::new()
            .respond("apt install -s curl", &["Inst curl (7.68.0 amd64)"], &[])
            .respond(
                "cd build && apt download curl=7.68.0",
                &[listing("curl", "7.68.0").as_str()],
                &[],
            )
            .respond(
                "md5sum build/curl_7.68.0_amd64.deb",
                &["ff  build/curl_7.68.0_amd64.deb"],
                &[],
            );
        let options = ResolverOptions {
            workdir: "build".to_string(),
            ..ResolverOptions::default()
        };

        let resolution = Resolver::new(&mut channel, options).resolve(["curl"]);

        assert_eq!(resolution.ledger.get("curl=7.68.0").unwrap().digest(), "ff");
    }
}
