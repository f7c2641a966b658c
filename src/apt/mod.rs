//! Parsing of `apt` text output and the remote command templates that
//! produce it.

mod download;
mod simulate;

pub use download::{DownloadListing, ListingError};
pub use simulate::{InstallCandidate, parse_simulation};

use crate::common::shell::shell_quote;

pub fn simulate_install_command(package: &str) -> String {
    format!("apt install -s {}", shell_quote(package))
}

pub fn download_command(workdir: &str, candidate: &InstallCandidate) -> String {
    format!(
        "cd {} && apt download {}",
        shell_quote(workdir),
        shell_quote(&candidate.id())
    )
}

pub fn checksum_command(workdir: &str, listing: &DownloadListing) -> String {
    format!(
        "md5sum {}/{}",
        shell_quote(workdir),
        shell_quote(&listing.file_name())
    )
}

pub fn remove_artifact_command(workdir: &str, listing: &DownloadListing) -> String {
    format!(
        "rm -f {}/{}",
        shell_quote(workdir),
        shell_quote(&listing.file_name())
    )
}
