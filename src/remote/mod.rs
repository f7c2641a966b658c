//! Remote command channel.
//!
//! The resolver only ever needs two capabilities from the build machine: run
//! one shell command and collect its output lines, and copy one file back.
//! [`RemoteChannel`] is that seam; [`SshChannel`] is the production
//! implementation.

mod error;
mod journal;
mod ssh;

pub use error::ChannelError;
pub use journal::CommandJournal;
pub use ssh::{SshChannel, SshTarget};

use std::path::Path;

/// Captured output of one remote command, split into lines without their
/// trailing newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn from_text(stdout: &str, stderr: &str) -> Self {
        Self {
            stdout: stdout.lines().map(str::to_string).collect(),
            stderr: stderr.lines().map(str::to_string).collect(),
        }
    }
}

pub trait RemoteChannel {
    /// Run one command to completion.
    ///
    /// Execution failures never surface as errors: they are reported as a
    /// diagnostic and come back as empty output, which callers already treat
    /// as "nothing happened".
    fn execute(&mut self, command: &str) -> CommandOutput;

    /// Copy a remote file (relative to the remote login directory) to `local`,
    /// replacing any existing file.
    fn fetch(&mut self, remote: &str, local: &Path) -> Result<(), ChannelError>;
}
