use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("No remote host configured (set remote.host or pass --host)")]
    MissingHost,

    #[error("Required program not found: {0}")]
    ProgramNotFound(String),

    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Failed to fetch {remote} into {local}: {reason}")]
    Fetch {
        remote: String,
        local: PathBuf,
        reason: String,
    },

    #[error("Invalid ssh program string '{0}'")]
    InvalidProgram(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
