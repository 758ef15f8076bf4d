use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronVcError {
    #[error("declined: {0}")]
    Declined(String),

    #[error("{tool} failed with status {status}: {}", .stderr.trim_end())]
    ToolFailure {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("couldn't read snapshot {}: {source}", .path.display())]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is locked by another process", .path.display())]
    Locked { path: PathBuf },

    #[error("-u is not supported; run crontab-vc as the target user instead")]
    UnsupportedUser,

    #[error("{kind} {name:?} can't be used as a snapshot path component")]
    InvalidName { kind: &'static str, name: String },

    #[error("bad config: {0}")]
    Config(String),
}

impl CronVcError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CronVcError::Declined(_) => 1,
            CronVcError::ToolFailure { status, .. } if *status != 0 => *status,
            CronVcError::UnsupportedUser => 2,
            _ => 1,
        }
    }
}

// walk the chain so context() wrappers don't hide the real cause
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CronVcError>())
        .map(CronVcError::exit_code)
        .unwrap_or(1)
}
