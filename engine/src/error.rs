use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::progress::Step;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The judge could not be reached, or did not answer in time.
    #[error("judge unreachable: {0}")]
    Network(#[source] reqwest::Error),

    /// The judge answered with something other than the expected JSON.
    #[error("unexpected judge response: {0}")]
    MalformedResponse(String),

    /// The judge answered `FAILED`, e.g. for an unknown handle.
    #[error("judge refused the request: {0}")]
    JudgeRejected(String),

    /// A persisted state file exists but cannot be parsed.
    #[error("{} is unreadable: {source}", path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An external program (git, compiler, the solution itself) exited
    /// unsuccessfully or could not be started.
    #[error("{step} failed: {output}")]
    ExternalTool { step: Step, output: String },

    /// A contest-time submission points at a contest missing from the list.
    #[error("contest {0} is not in the judge's contest list")]
    ContestNotFound(u32),

    #[error("cancelled before any change was made")]
    Cancelled,

    /// A blocking state-file operation panicked or was aborted.
    #[error("state file task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tool(step: Step, output: impl Into<String>) -> Self {
        Error::ExternalTool {
            step,
            output: output.into(),
        }
    }

    /// The failing step of an external tool error.
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::ExternalTool { step, .. } => Some(*step),
            _ => None,
        }
    }
}
