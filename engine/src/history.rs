use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::queue::write_atomically;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct History {
    last_push: Option<i64>,
}

/// Remembers when the repository was last pushed successfully.
#[derive(Debug)]
pub struct PushHistory {
    path: PathBuf,
}

impl PushHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Unix seconds of the last successful push, if any was recorded.
    pub fn last_push(&self) -> Result<Option<i64>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::io(&self.path, error)),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let history: History =
            serde_yaml::from_str(&contents).map_err(|source| Error::CorruptState {
                path: self.path.clone(),
                source,
            })?;
        Ok(history.last_push)
    }

    pub fn record(&self, pushed_at: i64) -> Result<()> {
        let history = History {
            last_push: Some(pushed_at),
        };
        write_atomically(&self.path, &history)
    }
}
