use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub static CONFIG_QUALIFIER: &str = "io";
pub static CONFIG_ORGANIZATION: &str = "cfmt";
pub static CONFIG_APPLICATION: &str = "cfmt";

static PROBLEM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)([A-Za-z][0-9]*)$").unwrap());
static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,24}$").unwrap());
static GITHUB_USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9]){0,38}$").unwrap());
static REPO_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,100}$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("problem id {0:?} is not of the form <contest><index>, e.g. 2160B")]
    ProblemId(String),
    #[error("judge handle {0:?} is not valid")]
    Handle(String),
    #[error("GitHub username {0:?} is not valid")]
    GithubUsername(String),
    #[error("repository name {0:?} is not valid")]
    RepoName(String),
}

/// Judge-assigned problem identifier: contest number followed by the problem
/// index, e.g. `2160B` or `1234F1`. The index letter is kept upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProblemId {
    contest: u32,
    index: String,
}

impl ProblemId {
    pub fn new(contest: u32, index: &str) -> Result<Self, ValidationError> {
        format!("{}{}", contest, index).parse()
    }

    pub fn contest(&self) -> u32 {
        self.contest
    }

    pub fn index(&self) -> &str {
        &self.index
    }
}

impl FromStr for ProblemId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let invalid = || ValidationError::ProblemId(value.to_string());
        let captures = PROBLEM_ID_RE.captures(value).ok_or_else(invalid)?;
        let contest = captures[1].parse::<u32>().map_err(|_| invalid())?;
        Ok(Self {
            contest,
            index: captures[2].to_ascii_uppercase(),
        })
    }
}

impl TryFrom<String> for ProblemId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProblemId> for String {
    fn from(value: ProblemId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.contest, self.index)
    }
}

macro_rules! checked_name {
    ($(#[$meta:meta])* $name:ident, $re:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let value = value.trim();
                if $re.is_match(value) {
                    Ok(Self(value.to_string()))
                } else {
                    Err(ValidationError::$variant(value.to_string()))
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

checked_name!(
    /// A user's identifier on the judge.
    Handle,
    HANDLE_RE,
    Handle
);
checked_name!(GithubUsername, GITHUB_USERNAME_RE, GithubUsername);
checked_name!(RepoName, REPO_NAME_RE, RepoName);

/// A solution file scaffolded for a problem. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedFile {
    pub file_name: String,
    pub problem_id: ProblemId,
    pub file_path: PathBuf,
    /// Unix seconds at which the file was scaffolded, when known.
    pub created_at: Option<i64>,
}

impl SolvedFile {
    pub fn new(problem_id: ProblemId, directory: &Path, extension: &str) -> Self {
        let file_name = format!("{}.{}", problem_id, extension);
        Self {
            file_path: directory.join(&file_name),
            file_name,
            problem_id,
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: Option<i64>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Recover the problem id from a solution file name (`2160B.cpp` -> `2160B`).
pub fn problem_id_of(file_name: &str) -> Option<ProblemId> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    stem.parse().ok()
}
