use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::deferral::{DeferralPolicy, MissingContest};
use engine::judge::DEFAULT_JUDGE_URL;
use engine::toolchain::{default_toolchains, Toolchain};
use log::debug;
use serde::{Deserialize, Serialize};
use shared::{GithubUsername, Handle, RepoName};

#[derive(Debug)]
pub enum Error {
    /// Could not deserialise the Yaml.
    DeserialisationError(serde_yaml::Error),

    /// Could not determine from where to load the settings.
    DirectoryError,

    /// IO error with the configuration.
    IOError(std::io::Error),

    /// Could not serialise the configuration for saving.
    SerialisationError(serde_yaml::Error),
}

/// Where the configuration and the persisted state live.
#[derive(Debug, Clone)]
pub struct Dirs {
    pub config: PathBuf,
    pub data: PathBuf,
}

impl Dirs {
    pub fn new() -> Result<Self, Error> {
        let Some(project_directory) = directories::ProjectDirs::from(
            shared::CONFIG_QUALIFIER,
            shared::CONFIG_ORGANIZATION,
            shared::CONFIG_APPLICATION,
        ) else {
            return Err(Error::DirectoryError);
        };
        return Ok(Self {
            config: project_directory.config_dir().to_path_buf(),
            data: project_directory.data_dir().to_path_buf(),
        });
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join("client.yaml")
    }

    pub fn theme_file(&self) -> PathBuf {
        self.config.join("theme")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.data.join("queue.yaml")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data.join("history.yaml")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.data.join("build")
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_editor() -> String {
    "code".to_string()
}

fn default_judge_url() -> String {
    DEFAULT_JUDGE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_run_timeout() -> u64 {
    10
}

fn default_page_size() -> usize {
    DeferralPolicy::default().page_size
}

fn default_max_scan() -> usize {
    DeferralPolicy::default().max_scan
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub github_username: GithubUsername,

    pub repo_name: RepoName,

    pub judge_handle: Handle,

    /// Directory the repository is cloned into. Defaults to the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_editor")]
    pub editor: String,

    #[serde(default = "default_judge_url")]
    pub judge_url: String,

    /// Seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Seconds a solution may run before it is killed.
    #[serde(default = "default_run_timeout")]
    pub run_timeout: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_max_scan")]
    pub max_scan: usize,

    #[serde(default = "default_true")]
    pub defer_partial: bool,

    #[serde(default)]
    pub missing_contest: MissingContest,

    /// Directory with `<ext>_template.txt` files. Defaults to the config dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,

    #[serde(default = "default_toolchains")]
    pub toolchains: BTreeMap<String, Toolchain>,
}

impl Config {
    pub fn new(github_username: GithubUsername, repo_name: RepoName, judge_handle: Handle) -> Self {
        Self {
            github_username,
            repo_name,
            judge_handle,
            workspace: None,
            remote: default_remote(),
            branch: default_branch(),
            editor: default_editor(),
            judge_url: default_judge_url(),
            request_timeout: default_request_timeout(),
            run_timeout: default_run_timeout(),
            page_size: default_page_size(),
            max_scan: default_max_scan(),
            defer_partial: true,
            missing_contest: MissingContest::default(),
            templates: None,
            toolchains: default_toolchains(),
        }
    }

    pub fn load(config_path: &Path) -> Result<Self, Error> {
        debug!("Loading config from {}", config_path.display());
        let fp = File::open(config_path).map_err(Error::IOError)?;
        let config: Config = serde_yaml::from_reader(fp).map_err(Error::DeserialisationError)?;
        return Ok(config);
    }

    pub fn save(&self, config_path: &Path) -> Result<(), Error> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(Error::IOError)?;
        }
        let fp = File::create(config_path).map_err(Error::IOError)?;
        serde_yaml::to_writer(fp, self).map_err(Error::SerialisationError)?;
        debug!("Saved config to {}", config_path.display());
        return Ok(());
    }

    pub fn repository_dir(&self, dirs: &Dirs) -> PathBuf {
        self.workspace
            .as_deref()
            .unwrap_or(dirs.data.as_path())
            .join(self.repo_name.as_str())
    }

    pub fn remote_url(&self) -> String {
        format!(
            "https://github.com/{}/{}.git",
            self.github_username, self.repo_name
        )
    }

    pub fn template_path(&self, dirs: &Dirs, extension: &str) -> PathBuf {
        self.templates
            .as_deref()
            .unwrap_or(dirs.config.as_path())
            .join(format!("{}_template.txt", extension))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }

    pub fn deferral_policy(&self) -> DeferralPolicy {
        DeferralPolicy {
            defer_partial: self.defer_partial,
            missing_contest: self.missing_contest,
            page_size: self.page_size.max(1),
            max_scan: self.max_scan,
        }
    }

    /// Keys changed in `reloaded` that only take effect after a restart.
    /// The judge handle, the deferral policy and everything read per command
    /// apply immediately.
    pub fn restart_keys(&self, reloaded: &Config) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.github_username != reloaded.github_username {
            keys.push("githubUsername");
        }
        if self.repo_name != reloaded.repo_name {
            keys.push("repoName");
        }
        if self.workspace != reloaded.workspace {
            keys.push("workspace");
        }
        if self.remote != reloaded.remote {
            keys.push("remote");
        }
        if self.branch != reloaded.branch {
            keys.push("branch");
        }
        if self.judge_url != reloaded.judge_url {
            keys.push("judgeUrl");
        }
        if self.request_timeout != reloaded.request_timeout {
            keys.push("requestTimeout");
        }
        return keys;
    }

    /// Extensions with a configured toolchain, e.g. `cpp, py`.
    pub fn languages(&self) -> String {
        self.toolchains
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
