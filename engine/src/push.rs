use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::progress::{Progress, Reporter, Step};

/// The version-control operations a push is made of.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn stage(&self, files: &[String]) -> Result<()>;
    async fn commit(&self, message: &str) -> Result<()>;
    /// Pull remote changes, rebasing local commits and stashing local edits.
    async fn pull_rebase(&self) -> Result<()>;
    async fn push(&self) -> Result<()>;
}

/// `git` run inside one repository checkout.
#[derive(Debug, Clone)]
pub struct Git {
    repository: PathBuf,
    remote: String,
    branch: String,
}

impl Git {
    pub fn new(
        repository: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    async fn run(&self, step: Step, args: &[&str]) -> Result<String> {
        run_git(step, &self.repository, args).await
    }

    /// Both `user.name` and `user.email` are set, so commits can be made.
    pub async fn identity_configured(&self) -> bool {
        for key in ["user.name", "user.email"] {
            match self.run(Step::Commit, &["config", key]).await {
                Ok(value) if !value.is_empty() => {}
                _ => return false,
            }
        }
        return true;
    }

    /// Clone `url` into `destination`, reporting progress like a push step.
    pub async fn clone_into(url: &str, destination: &Path, reporter: &Reporter) -> Result<()> {
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| Error::io(parent, error))?;
        let destination = destination.to_string_lossy();
        run_step(reporter, Step::Clone, async {
            run_git(Step::Clone, parent, &["clone", url, &destination])
                .await
                .map(|_| ())
        })
        .await
    }
}

async fn run_git(step: Step, directory: &Path, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), directory.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(directory)
        .output()
        .await
        .map_err(|error| Error::tool(step, format!("could not run git: {}", error)))?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let details = [stderr, stdout]
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::tool(step, format!("{} ({})", details, output.status)));
    }
    return Ok(stdout);
}

#[async_trait]
impl Vcs for Git {
    async fn stage(&self, files: &[String]) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend(files.iter().map(String::as_str));
        self.run(Step::Stage, &args).await.map(|_| ())
    }

    /// A retry after a failed pull or push finds the files already
    /// committed, so an empty index skips the commit.
    async fn commit(&self, message: &str) -> Result<()> {
        if self
            .run(Step::Commit, &["diff", "--cached", "--quiet"])
            .await
            .is_ok()
        {
            debug!("Nothing staged, keeping the existing commit");
            return Ok(());
        }
        self.run(Step::Commit, &["commit", "-m", message])
            .await
            .map(|_| ())
    }

    async fn pull_rebase(&self) -> Result<()> {
        self.run(
            Step::PullRebase,
            &["pull", "--rebase", "--autostash", &self.remote, &self.branch],
        )
        .await
        .map(|_| ())
    }

    async fn push(&self) -> Result<()> {
        self.run(Step::Push, &["push", &self.remote, &self.branch])
            .await
            .map(|_| ())
    }
}

async fn run_step<F>(reporter: &Reporter, step: Step, operation: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    reporter.send(Progress::StepStarted(step));
    match operation.await {
        Ok(()) => {
            reporter.send(Progress::StepSucceeded(step));
            Ok(())
        }
        Err(error) => {
            let output = match &error {
                Error::ExternalTool { output, .. } => output.clone(),
                other => other.to_string(),
            };
            reporter.send(Progress::StepFailed { step, output });
            Err(error)
        }
    }
}

/// Runs pushes one at a time against a repository.
///
/// A failed step stops the sequence and nothing is rolled back: a commit made
/// before a failed pull or push stays in the local history.
pub struct PushExecutor {
    vcs: Arc<dyn Vcs>,
    lock: Mutex<()>,
}

impl PushExecutor {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self {
            vcs,
            lock: Mutex::new(()),
        }
    }

    pub async fn push(&self, files: &[String], message: &str, reporter: &Reporter) -> Result<()> {
        self.push_cancellable(files, message, reporter, &CancellationToken::new())
            .await
    }

    /// Like [`push`](Self::push), but gives up with [`Error::Cancelled`] if
    /// `cancel` fires before staging starts. Once files are staged the
    /// sequence runs to the end.
    pub async fn push_cancellable(
        &self,
        files: &[String],
        message: &str,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.lock.lock() => guard,
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        reporter.message(format!("Pushing {}", files.join(", ")));
        run_step(reporter, Step::Stage, self.vcs.stage(files)).await?;
        run_step(reporter, Step::Commit, self.vcs.commit(message)).await?;
        run_step(reporter, Step::PullRebase, self.vcs.pull_rebase()).await?;
        run_step(reporter, Step::Push, self.vcs.push()).await?;
        info!("Pushed {}", files.join(", "));
        Ok(())
    }
}
