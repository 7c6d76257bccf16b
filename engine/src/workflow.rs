use std::sync::{Arc, PoisonError, RwLock};

use log::info;
use shared::{Handle, SolvedFile};
use tokio_util::sync::CancellationToken;

use crate::deferral::{Decision, DeferralEngine, DeferralPolicy};
use crate::error::{Error, Result};
use crate::flush::{commit_message, FlushOutcome, FlushScheduler};
use crate::history::PushHistory;
use crate::progress::Reporter;
use crate::push::PushExecutor;
use crate::queue::blocking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    Deferred { unlock_time: i64 },
}

/// Everything a push request touches, wired together once at start-up.
pub struct Workflow {
    handle: RwLock<Handle>,
    deferral: DeferralEngine,
    executor: Arc<PushExecutor>,
    scheduler: FlushScheduler,
    history: Arc<PushHistory>,
}

impl Workflow {
    pub fn new(
        handle: Handle,
        deferral: DeferralEngine,
        executor: Arc<PushExecutor>,
        scheduler: FlushScheduler,
        history: Arc<PushHistory>,
    ) -> Self {
        Self {
            handle: RwLock::new(handle),
            deferral,
            executor,
            scheduler,
            history,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in settings from a reloaded configuration. Pushes already
    /// running finish with the old ones.
    pub fn reconfigure(&self, handle: Handle, policy: DeferralPolicy) {
        info!("Using judge handle {} from the reloaded configuration", handle);
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = handle;
        self.deferral.set_policy(policy);
    }

    /// Push `file`, or queue it if it was solved during a contest.
    pub async fn push_solved(
        &self,
        file: &SolvedFile,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome> {
        reporter.message(format!("Checking contest status of {}", file.problem_id));
        let history = self.history.clone();
        let last_push = blocking(move || history.last_push()).await?;
        let decision = self.deferral.decide(file, &self.handle(), last_push).await?;
        if let Decision::Deferred { unlock_time } = decision {
            reporter.message(format!(
                "{} was solved in a contest, it will be pushed after {}",
                file.file_name,
                format_time(unlock_time)
            ));
            return Ok(PushOutcome::Deferred { unlock_time });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let files = [file.file_name.clone()];
        self.executor
            .push_cancellable(&files, &commit_message(&files), reporter, cancel)
            .await?;
        self.record_push().await?;
        Ok(PushOutcome::Pushed)
    }

    /// Push every deferred file whose contest is over.
    pub async fn flush(&self, reporter: &Reporter) -> Result<FlushOutcome> {
        let outcome = self.scheduler.flush(reporter).await?;
        if !outcome.pushed.is_empty() {
            self.record_push().await?;
        }
        Ok(outcome)
    }

    async fn record_push(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        info!("Recording push at {}", now);
        let history = self.history.clone();
        blocking(move || history.record(now)).await
    }
}

/// Local, human-readable rendering of a unix timestamp.
pub fn format_time(timestamp: i64) -> String {
    match chrono::DateTime::from_timestamp(timestamp, 0) {
        Some(time) => time
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => timestamp.to_string(),
    }
}
