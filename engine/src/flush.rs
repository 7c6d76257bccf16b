use std::sync::Arc;

use log::{debug, info};

use crate::error::Result;
use crate::progress::Reporter;
use crate::push::PushExecutor;
use crate::queue::{blocking, QueueStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Files pushed and removed from the queue, in queue order.
    pub pushed: Vec<String>,
    /// Entries still waiting for their contest to end.
    pub pending: usize,
}

/// Commit message naming every solved problem in `file_names`.
pub fn commit_message<S: AsRef<str>>(file_names: &[S]) -> String {
    let problems: Vec<String> = file_names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            shared::problem_id_of(name)
                .map(|id| id.to_string())
                .unwrap_or_else(|| name.to_string())
        })
        .collect();
    format!("solved {}", problems.join(", "))
}

pub struct FlushScheduler {
    queue: Arc<QueueStore>,
    executor: Arc<PushExecutor>,
}

impl FlushScheduler {
    pub fn new(queue: Arc<QueueStore>, executor: Arc<PushExecutor>) -> Self {
        Self { queue, executor }
    }

    pub async fn flush(&self, reporter: &Reporter) -> Result<FlushOutcome> {
        self.flush_at(chrono::Utc::now().timestamp(), reporter).await
    }

    /// Push every entry with `unlock_time <= now` in one commit, then drop
    /// those entries. Nothing is written when nothing is ready, and a failed
    /// push leaves the queue as it was.
    pub async fn flush_at(&self, now: i64, reporter: &Reporter) -> Result<FlushOutcome> {
        let queue = self.queue.clone();
        let entries = blocking(move || queue.load()).await?;
        let (ready, pending): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|(_, unlock_time)| *unlock_time <= now);
        if ready.is_empty() {
            debug!("Nothing to flush, {} pending", pending.len());
            return Ok(FlushOutcome {
                pushed: Vec::new(),
                pending: pending.len(),
            });
        }

        let ready: Vec<String> = ready.into_iter().map(|(file_name, _)| file_name).collect();
        info!("Flushing {} deferred solutions", ready.len());
        self.executor
            .push(&ready, &commit_message(&ready), reporter)
            .await?;
        let queue = self.queue.clone();
        let pushed = ready.clone();
        let left = blocking(move || queue.remove(pushed.as_slice())).await?;
        Ok(FlushOutcome {
            pushed: ready,
            pending: left.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Step;
    use crate::push::tests::FakeVcs;
    use crate::queue::QueueMap;
    use test_case::test_case;

    fn scheduler(vcs: FakeVcs) -> (tempfile::TempDir, Arc<FakeVcs>, Arc<QueueStore>, FlushScheduler) {
        let directory = tempfile::tempdir().unwrap();
        let vcs = Arc::new(vcs);
        let queue = Arc::new(QueueStore::new(directory.path().join("queue.yaml")));
        let executor = Arc::new(PushExecutor::new(vcs.clone()));
        let scheduler = FlushScheduler::new(queue.clone(), executor);
        (directory, vcs, queue, scheduler)
    }

    #[test_case(&["2160B.cpp"], "solved 2160B"; "single")]
    #[test_case(&["2160B.cpp", "2161A1.py"], "solved 2160B, 2161A1"; "batch")]
    #[test_case(&["notes.md"], "solved notes.md"; "unrecognised name")]
    fn commit_messages(file_names: &[&str], message: &str) {
        assert_eq!(commit_message(file_names), message);
    }

    #[tokio::test]
    async fn pushes_exactly_the_ready_entries() {
        let (_directory, vcs, queue, scheduler) = scheduler(FakeVcs::default());
        queue.upsert("1A.cpp", 100).unwrap();
        queue.upsert("2B.cpp", 300).unwrap();

        let outcome = scheduler.flush_at(200, &Reporter::silent()).await.unwrap();

        assert_eq!(outcome.pushed, vec!["1A.cpp".to_string()]);
        assert_eq!(outcome.pending, 1);
        assert_eq!(vcs.calls.lock().unwrap()[0], (Step::Stage, "1A.cpp".to_string()));
        assert_eq!(vcs.calls.lock().unwrap()[1], (Step::Commit, "solved 1A".to_string()));
        assert_eq!(
            queue.load().unwrap(),
            QueueMap::from([("2B.cpp".to_string(), 300)])
        );
    }

    #[tokio::test]
    async fn unlock_time_equal_to_now_is_ready() {
        let (_directory, _vcs, queue, scheduler) = scheduler(FakeVcs::default());
        queue.upsert("1A.cpp", 100).unwrap();

        let outcome = scheduler.flush_at(100, &Reporter::silent()).await.unwrap();

        assert_eq!(outcome.pushed.len(), 1);
        assert!(queue.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_is_one_push() {
        let (_directory, vcs, queue, scheduler) = scheduler(FakeVcs::default());
        queue.upsert("1A.cpp", 100).unwrap();
        queue.upsert("2B.cpp", 150).unwrap();

        scheduler.flush_at(200, &Reporter::silent()).await.unwrap();

        assert_eq!(
            vcs.steps(),
            vec![Step::Stage, Step::Commit, Step::PullRebase, Step::Push]
        );
        assert_eq!(vcs.calls.lock().unwrap()[0].1, "1A.cpp 2B.cpp");
        assert_eq!(vcs.calls.lock().unwrap()[1].1, "solved 1A, 2B");
    }

    #[tokio::test]
    async fn repeated_noop_flush_does_nothing() {
        let (_directory, vcs, queue, scheduler) = scheduler(FakeVcs::default());
        queue.upsert("2B.cpp", 300).unwrap();
        let before = std::fs::read_to_string(queue.path()).unwrap();

        for _ in 0..2 {
            let outcome = scheduler.flush_at(200, &Reporter::silent()).await.unwrap();
            assert_eq!(outcome, FlushOutcome { pushed: vec![], pending: 1 });
        }

        assert!(vcs.steps().is_empty());
        assert_eq!(std::fs::read_to_string(queue.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn empty_queue_creates_no_file() {
        let (_directory, vcs, queue, scheduler) = scheduler(FakeVcs::default());

        let outcome = scheduler.flush_at(200, &Reporter::silent()).await.unwrap();

        assert_eq!(outcome, FlushOutcome::default());
        assert!(vcs.steps().is_empty());
        assert!(!queue.path().exists());
    }

    #[tokio::test]
    async fn failed_push_keeps_entries() {
        let (_directory, vcs, queue, scheduler) = scheduler(FakeVcs::failing_at(Step::PullRebase));
        queue.upsert("1A.cpp", 100).unwrap();
        queue.upsert("2B.cpp", 300).unwrap();

        let error = scheduler
            .flush_at(200, &Reporter::silent())
            .await
            .unwrap_err();

        assert_eq!(error.step(), Some(Step::PullRebase));
        // The commit made before the failure is not undone.
        assert_eq!(
            vcs.steps(),
            vec![Step::Stage, Step::Commit, Step::PullRebase]
        );
        assert_eq!(queue.load().unwrap().len(), 2);
    }
}
