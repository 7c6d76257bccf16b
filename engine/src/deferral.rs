use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::{Handle, ProblemId, SolvedFile};

use crate::error::{Error, Result};
use crate::judge::{JudgeApi, ParticipantType, Submission, Verdict};
use crate::queue::{blocking, QueueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PushNow,
    Deferred { unlock_time: i64 },
}

/// What to do when a contest-time submission names a contest the judge's
/// contest list does not contain (or has no start time for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingContest {
    /// Push immediately and log the anomaly.
    #[default]
    FailOpen,
    /// Refuse to push; the user can retry later.
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct DeferralPolicy {
    /// Treat partially accepted contest submissions like accepted ones.
    pub defer_partial: bool,
    pub missing_contest: MissingContest,
    /// Submissions requested per judge call.
    pub page_size: usize,
    /// Upper bound on submissions scanned when no cutoff stops the scan.
    pub max_scan: usize,
}

impl Default for DeferralPolicy {
    fn default() -> Self {
        Self {
            defer_partial: true,
            missing_contest: MissingContest::FailOpen,
            page_size: 50,
            max_scan: 1000,
        }
    }
}

impl DeferralPolicy {
    fn qualifies(&self, submission: &Submission, problem_id: &ProblemId) -> bool {
        let accepted = match submission.verdict {
            Verdict::Accepted => true,
            Verdict::Partial => self.defer_partial,
            Verdict::Other => false,
        };
        accepted
            && submission.participant_type == ParticipantType::Contestant
            && submission.problem_id.as_ref() == Some(problem_id)
    }
}

pub struct DeferralEngine {
    judge: Arc<dyn JudgeApi>,
    queue: Arc<QueueStore>,
    policy: RwLock<DeferralPolicy>,
}

impl DeferralEngine {
    pub fn new(judge: Arc<dyn JudgeApi>, queue: Arc<QueueStore>, policy: DeferralPolicy) -> Self {
        Self {
            judge,
            queue,
            policy: RwLock::new(policy),
        }
    }

    pub fn policy(&self) -> DeferralPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies from the next decision on; one already running keeps the
    /// policy it started with.
    pub fn set_policy(&self, policy: DeferralPolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    pub async fn decide(
        &self,
        file: &SolvedFile,
        handle: &Handle,
        last_push: Option<i64>,
    ) -> Result<Decision> {
        self.decide_at(file, handle, last_push, chrono::Utc::now().timestamp())
            .await
    }

    /// Look for a contest-time solve of `file` by `handle` and queue the file
    /// until the contest ends if that is still after `now`.
    ///
    /// Submissions are scanned newest first back to `last_push`, or further
    /// back to the file's scaffold time when that is earlier. Without a
    /// recorded push the scan runs up to `max_scan`. Any judge failure aborts
    /// the decision instead of guessing.
    pub async fn decide_at(
        &self,
        file: &SolvedFile,
        handle: &Handle,
        last_push: Option<i64>,
        now: i64,
    ) -> Result<Decision> {
        let cutoff = last_push.map(|pushed| match file.created_at {
            Some(created) => pushed.min(created),
            None => pushed,
        });
        let policy = self.policy();
        let Some(submission) = self
            .find_contest_solve(&policy, handle, &file.problem_id, cutoff)
            .await?
        else {
            info!("{} was not solved in a contest", file.problem_id);
            return Ok(Decision::PushNow);
        };

        let contest_id = submission
            .contest_id
            .unwrap_or_else(|| file.problem_id.contest());
        let contests = self.judge.fetch_contest_list().await?;
        let contest_end = contests
            .iter()
            .find(|contest| contest.contest_id == contest_id)
            .and_then(|contest| contest.end());
        let Some(contest_end) = contest_end else {
            return match policy.missing_contest {
                MissingContest::FailOpen => {
                    warn!(
                        "Contest {} of contest-time solve {} not found, pushing anyway",
                        contest_id, file.problem_id
                    );
                    Ok(Decision::PushNow)
                }
                MissingContest::FailClosed => Err(Error::ContestNotFound(contest_id)),
            };
        };

        if contest_end <= now {
            info!(
                "Contest {} of {} is over, pushing right away",
                contest_id, file.problem_id
            );
            return Ok(Decision::PushNow);
        }

        let queue = self.queue.clone();
        let file_name = file.file_name.clone();
        let unlock_time = blocking(move || {
            if queue.upsert(&file_name, contest_end)? {
                info!(
                    "Deferred {} until contest {} ends at {}",
                    file_name, contest_id, contest_end
                );
                return Ok(contest_end);
            }
            let existing = queue.load()?.get(&file_name).copied();
            Ok(existing.unwrap_or(contest_end))
        })
        .await?;
        Ok(Decision::Deferred { unlock_time })
    }

    async fn find_contest_solve(
        &self,
        policy: &DeferralPolicy,
        handle: &Handle,
        problem_id: &ProblemId,
        cutoff: Option<i64>,
    ) -> Result<Option<Submission>> {
        let mut from = 1;
        let mut scanned = 0;
        loop {
            let count = policy
                .page_size
                .min(policy.max_scan.saturating_sub(scanned));
            if count == 0 {
                warn!(
                    "Scanned {} submissions of {} without reaching the last push; older contest solves are not checked",
                    scanned, handle
                );
                return Ok(None);
            }
            let page = self.judge.fetch_submissions(handle, from, count).await?;
            debug!("Fetched {} submissions of {} from {}", page.len(), handle, from);
            for submission in &page {
                if cutoff.is_some_and(|cutoff| submission.creation_time < cutoff) {
                    return Ok(None);
                }
                if policy.qualifies(submission, problem_id) {
                    return Ok(Some(submission.clone()));
                }
            }
            if page.len() < count {
                return Ok(None);
            }
            scanned += page.len();
            from += page.len();
        }
    }
}
