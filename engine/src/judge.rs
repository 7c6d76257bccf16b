use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared::{Handle, ProblemId};

use crate::error::{Error, Result};

pub static DEFAULT_JUDGE_URL: &str = "https://codeforces.com/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[serde(rename = "OK")]
    Accepted,
    Partial,
    /// Anything else, including a submission still being judged.
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantType {
    Contestant,
    Practice,
    Virtual,
    Manager,
    OutOfCompetition,
    #[default]
    #[serde(other)]
    Unknown,
}

/// The judge's record of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub problem_id: Option<ProblemId>,
    pub verdict: Verdict,
    pub participant_type: ParticipantType,
    pub contest_id: Option<u32>,
    /// Unix seconds.
    pub creation_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contest {
    pub contest_id: u32,
    /// Unix seconds; contests that are not scheduled yet have none.
    pub start_time: Option<i64>,
    pub duration_seconds: i64,
}

impl Contest {
    pub fn end(&self) -> Option<i64> {
        self.start_time.map(|start| start + self.duration_seconds)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    status: String,
    comment: Option<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProblem {
    contest_id: Option<u32>,
    index: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthor {
    #[serde(default)]
    participant_type: ParticipantType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSubmission {
    contest_id: Option<u32>,
    creation_time_seconds: i64,
    problem: WireProblem,
    author: WireAuthor,
    #[serde(default)]
    verdict: Verdict,
}

impl From<WireSubmission> for Submission {
    fn from(wire: WireSubmission) -> Self {
        let problem_id = wire
            .problem
            .contest_id
            .or(wire.contest_id)
            .and_then(|contest| ProblemId::new(contest, &wire.problem.index).ok());
        Submission {
            problem_id,
            verdict: wire.verdict,
            participant_type: wire.author.participant_type,
            contest_id: wire.contest_id,
            creation_time: wire.creation_time_seconds,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContest {
    id: u32,
    duration_seconds: i64,
    start_time_seconds: Option<i64>,
}

impl From<WireContest> for Contest {
    fn from(wire: WireContest) -> Self {
        Contest {
            contest_id: wire.id,
            start_time: wire.start_time_seconds,
            duration_seconds: wire.duration_seconds,
        }
    }
}

/// The two judge endpoints the deferral logic needs.
#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// Submissions of `handle`, newest first, starting at the 1-based
    /// position `from`.
    async fn fetch_submissions(
        &self,
        handle: &Handle,
        from: usize,
        count: usize,
    ) -> Result<Vec<Submission>>;

    async fn fetch_contest_list(&self) -> Result<Vec<Contest>>;

    async fn fetch_recent_submissions(
        &self,
        handle: &Handle,
        limit: usize,
    ) -> Result<Vec<Submission>> {
        self.fetch_submissions(handle, 1, limit).await
    }
}

pub struct JudgeClient {
    base_url: Url,
    client: reqwest::Client,
}

impl JudgeClient {
    /// `timeout` bounds every request; hitting it surfaces as
    /// [`Error::Network`].
    pub fn new(mut base_url: Url, timeout: Duration) -> Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { base_url, client })
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self
            .base_url
            .join(method)
            .map_err(|error| Error::MalformedResponse(error.to_string()))?;
        debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(Error::Network)?;
        let status = response.status();
        let body = response.text().await.map_err(Error::Network)?;
        decode(status, &body)
    }
}

#[async_trait]
impl JudgeApi for JudgeClient {
    async fn fetch_submissions(
        &self,
        handle: &Handle,
        from: usize,
        count: usize,
    ) -> Result<Vec<Submission>> {
        let query = [
            ("handle", handle.to_string()),
            ("from", from.to_string()),
            ("count", count.to_string()),
        ];
        let submissions: Vec<WireSubmission> = self.get("user.status", &query).await?;
        Ok(submissions.into_iter().map(Submission::from).collect())
    }

    async fn fetch_contest_list(&self) -> Result<Vec<Contest>> {
        let contests: Vec<WireContest> = self.get("contest.list", &[]).await?;
        Ok(contests.into_iter().map(Contest::from).collect())
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(error) if status.is_success() => {
            return Err(Error::MalformedResponse(error.to_string()))
        }
        Err(_) => return Err(Error::MalformedResponse(format!("HTTP {}", status))),
    };
    if envelope.status != "OK" {
        let comment = envelope
            .comment
            .unwrap_or_else(|| format!("status {}", envelope.status));
        return Err(Error::JudgeRejected(comment));
    }
    envelope
        .result
        .ok_or_else(|| Error::MalformedResponse("missing result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    static SUBMISSIONS: &str = r#"{
        "status": "OK",
        "result": [
            {
                "id": 2,
                "contestId": 2160,
                "creationTimeSeconds": 1700000100,
                "problem": {"contestId": 2160, "index": "B", "name": "Two"},
                "author": {"contestId": 2160, "members": [{"handle": "tourist"}], "participantType": "CONTESTANT"},
                "verdict": "OK"
            },
            {
                "id": 1,
                "contestId": 2160,
                "creationTimeSeconds": 1700000000,
                "problem": {"contestId": 2160, "index": "A", "name": "One"},
                "author": {"members": [], "participantType": "PRACTICE"}
            }
        ]
    }"#;

    #[test]
    fn decodes_submissions() {
        let wire: Vec<WireSubmission> = decode(StatusCode::OK, SUBMISSIONS).unwrap();
        let submissions: Vec<Submission> = wire.into_iter().map(Submission::from).collect();
        assert_eq!(
            submissions[0],
            Submission {
                problem_id: Some("2160B".parse().unwrap()),
                verdict: Verdict::Accepted,
                participant_type: ParticipantType::Contestant,
                contest_id: Some(2160),
                creation_time: 1700000100,
            }
        );
        assert_eq!(submissions[1].verdict, Verdict::Other);
        assert_eq!(submissions[1].participant_type, ParticipantType::Practice);
    }

    #[test_case("PARTIAL", Verdict::Partial; "partial")]
    #[test_case("WRONG_ANSWER", Verdict::Other; "wrong answer")]
    #[test_case("TESTING", Verdict::Other; "testing")]
    fn decodes_verdict(wire: &str, verdict: Verdict) {
        let parsed: Verdict = serde_json::from_str(&format!("\"{}\"", wire)).unwrap();
        assert_eq!(parsed, verdict);
    }

    #[test]
    fn decodes_contests() {
        let body = r#"{"status": "OK", "result": [
            {"id": 2160, "name": "Round", "type": "CF", "phase": "FINISHED", "frozen": false,
             "durationSeconds": 7200, "startTimeSeconds": 1000},
            {"id": 2170, "name": "Later", "type": "CF", "phase": "BEFORE", "frozen": false,
             "durationSeconds": 5400}
        ]}"#;
        let wire: Vec<WireContest> = decode(StatusCode::OK, body).unwrap();
        let contests: Vec<Contest> = wire.into_iter().map(Contest::from).collect();
        assert_eq!(contests[0].end(), Some(8200));
        assert_eq!(contests[1].end(), None);
    }

    #[test]
    fn failed_status_is_rejection() {
        let body = r#"{"status": "FAILED", "comment": "handle: User with handle nobody not found"}"#;
        let result: Result<Vec<WireContest>> = decode(StatusCode::BAD_REQUEST, body);
        assert!(matches!(result, Err(Error::JudgeRejected(comment)) if comment.contains("nobody")));
    }

    #[test_case(StatusCode::OK, "<html>"; "html page")]
    #[test_case(StatusCode::BAD_GATEWAY, "<html>"; "gateway error")]
    #[test_case(StatusCode::OK, r#"{"status": "OK"}"#; "missing result")]
    #[test_case(StatusCode::OK, r#"{"status": "OK", "result": [{"id": "x"}]}"#; "wrong shape")]
    fn malformed_bodies(status: StatusCode, body: &str) {
        let result: Result<Vec<WireContest>> = decode(status, body);
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = JudgeClient::new(
            Url::parse(DEFAULT_JUDGE_URL).unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.base_url.join("contest.list").unwrap().as_str(),
            "https://codeforces.com/api/contest.list"
        );
    }
}
