//! Job rows: autonomous agent tasks queued against sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// One persisted job. Jobs may form trees via `parent_id`; cancelling a
/// parent cascades to its descendants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: i64,
    pub agent_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    /// When set, the job is not eligible to run before this instant.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Ordered log lines appended by the runner and the agent.
    pub logs: Vec<String>,
}

impl Job {
    pub fn new(
        session_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            parent_id: None,
            title: title.into(),
            description: description.into(),
            priority: 0,
            agent_id: agent_id.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            last_retry_at: None,
            next_run_at: None,
            logs: Vec::new(),
        }
    }

    /// True when the job is pending and its schedule (if any) has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.next_run_at.map(|at| at <= now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// **Scenario**: A pending job with no schedule is due immediately; a
    /// future next_run_at defers it.
    #[test]
    fn due_respects_schedule() {
        let now = Utc::now();
        let mut job = Job::new("s1", "t", "d", "agent");
        assert!(job.is_due(now));
        job.next_run_at = Some(now + Duration::seconds(30));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + Duration::seconds(31)));
    }

    /// **Scenario**: Non-pending jobs are never due.
    #[test]
    fn running_not_due() {
        let mut job = Job::new("s1", "t", "d", "agent");
        job.status = JobStatus::Running;
        assert!(!job.is_due(Utc::now()));
    }
}
