//! Job runner: event-driven dispatch plus a periodic catch-all scan.
//!
//! One listener on the store's job stream fires immediately for pending jobs
//! that are due; a 10-second scanner picks up scheduled jobs whose deadline
//! has passed (and anything the listener missed). Jobs run sequentially in
//! the runner task; cancellation is observed between jobs so an in-flight
//! tool call can finish and its tool message does not leak into the next
//! run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::model::{Job, JobStatus};
use crate::session::SessionManager;
use crate::store::{JobEvent, Store, StoreError};

use super::agent::{AgentRegistry, JobError};

/// Period of the catch-all scanner.
pub const SCAN_PERIOD: Duration = Duration::from_secs(10);
/// Pending jobs fetched per scan.
pub const SCAN_BATCH: usize = 8;

/// Executes pending jobs through resolved agents.
pub struct JobRunner {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
    agents: Arc<AgentRegistry>,
    scan_period: Duration,
}

impl JobRunner {
    pub fn new(
        store: Arc<Store>,
        sessions: Arc<SessionManager>,
        agents: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            store,
            sessions,
            agents,
            scan_period: SCAN_PERIOD,
        }
    }

    /// Overrides the scanner period (tests).
    pub fn with_scan_period(mut self, period: Duration) -> Self {
        self.scan_period = period;
        self
    }

    /// Starts the runner. Returns the task handle and a token that stops it
    /// between jobs.
    pub fn start(self: Arc<Self>) -> (tokio::task::JoinHandle<()>, CancellationToken) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            self.run(stop).await;
        });
        (handle, token)
    }

    async fn run(&self, stop: CancellationToken) {
        let mut events = self.store.subscribe_jobs();
        let mut scanner = tokio::time::interval(self.scan_period);
        scanner.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => match event {
                    Ok(JobEvent::Updated(job)) => {
                        if job.is_due(Utc::now()) {
                            self.process_job(job).await;
                        }
                    }
                    Ok(JobEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "job event stream lagged; scanner will catch up");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = scanner.tick() => {
                    match self.store.pending_jobs_due(Utc::now(), SCAN_BATCH).await {
                        Ok(jobs) => {
                            for job in jobs {
                                if stop.is_cancelled() {
                                    return;
                                }
                                self.process_job(job).await;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "pending job scan failed"),
                    }
                }
            }
        }
    }

    /// Processes one job end to end. The claim re-check keeps the event and
    /// scanner paths from double-running the same job.
    async fn process_job(&self, job: Job) {
        let current = match self.store.get_job(&job.id).await {
            Ok(j) => j,
            Err(StoreError::NotFound(_)) => return,
            Err(e) => {
                tracing::warn!(job = %job.id, error = %e, "job fetch failed");
                return;
            }
        };
        if !current.is_due(Utc::now()) {
            return;
        }

        match self.store.get_session(&current.session_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                if let Err(e) = self
                    .store
                    .update_job_status(&current.id, JobStatus::Cancelled, Some("Session not found"))
                    .await
                {
                    tracing::warn!(job = %current.id, error = %e, "cancel failed");
                }
                return;
            }
            Err(e) => {
                tracing::warn!(job = %current.id, error = %e, "session lookup failed");
                return;
            }
        }

        if let Err(e) = self
            .sessions
            .hydrate_session(&current.session_id, Some(&current.id))
            .await
        {
            tracing::warn!(job = %current.id, error = %e, "hydration failed");
            let _ = self
                .store
                .append_job_log(&current.id, &format!("Hydration failed: {}", e))
                .await;
        }

        let agent = match self.agents.resolve(&current.agent_id).await {
            Ok(agent) => agent,
            Err(JobError::AgentNotFound(id)) => {
                let _ = self
                    .store
                    .update_job_status(
                        &current.id,
                        JobStatus::Failed,
                        Some(&format!("Agent not found: {}", id)),
                    )
                    .await;
                return;
            }
            Err(e) => {
                tracing::warn!(job = %current.id, error = %e, "agent resolution failed");
                return;
            }
        };

        if let Err(e) = agent.run(&current, &self.sessions).await {
            tracing::warn!(job = %current.id, error = %e, "job run failed");
        }
    }

    /// Cancels a job and its descendants.
    pub async fn cancel(&self, job_id: &str) -> Result<Vec<String>, StoreError> {
        self.store.cancel_job_tree(job_id).await
    }
}
