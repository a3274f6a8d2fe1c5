//! Job agents: who actually executes a job.
//!
//! The registry resolves an agent id to an implementation. Code-registered
//! agents win; otherwise a persisted [`AgentProfile`] runs through the
//! generic [`ChatJobAgent`], which drives the chat engine with the profile's
//! composed system prompt. Agents own status transitions, log appends, and
//! retry bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use chat_event::ChatDelta;

use crate::engine::{ChatEngine, ChatTurnRequest};
use crate::model::{Job, JobStatus};
use crate::session::SessionManager;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("persistence: {0}")]
    Store(#[from] StoreError),
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Executes one job to completion. Implementations own the job's status
/// transitions and logs; a returned error makes the runner record retry
/// state.
#[async_trait]
pub trait JobAgent: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, job: &Job, sessions: &Arc<SessionManager>) -> Result<(), JobError>;
}

/// Resolves agent ids: code-registered agents first, then persisted
/// profiles through the generic chat agent.
pub struct AgentRegistry {
    store: Arc<Store>,
    engine: Arc<ChatEngine>,
    registered: DashMap<String, Arc<dyn JobAgent>>,
}

impl AgentRegistry {
    pub fn new(store: Arc<Store>, engine: Arc<ChatEngine>) -> Self {
        Self {
            store,
            engine,
            registered: DashMap::new(),
        }
    }

    pub fn register(&self, agent: Arc<dyn JobAgent>) {
        self.registered.insert(agent.id().to_string(), agent);
    }

    pub async fn resolve(&self, agent_id: &str) -> Result<Arc<dyn JobAgent>, JobError> {
        if let Some(agent) = self.registered.get(agent_id) {
            return Ok(Arc::clone(agent.value()));
        }
        match self.store.get_agent(agent_id).await {
            Ok(profile) => Ok(Arc::new(ChatJobAgent::new(
                Arc::clone(&self.engine),
                profile.id.clone(),
                profile.compose_prompt(),
            ))),
            Err(StoreError::NotFound(_)) => Err(JobError::AgentNotFound(agent_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Generic agent: one chat turn over the job's session with the profile's
/// composed prompt. Retries with exponential backoff up to
/// [`ChatJobAgent::MAX_RETRIES`].
pub struct ChatJobAgent {
    engine: Arc<ChatEngine>,
    agent_id: String,
    system_prompt: String,
}

impl ChatJobAgent {
    pub const MAX_RETRIES: u32 = 3;

    pub fn new(engine: Arc<ChatEngine>, agent_id: String, system_prompt: String) -> Self {
        Self {
            engine,
            agent_id,
            system_prompt,
        }
    }

    fn backoff(retry_count: u32) -> ChronoDuration {
        ChronoDuration::seconds(30 * (1 << retry_count.min(6)) as i64)
    }

    async fn drive_turn(&self, job: &Job) -> Result<(), JobError> {
        let request = ChatTurnRequest {
            content: format!("{}\n\n{}", job.title, job.description),
            tool_outputs: Vec::new(),
            system_preamble: Some(self.system_prompt.clone()),
        };
        let mut rx = self.engine.stream_turn(&job.session_id, request);
        let mut failure: Option<String> = None;
        while let Some(delta) = rx.recv().await {
            if let ChatDelta::Error { message } = delta {
                failure = Some(message);
            }
        }
        match failure {
            Some(message) => Err(JobError::Execution(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobAgent for ChatJobAgent {
    fn id(&self) -> &str {
        &self.agent_id
    }

    async fn run(&self, job: &Job, sessions: &Arc<SessionManager>) -> Result<(), JobError> {
        let store = sessions.store();
        store
            .update_job_status(&job.id, JobStatus::Running, Some("Started"))
            .await?;

        match self.drive_turn(job).await {
            Ok(()) => {
                store
                    .update_job_status(&job.id, JobStatus::Succeeded, Some("Completed"))
                    .await?;
                Ok(())
            }
            Err(e) => {
                let current = store.get_job(&job.id).await?;
                if current.retry_count >= Self::MAX_RETRIES {
                    store
                        .update_job_status(
                            &job.id,
                            JobStatus::Failed,
                            Some(&format!("Failed after {} retries: {}", current.retry_count, e)),
                        )
                        .await?;
                } else {
                    let next = Utc::now() + Self::backoff(current.retry_count);
                    store
                        .record_job_retry(&job.id, Some(next), &format!("Crashed: {}", e))
                        .await?;
                }
                Err(e)
            }
        }
    }
}
