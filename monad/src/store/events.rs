//! Job event stream: broadcast of commits against the job table.

use crate::model::Job;

/// One job mutation, published after the row is committed.
#[derive(Clone, Debug)]
pub enum JobEvent {
    Updated(Job),
    Deleted(String),
}

impl JobEvent {
    /// Job id the event concerns.
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Updated(job) => &job.id,
            JobEvent::Deleted(id) => id,
        }
    }
}
