//! Job CRUD, pending scans, and the event stream hooks.
//!
//! Every committed mutation is published on the broadcast stream so the job
//! runner can react without polling; the periodic scanner remains the
//! catch-all for scheduled and missed jobs.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::model::{Job, JobStatus};

use super::{from_json_text, map_sql_err, to_json_text, ts_from_sql, JobEvent, Store, StoreError};

const JOB_COLUMNS: &str = "id, session_id, parent_id, title, description, priority, agent_id, \
     status, created_at, updated_at, retry_count, last_retry_at, next_run_at, logs";

fn opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match value {
        Some(s) => Ok(Some(ts_from_sql(idx, s)?)),
        None => Ok(None),
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(7)?;
    let created: String = row.get(8)?;
    let updated: String = row.get(9)?;
    let last_retry: Option<String> = row.get(11)?;
    let next_run: Option<String> = row.get(12)?;
    let logs: String = row.get(13)?;
    Ok(Job {
        id: row.get(0)?,
        session_id: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: row.get(5)?,
        agent_id: row.get(6)?,
        status: status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: ts_from_sql(8, created)?,
        updated_at: ts_from_sql(9, updated)?,
        retry_count: row.get::<_, i64>(10)? as u32,
        last_retry_at: opt_ts(11, last_retry)?,
        next_run_at: opt_ts(12, next_run)?,
        logs: from_json_text(&logs),
    })
}

impl Store {
    /// Inserts or replaces a job row and publishes `JobEvent::Updated`.
    pub async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let logs = to_json_text(&job.logs)?;
        let row = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO job (id, session_id, parent_id, title, description, priority, \
                     agent_id, status, created_at, updated_at, retry_count, last_retry_at, \
                     next_run_at, logs) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
                 ON CONFLICT(id) DO UPDATE SET \
                     title = excluded.title, \
                     description = excluded.description, \
                     priority = excluded.priority, \
                     agent_id = excluded.agent_id, \
                     status = excluded.status, \
                     updated_at = excluded.updated_at, \
                     retry_count = excluded.retry_count, \
                     last_retry_at = excluded.last_retry_at, \
                     next_run_at = excluded.next_run_at, \
                     logs = excluded.logs",
                params![
                    row.id,
                    row.session_id,
                    row.parent_id,
                    row.title,
                    row.description,
                    row.priority,
                    row.agent_id,
                    row.status.as_str(),
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                    row.retry_count as i64,
                    row.last_retry_at.map(|t| t.to_rfc3339()),
                    row.next_run_at.map(|t| t.to_rfc3339()),
                    logs,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })?;
        self.emit_job_event(JobEvent::Updated(job.clone()));
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM job WHERE id = ?1", JOB_COLUMNS);
            conn.query_row(&sql, params![id], row_to_job).map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("job {}", id))
                }
                other => map_sql_err(other),
            })
        })
    }

    pub async fn list_jobs_for_session(&self, session_id: &str) -> Result<Vec<Job>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM job WHERE session_id = ?1 ORDER BY created_at, id",
                JOB_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![session_id], row_to_job)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    /// Top pending jobs that are due at `now`, highest priority first.
    pub async fn pending_jobs_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let now_text = now.to_rfc3339();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM job \
                 WHERE status = 'pending' AND (next_run_at IS NULL OR next_run_at <= ?1) \
                 ORDER BY priority DESC, created_at LIMIT ?2",
                JOB_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![now_text, limit as i64], row_to_job)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    /// Updates a job's status, optionally appending a log line. Publishes the
    /// updated row.
    pub async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        log_line: Option<&str>,
    ) -> Result<Job, StoreError> {
        let mut job = self.get_job(id).await?;
        job.status = status;
        job.updated_at = Utc::now();
        if let Some(line) = log_line {
            job.logs.push(line.to_string());
        }
        self.save_job(&job).await?;
        Ok(job)
    }

    /// Appends a log line without touching the status.
    pub async fn append_job_log(&self, id: &str, line: &str) -> Result<Job, StoreError> {
        let mut job = self.get_job(id).await?;
        job.logs.push(line.to_string());
        job.updated_at = Utc::now();
        self.save_job(&job).await?;
        Ok(job)
    }

    /// Records a retry: bumps the count, stamps `last_retry_at`, reschedules,
    /// and resets the job to pending.
    pub async fn record_job_retry(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
        log_line: &str,
    ) -> Result<Job, StoreError> {
        let mut job = self.get_job(id).await?;
        job.retry_count += 1;
        job.last_retry_at = Some(Utc::now());
        job.next_run_at = next_run_at;
        job.status = JobStatus::Pending;
        job.updated_at = Utc::now();
        job.logs.push(log_line.to_string());
        self.save_job(&job).await?;
        Ok(job)
    }

    /// Cancels a job and all of its descendants. Returns cancelled ids.
    pub async fn cancel_job_tree(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let root = id.to_string();
        let ids = self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "WITH RECURSIVE tree(id) AS ( \
                         SELECT id FROM job WHERE id = ?1 \
                         UNION ALL \
                         SELECT job.id FROM job JOIN tree ON job.parent_id = tree.id \
                     ) SELECT id FROM tree",
                )
                .map_err(map_sql_err)?;
            let rows = stmt
                .query_map(params![root], |row| row.get::<_, String>(0))
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })?;

        let mut cancelled = Vec::new();
        for job_id in ids {
            let job = self.get_job(&job_id).await?;
            if matches!(job.status, JobStatus::Succeeded | JobStatus::Cancelled) {
                continue;
            }
            self.update_job_status(&job_id, JobStatus::Cancelled, Some("Cancelled"))
                .await?;
            cancelled.push(job_id);
        }
        Ok(cancelled)
    }

    /// Deletes a job row and publishes `JobEvent::Deleted`.
    pub async fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        let key = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM job WHERE id = ?1", params![key])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("job {}", key)));
            }
            Ok(())
        })?;
        self.emit_job_event(JobEvent::Deleted(id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// **Scenario**: Saving a job publishes it on the event stream.
    #[tokio::test(flavor = "multi_thread")]
    async fn save_publishes_event() {
        let store = Store::open_in_memory().unwrap();
        let mut rx = store.subscribe_jobs();
        let job = Job::new("s1", "title", "desc", "agent");
        store.save_job(&job).await.unwrap();

        match rx.recv().await.unwrap() {
            JobEvent::Updated(j) => assert_eq!(j.id, job.id),
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    /// **Scenario**: A scheduled job is not due until its deadline passes.
    #[tokio::test(flavor = "multi_thread")]
    async fn pending_due_respects_schedule() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let mut job = Job::new("s1", "later", "", "agent");
        job.next_run_at = Some(now + Duration::seconds(30));
        store.save_job(&job).await.unwrap();

        assert!(store.pending_jobs_due(now, 10).await.unwrap().is_empty());
        let due = store
            .pending_jobs_due(now + Duration::seconds(31), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, job.id);
    }

    /// **Scenario**: Cancelling a parent cascades to pending children but
    /// leaves finished ones untouched.
    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_cascades() {
        let store = Store::open_in_memory().unwrap();
        let parent = Job::new("s1", "parent", "", "agent");
        store.save_job(&parent).await.unwrap();
        let mut child = Job::new("s1", "child", "", "agent");
        child.parent_id = Some(parent.id.clone());
        store.save_job(&child).await.unwrap();
        let mut done = Job::new("s1", "done", "", "agent");
        done.parent_id = Some(parent.id.clone());
        done.status = JobStatus::Succeeded;
        store.save_job(&done).await.unwrap();

        let cancelled = store.cancel_job_tree(&parent.id).await.unwrap();
        assert!(cancelled.contains(&parent.id));
        assert!(cancelled.contains(&child.id));
        assert!(!cancelled.contains(&done.id));
        assert_eq!(
            store.get_job(&done.id).await.unwrap().status,
            JobStatus::Succeeded
        );
    }

    /// **Scenario**: Retry bookkeeping bumps the count and re-pends the job.
    #[tokio::test(flavor = "multi_thread")]
    async fn retry_bookkeeping() {
        let store = Store::open_in_memory().unwrap();
        let mut job = Job::new("s1", "flaky", "", "agent");
        job.status = JobStatus::Running;
        store.save_job(&job).await.unwrap();

        let retried = store
            .record_job_retry(&job.id, None, "crashed: boom")
            .await
            .unwrap();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(retried.last_retry_at.is_some());
        assert!(retried.logs.iter().any(|l| l.contains("crashed")));
    }
}
