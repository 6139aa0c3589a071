// Durable record of edit jobs, keyed by job sequence id.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::course_db::CourseStore;
use crate::job::{JobData, JobLogLine, JobSnapshot, JobStatus};

/// Where finished (and in-flight) jobs are kept for later inspection.
pub trait JobStore: Send + Sync {
    /// Insert or replace the stored copy of a job.
    fn record_job(&self, job: &JobSnapshot) -> Result<()>;

    fn load_job(&self, id: Uuid) -> Result<Option<JobSnapshot>>;
}

impl JobStore for CourseStore {
    fn record_job(&self, job: &JobSnapshot) -> Result<()> {
        let data = serde_json::to_string(&job.data).context("failed to encode job data")?;
        let log = serde_json::to_string(&job.log).context("failed to encode job log")?;
        self.conn()?
            .execute(
                "INSERT INTO job_sequences
                    (job_id, course_id, description, user_uid, authn_user_uid,
                     status, data, log, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (job_id) DO UPDATE SET
                    status = excluded.status,
                    data = excluded.data,
                    log = excluded.log,
                    finished_at = excluded.finished_at",
                params![
                    job.id.to_string(),
                    job.course_id,
                    job.description,
                    job.user_uid,
                    job.authn_user_uid,
                    job.status.as_str(),
                    data,
                    log,
                    job.created_at.to_rfc3339(),
                    job.finished_at.map(|at| at.to_rfc3339()),
                ],
            )
            .with_context(|| format!("failed to record job {}", job.id))?;
        Ok(())
    }

    fn load_job(&self, id: Uuid) -> Result<Option<JobSnapshot>> {
        type RawJob = (String, String, String, String, String, String, String, String, Option<String>);

        let raw: Option<RawJob> = self
            .conn()?
            .query_row(
                "SELECT course_id, description, user_uid, authn_user_uid, status, data, log,
                        created_at, finished_at
                 FROM job_sequences WHERE job_id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to load job {id}"))?;

        let Some((course_id, description, user_uid, authn_user_uid, status, data, log, created, finished)) =
            raw
        else {
            return Ok(None);
        };

        let status = JobStatus::parse(&status)
            .with_context(|| format!("job {id} has unknown status `{status}`"))?;
        let data: JobData = serde_json::from_str(&data).context("failed to decode job data")?;
        let log: Vec<JobLogLine> = serde_json::from_str(&log).context("failed to decode job log")?;

        Ok(Some(JobSnapshot {
            id,
            course_id,
            description,
            user_uid,
            authn_user_uid,
            status,
            data,
            log,
            created_at: parse_timestamp(&created)?,
            finished_at: finished.as_deref().map(parse_timestamp).transpose()?,
        }))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("invalid job timestamp `{raw}`"))
}
