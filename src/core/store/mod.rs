pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use rusqlite::{Connection, params, params_from_iter};
use tokio::sync::Mutex;
use tracing::info;

use types::{Decision, FeedbackEntry, JobFilter, JobMetadata, JobPatch, JobRecord, NewJob, Segment};

const JOB_COLUMNS: &str = "id, title, status, proposal_content, domain, division, \
     human_decision, llm_decision, hitl_stages, segments, enable_sequential_thinking, \
     improve, metadata, created_at, updated_at";

/// Durable job store backed by SQLite. All access goes through one
/// connection behind an async mutex, so writes for a given job are
/// serialized.
pub struct JobStore {
    db: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        info!("Job store ready");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                proposal_content TEXT NOT NULL DEFAULT '',
                domain TEXT NOT NULL DEFAULT '',
                division TEXT NOT NULL DEFAULT '',
                human_decision TEXT NOT NULL DEFAULT 'pending',
                llm_decision TEXT NOT NULL DEFAULT 'pending',
                hitl_stages TEXT NOT NULL DEFAULT '[]',
                segments TEXT NOT NULL DEFAULT '[]',
                enable_sequential_thinking INTEGER NOT NULL DEFAULT 0,
                improve INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }

    pub async fn create_job(&self, new: NewJob) -> Result<i64> {
        let db = self.db.lock().await;
        let metadata = JobMetadata {
            hitl_stages: Some(new.hitl_stages.clone()),
            ..JobMetadata::default()
        };
        db.execute(
            "INSERT INTO jobs (title, status, proposal_content, domain, division, \
             hitl_stages, segments, enable_sequential_thinking, improve, metadata)
             VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.title,
                new.proposal_content,
                new.domain,
                new.division,
                serde_json::to_string(&new.hitl_stages)?,
                serde_json::to_string(&new.segments)?,
                new.enable_sequential_thinking as i64,
                new.improve as i64,
                serde_json::to_string(&metadata)?,
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1 LIMIT 1"))?;
        let mut rows = stmt.query(params![job_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_job(row)?)),
            None => Ok(None),
        }
    }

    /// Field-level patch. Scalars overwrite; `metadata` is deep-merged with
    /// the stored bag under the `merge_metadata` rule. The read-merge-write
    /// happens under the connection lock, so concurrent patches for the
    /// same job commit in a serial order.
    pub async fn update_job(&self, job_id: i64, patch: JobPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }

        let db = self.db.lock().await;
        let mut fields: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(title) = patch.title {
            fields.push("title = ?");
            values.push(title.into());
        }
        if let Some(content) = patch.proposal_content {
            fields.push("proposal_content = ?");
            values.push(content.into());
        }
        if let Some(domain) = patch.domain {
            fields.push("domain = ?");
            values.push(domain.into());
        }
        if let Some(division) = patch.division {
            fields.push("division = ?");
            values.push(division.into());
        }
        if let Some(status) = patch.status {
            fields.push("status = ?");
            values.push(status.into());
        }
        if let Some(decision) = patch.human_decision {
            fields.push("human_decision = ?");
            values.push(decision.as_str().to_string().into());
        }
        if let Some(decision) = patch.llm_decision {
            fields.push("llm_decision = ?");
            values.push(decision.as_str().to_string().into());
        }
        if let Some(stages) = patch.hitl_stages {
            fields.push("hitl_stages = ?");
            values.push(serde_json::to_string(&stages)?.into());
        }
        if let Some(meta_patch) = patch.metadata {
            let current_json: String = db
                .query_row(
                    "SELECT metadata FROM jobs WHERE id = ?1",
                    params![job_id],
                    |row| row.get(0),
                )
                .map_err(|_| anyhow!("Job {} not found", job_id))?;
            let mut current: JobMetadata = serde_json::from_str(&current_json)?;
            merge_metadata(&mut current, meta_patch);
            fields.push("metadata = ?");
            values.push(serde_json::to_string(&current)?.into());
        }

        fields.push("updated_at = CURRENT_TIMESTAMP");
        values.push(job_id.into());

        let sql = format!("UPDATE jobs SET {} WHERE id = ?", fields.join(", "));
        let rows = db.execute(&sql, params_from_iter(values))?;
        Ok(rows > 0)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        let db = self.db.lock().await;
        let (where_sql, mut values) = filter_clause(filter);
        let order = if filter.ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE 1 = 1{where_sql} \
             ORDER BY datetime(created_at) {order}, id {order} LIMIT ? OFFSET ?"
        );
        values.push((filter.limit as i64).into());
        values.push((filter.offset as i64).into());

        let mut stmt = db.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_job(row)?);
        }
        Ok(out)
    }

    pub async fn count_jobs(&self, filter: &JobFilter) -> Result<i64> {
        let db = self.db.lock().await;
        let (where_sql, values) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs WHERE 1 = 1{where_sql}");
        let total = db.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(total)
    }

    pub async fn delete_job(&self, job_id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        Ok(rows > 0)
    }

    /// Append a HITL feedback entry to the job's audit trail.
    pub async fn record_feedback(&self, job_id: i64, feedback: &str, skip: bool) -> Result<()> {
        let db = self.db.lock().await;
        let current_json: String = db
            .query_row(
                "SELECT metadata FROM jobs WHERE id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .map_err(|_| anyhow!("Job {} not found", job_id))?;
        let timestamp: String = db.query_row("SELECT datetime('now')", [], |row| row.get(0))?;

        let mut metadata: JobMetadata = serde_json::from_str(&current_json)?;
        metadata
            .feedback_history
            .get_or_insert_with(Vec::new)
            .push(FeedbackEntry {
                feedback: feedback.to_string(),
                skip,
                timestamp,
            });

        db.execute(
            "UPDATE jobs SET metadata = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![serde_json::to_string(&metadata)?, job_id],
        )?;
        Ok(())
    }
}

/// Deep-merge rule for the metadata bag: top-level keys overwrite, except
/// `agent_results` (and the open `extra` bag) which merge key-wise with the
/// patch winning per name.
pub fn merge_metadata(current: &mut JobMetadata, patch: JobMetadata) {
    current.agent_results.extend(patch.agent_results);
    current.extra.extend(patch.extra);
    if patch.final_decision.is_some() {
        current.final_decision = patch.final_decision;
    }
    if patch.report.is_some() {
        current.report = patch.report;
    }
    if patch.hitl_stages.is_some() {
        current.hitl_stages = patch.hitl_stages;
    }
    if patch.segment_reports.is_some() {
        current.segment_reports = patch.segment_reports;
    }
    if patch.feedback_history.is_some() {
        current.feedback_history = patch.feedback_history;
    }
}

fn filter_clause(filter: &JobFilter) -> (String, Vec<rusqlite::types::Value>) {
    let mut sql = String::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(ref status) = filter.status {
        sql.push_str(" AND status = ?");
        values.push(status.clone().into());
    }
    if let Some(decision) = filter.human_decision {
        sql.push_str(" AND human_decision = ?");
        values.push(decision.as_str().to_string().into());
    }
    if let Some(decision) = filter.llm_decision {
        sql.push_str(" AND llm_decision = ?");
        values.push(decision.as_str().to_string().into());
    }
    if let Some(ref search) = filter.search {
        sql.push_str(" AND (proposal_content LIKE ? OR COALESCE(title, '') LIKE ?)");
        let like = format!("%{}%", search);
        values.push(like.clone().into());
        values.push(like.into());
    }

    (sql, values)
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRecord> {
    let human_decision: String = row.get(6)?;
    let llm_decision: String = row.get(7)?;
    let hitl_json: String = row.get(8)?;
    let segments_json: String = row.get(9)?;
    let seq_thinking: i64 = row.get(10)?;
    let improve: i64 = row.get(11)?;
    let metadata_json: String = row.get(12)?;

    let hitl_stages: Vec<u8> = serde_json::from_str(&hitl_json)?;
    let segments: Vec<Segment> = serde_json::from_str(&segments_json)?;
    let metadata: JobMetadata = serde_json::from_str(&metadata_json)?;

    Ok(JobRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        status: row.get(2)?,
        proposal_content: row.get(3)?,
        domain: row.get(4)?,
        division: row.get(5)?,
        human_decision: Decision::from_str(&human_decision).unwrap_or_default(),
        llm_decision: Decision::from_str(&llm_decision).unwrap_or_default(),
        hitl_stages,
        segments,
        enable_sequential_thinking: seq_thinking != 0,
        improve: improve != 0,
        metadata,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
