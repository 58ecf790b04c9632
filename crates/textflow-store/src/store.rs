use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use textflow_core::error::{Result, TextflowError};
use textflow_core::traits::{RunHistoryStore, WorkflowStore};
use textflow_core::types::{
    RunId, RunRecord, RunStatus, StepDefinition, StepResult, Workflow, WorkflowId,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        steps_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_workflows_created
        ON workflows(created_at DESC);

    CREATE TABLE IF NOT EXISTS run_history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        workflow_id TEXT NOT NULL,
        workflow_name TEXT NOT NULL,
        input_text TEXT NOT NULL,
        steps_json TEXT NOT NULL,
        results_json TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL CHECK (status IN ('completed', 'failed')),
        error TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_run_history_created
        ON run_history(created_at DESC);

    CREATE INDEX IF NOT EXISTS idx_run_history_workflow
        ON run_history(workflow_id, created_at DESC);";

/// SQLite-backed workflow store and run history.
///
/// Constructed explicitly and injected where needed; call [`SqliteStore::close`]
/// for an orderly shutdown.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> TextflowError {
    TextflowError::Database(e.to_string())
}

/// Fixed-width UTC timestamp so text ordering matches time ordering.
fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TextflowError::Database(format!("Bad timestamp '{}': {}", s, e)))
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TextflowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Close the underlying connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| TextflowError::Database(e.to_string()))?;
        conn.close().map_err(|(_, e)| db_err(e))?;
        debug!("SQLite store closed");
        Ok(())
    }

    /// Number of run records stored.
    pub fn run_count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| TextflowError::Database(e.to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM run_history", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

/// A run_history row before JSON columns are decoded.
struct RunRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    input_text: String,
    steps_json: String,
    results_json: String,
    status: String,
    error: Option<String>,
    created_at: String,
}

impl RunRow {
    fn into_record(self) -> Result<RunRecord> {
        let steps: Vec<StepDefinition> = serde_json::from_str(&self.steps_json)?;
        let results: Vec<StepResult> = serde_json::from_str(&self.results_json)?;
        Ok(RunRecord {
            id: RunId(self.id),
            workflow_id: WorkflowId(self.workflow_id),
            workflow_name: self.workflow_name,
            input_text: self.input_text,
            steps,
            results,
            status: self.status.parse::<RunStatus>()?,
            error: self.error,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn query_runs<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(RunRow {
                id: row.get(0)?,
                workflow_id: row.get(1)?,
                workflow_name: row.get(2)?,
                input_text: row.get(3)?,
                steps_json: row.get(4)?,
                results_json: row.get(5)?,
                status: row.get(6)?,
                error: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .map_err(db_err)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(db_err)?.into_record()?);
    }
    Ok(records)
}

const RUN_COLUMNS: &str =
    "id, workflow_id, workflow_name, input_text, steps_json, results_json, status, error, created_at";

impl RunHistoryStore for SqliteStore {
    fn append(&self, record: &RunRecord) -> BoxFuture<'_, Result<()>> {
        let record = record.clone();

        Box::pin(async move {
            let steps_json = serde_json::to_string(&record.steps)?;
            let results_json = serde_json::to_string(&record.results)?;

            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            conn.execute(
                "INSERT INTO run_history
                    (id, workflow_id, workflow_name, input_text, steps_json, results_json, status, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.0,
                    record.workflow_id.0,
                    record.workflow_name,
                    record.input_text,
                    steps_json,
                    results_json,
                    record.status.as_str(),
                    record.error,
                    timestamp(&record.created_at),
                ],
            )
            .map_err(db_err)?;

            debug!(run_id = %record.id, status = %record.status, "Run record appended");
            Ok(())
        })
    }

    fn list_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<RunRecord>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            query_runs(
                &conn,
                &format!(
                    "SELECT {} FROM run_history ORDER BY created_at DESC, seq DESC LIMIT ?1",
                    RUN_COLUMNS
                ),
                params![limit as i64],
            )
        })
    }

    fn list_for_workflow(
        &self,
        id: &WorkflowId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RunRecord>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            query_runs(
                &conn,
                &format!(
                    "SELECT {} FROM run_history WHERE workflow_id = ?1
                     ORDER BY created_at DESC, seq DESC LIMIT ?2",
                    RUN_COLUMNS
                ),
                params![id, limit as i64],
            )
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(db_err)?;
            Ok(())
        })
    }
}

impl WorkflowStore for SqliteStore {
    fn create_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let workflow = workflow.clone();

        Box::pin(async move {
            let steps_json = serde_json::to_string(&workflow.steps)?;
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            conn.execute(
                "INSERT INTO workflows (id, name, description, steps_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    workflow.id.0,
                    workflow.name,
                    workflow.description,
                    steps_json,
                    timestamp(&workflow.created_at),
                ],
            )
            .map_err(|e| TextflowError::Database(format!("Failed to create workflow: {}", e)))?;
            Ok(())
        })
    }

    fn list_workflows(&self) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, steps_json, created_at FROM workflows
                     ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map([], workflow_row)
                .map_err(db_err)?;

            let mut workflows = Vec::new();
            for row in rows {
                workflows.push(decode_workflow(row.map_err(db_err)?)?);
            }
            Ok(workflows)
        })
    }

    fn get_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, steps_json, created_at FROM workflows
                     WHERE id = ?1",
                )
                .map_err(db_err)?;

            let mut rows = stmt.query_map(params![id], workflow_row).map_err(db_err)?;
            let first = rows.next();
            match first {
                Some(row) => Ok(Some(decode_workflow(row.map_err(db_err)?)?)),
                None => Ok(None),
            }
        })
    }

    fn delete_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<bool>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| TextflowError::Database(e.to_string()))?;

            let deleted = conn
                .execute("DELETE FROM workflows WHERE id = ?1", params![id])
                .map_err(db_err)?;
            Ok(deleted > 0)
        })
    }
}

type WorkflowRow = (String, String, Option<String>, String, String);

fn workflow_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkflowRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_workflow((id, name, description, steps_json, created_at): WorkflowRow) -> Result<Workflow> {
    Ok(Workflow {
        id: WorkflowId(id),
        name,
        description,
        steps: serde_json::from_str(&steps_json)?,
        created_at: parse_timestamp(&created_at)?,
    })
}
