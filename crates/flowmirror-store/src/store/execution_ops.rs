//! Execution upserts and reads.

use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;
use tracing::debug;

use super::MirrorStore;
use crate::error::Result;
use crate::rows::{ExecutionFingerprint, ExecutionRecord, ExecutionSummary, from_millis};

const SUMMARY_COLUMNS: &str = "id, workflow_id, status, mode, started_at, stopped_at, duration_ms,
    finished, has_detailed_data, error_message, last_node_executed, detailed_steps, business_context";

impl MirrorStore {
    /// Change fingerprint of a stored execution, if present.
    pub fn execution_fingerprint(&self, id: &str) -> Result<Option<ExecutionFingerprint>> {
        let fingerprint = self
            .conn()
            .query_row(
                "SELECT remote_status, stopped_at, has_detailed_data, raw_data
                 FROM executions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ExecutionFingerprint {
                        remote_status: row.get(0)?,
                        stopped_at: row.get(1)?,
                        has_detailed_data: row.get(2)?,
                        raw_data: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(fingerprint)
    }

    /// Insert or replace an execution.
    ///
    /// `duration_ms` and `error_message` are reset so the derivation engine
    /// recomputes them from the new timestamps and error. Returns `true`
    /// when a row with the same id already existed.
    pub fn upsert_execution(&self, record: &ExecutionRecord) -> Result<bool> {
        let conn = self.conn();
        let existed = conn
            .query_row(
                "SELECT 1 FROM executions WHERE id = ?1",
                params![record.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        conn.execute(
            r#"
            INSERT INTO executions (id, workflow_id, status, remote_status, mode, started_at,
                                    stopped_at, wait_till, duration_ms, finished, retry_of,
                                    raw_data, raw_error, has_detailed_data, detailed_steps,
                                    business_context, error_message, last_node_executed, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10, ?11, ?12, ?13, ?14, ?15, NULL, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                workflow_id = excluded.workflow_id,
                status = excluded.status,
                remote_status = excluded.remote_status,
                mode = excluded.mode,
                started_at = excluded.started_at,
                stopped_at = excluded.stopped_at,
                wait_till = excluded.wait_till,
                duration_ms = NULL,
                finished = excluded.finished,
                retry_of = excluded.retry_of,
                raw_data = excluded.raw_data,
                raw_error = excluded.raw_error,
                has_detailed_data = excluded.has_detailed_data,
                detailed_steps = excluded.detailed_steps,
                business_context = excluded.business_context,
                error_message = NULL,
                last_node_executed = excluded.last_node_executed,
                synced_at = excluded.synced_at
            "#,
            params![
                record.id,
                record.workflow_id,
                record.status.map(|s| s.as_str()),
                record.remote_status,
                record.mode,
                record.started_at,
                record.stopped_at,
                record.wait_till,
                record.finished,
                record.retry_of,
                record.raw_data,
                record.raw_error,
                record.has_detailed_data,
                record.detailed_steps,
                record.business_context,
                record.last_node_executed,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;

        debug!(execution_id = %record.id, existed, detailed = record.has_detailed_data, "Upserted execution");
        Ok(existed)
    }

    /// Get one execution.
    pub fn get_execution(&self, id: &str) -> Result<Option<ExecutionSummary>> {
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM executions WHERE id = ?1");
        let summary = self
            .conn()
            .query_row(&sql, params![id], row_to_summary)
            .optional()?;
        Ok(summary)
    }

    /// Most recent executions, optionally for one workflow.
    pub fn recent_executions(
        &self,
        workflow_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ExecutionSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM executions
             WHERE ?1 IS NULL OR workflow_id = ?1
             ORDER BY started_at IS NULL, started_at DESC, id DESC
             LIMIT ?2"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![workflow_id, limit], row_to_summary)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Number of mirrored executions.
    pub fn execution_count(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM executions", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_json(text: Option<String>) -> Option<Value> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<ExecutionSummary> {
    Ok(ExecutionSummary {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        status: row.get(2)?,
        mode: row.get(3)?,
        started_at: from_millis(row.get(4)?),
        stopped_at: from_millis(row.get(5)?),
        duration_ms: row.get(6)?,
        finished: row.get(7)?,
        has_detailed_data: row.get(8)?,
        error_message: row.get(9)?,
        last_node_executed: row.get(10)?,
        detailed_steps: parse_json(row.get(11)?),
        business_context: parse_json(row.get(12)?),
    })
}
