//! Workflow upserts and reads.

use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use super::MirrorStore;
use crate::error::Result;
use crate::rows::{StoredPayload, WorkflowFingerprint, WorkflowRecord, WorkflowSummary, from_millis};

const SUMMARY_COLUMNS: &str = "id, name, active, version_id, updated_at, synced_at,
    node_count, connection_count, trigger_count, ai_node_count, database_node_count,
    http_node_count, webhook_node_count, unique_node_types, has_manual_trigger,
    has_wait_node, has_error_handler, complexity_score, complexity_level,
    execution_count, success_count, failure_count, success_rate, avg_duration_ms,
    min_duration_ms, max_duration_ms, last_execution_at, last_success_at, last_failure_at,
    timezone, error_workflow, tag_names";

impl MirrorStore {
    /// Change fingerprint of a stored workflow, if present.
    pub fn workflow_fingerprint(&self, id: &str) -> Result<Option<WorkflowFingerprint>> {
        let fingerprint = self
            .conn()
            .query_row(
                "SELECT updated_at, raw_data FROM workflows WHERE id = ?1",
                params![id],
                |row| {
                    Ok(WorkflowFingerprint {
                        updated_at: row.get(0)?,
                        raw_data: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(fingerprint)
    }

    /// Insert or replace the upstream-owned columns of a workflow.
    ///
    /// Derived columns are left alone. Returns `true` when a row with the
    /// same id already existed.
    pub fn upsert_workflow(&self, record: &WorkflowRecord) -> Result<bool> {
        let conn = self.conn();
        let existed = conn
            .query_row(
                "SELECT 1 FROM workflows WHERE id = ?1",
                params![record.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        conn.execute(
            r#"
            INSERT INTO workflows (id, name, active, nodes, connections, settings, tags,
                                   version_id, created_at, updated_at, raw_data, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                nodes = excluded.nodes,
                connections = excluded.connections,
                settings = excluded.settings,
                tags = excluded.tags,
                version_id = excluded.version_id,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                raw_data = excluded.raw_data,
                synced_at = excluded.synced_at
            "#,
            params![
                record.id,
                record.name,
                record.active,
                record.nodes,
                record.connections,
                record.settings,
                record.tags,
                record.version_id,
                record.created_at,
                record.updated_at,
                record.raw_data,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;

        debug!(workflow_id = %record.id, existed, "Upserted workflow");
        Ok(existed)
    }

    /// Get a workflow with its derived statistics.
    pub fn get_workflow(&self, id: &str) -> Result<Option<WorkflowSummary>> {
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM workflows WHERE id = ?1");
        let summary = self
            .conn()
            .query_row(&sql, params![id], row_to_summary)
            .optional()?;
        Ok(summary)
    }

    /// List all workflows, most recently executed first.
    pub fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM workflows
             ORDER BY last_execution_at IS NULL, last_execution_at DESC, name"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_summary)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Stored raw workflow payloads, optionally limited to one workflow.
    pub fn workflow_payloads(&self, scope: Option<&str>) -> Result<Vec<StoredPayload>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, raw_data FROM workflows WHERE ?1 IS NULL OR id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            Ok(StoredPayload {
                id: row.get(0)?,
                raw_data: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Number of mirrored workflows.
    pub fn workflow_count(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM workflows", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<WorkflowSummary> {
    Ok(WorkflowSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get(2)?,
        version_id: row.get(3)?,
        updated_at: from_millis(row.get(4)?),
        synced_at: from_millis(row.get(5)?),
        node_count: row.get(6)?,
        connection_count: row.get(7)?,
        trigger_count: row.get(8)?,
        ai_node_count: row.get(9)?,
        database_node_count: row.get(10)?,
        http_node_count: row.get(11)?,
        webhook_node_count: row.get(12)?,
        unique_node_types: row.get(13)?,
        has_manual_trigger: row.get(14)?,
        has_wait_node: row.get(15)?,
        has_error_handler: row.get(16)?,
        complexity_score: row.get(17)?,
        complexity_level: row.get(18)?,
        execution_count: row.get(19)?,
        success_count: row.get(20)?,
        failure_count: row.get(21)?,
        success_rate: row.get(22)?,
        avg_duration_ms: row.get(23)?,
        min_duration_ms: row.get(24)?,
        max_duration_ms: row.get(25)?,
        last_execution_at: from_millis(row.get(26)?),
        last_success_at: from_millis(row.get(27)?),
        last_failure_at: from_millis(row.get(28)?),
        timezone: row.get(29)?,
        error_workflow: row.get(30)?,
        tag_names: row.get(31)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::workflow;
    use serde_json::json;

    #[test]
    fn test_upsert_reports_existing_row() {
        let store = MirrorStore::open_in_memory().unwrap();
        let record = workflow(json!({"id": "wf-1", "name": "First"}));

        assert!(!store.upsert_workflow(&record).unwrap());
        assert!(store.upsert_workflow(&record).unwrap());
        assert_eq!(store.workflow_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_upstream_columns_only() {
        let store = MirrorStore::open_in_memory().unwrap();
        store
            .upsert_workflow(&workflow(json!({"id": "wf-1", "name": "Old"})))
            .unwrap();
        store
            .conn()
            .execute("UPDATE workflows SET execution_count = 7 WHERE id = 'wf-1'", [])
            .unwrap();

        store
            .upsert_workflow(&workflow(json!({"id": "wf-1", "name": "New"})))
            .unwrap();

        let summary = store.get_workflow("wf-1").unwrap().unwrap();
        assert_eq!(summary.name, "New");
        assert_eq!(summary.execution_count, 7);
    }

    #[test]
    fn test_empty_id_rejected() {
        let store = MirrorStore::open_in_memory().unwrap();
        let result = store.upsert_workflow(&workflow(json!({"name": "No id"})));
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_and_scoped_payloads() {
        let store = MirrorStore::open_in_memory().unwrap();
        assert!(store.workflow_fingerprint("wf-1").unwrap().is_none());

        store
            .upsert_workflow(&workflow(json!({"id": "wf-1", "updatedAt": 1000})))
            .unwrap();
        store.upsert_workflow(&workflow(json!({"id": "wf-2"}))).unwrap();

        let fp = store.workflow_fingerprint("wf-1").unwrap().unwrap();
        assert_eq!(fp.updated_at, Some(1000));
        assert!(fp.raw_data.contains("wf-1"));

        assert_eq!(store.workflow_payloads(None).unwrap().len(), 2);
        let scoped = store.workflow_payloads(Some("wf-2")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "wf-2");
    }
}
