//! Set-based derivation statements.
//!
//! Every statement takes an optional workflow scope (`?1`); `NULL` means all
//! rows. Values are always overwritten, never incremented.

use rusqlite::params;
use tracing::debug;

use super::MirrorStore;
use crate::error::Result;
use crate::rows::WorkflowStructure;

impl MirrorStore {
    /// Fill `status` where the upstream did not give a usable one.
    pub fn derive_execution_status(&self, scope: Option<&str>) -> Result<usize> {
        let changed = self.conn().execute(
            r#"
            UPDATE executions SET status = CASE
                WHEN raw_error IS NOT NULL THEN 'error'
                WHEN finished = 1 THEN 'success'
                WHEN stopped_at IS NULL THEN 'running'
                ELSE 'error'
            END
            WHERE (status IS NULL OR status = 'unknown')
              AND (?1 IS NULL OR workflow_id = ?1)
            "#,
            params![scope],
        )?;
        debug!(changed, "Derived execution status");
        Ok(changed)
    }

    /// `duration_ms = stopped_at - started_at` where both timestamps exist.
    pub fn derive_durations(&self, scope: Option<&str>) -> Result<usize> {
        let changed = self.conn().execute(
            r#"
            UPDATE executions SET duration_ms = stopped_at - started_at
            WHERE duration_ms IS NULL
              AND started_at IS NOT NULL
              AND stopped_at IS NOT NULL
              AND (?1 IS NULL OR workflow_id = ?1)
            "#,
            params![scope],
        )?;
        debug!(changed, "Derived execution durations");
        Ok(changed)
    }

    /// Copy the ingested error message into the reader-facing column.
    pub fn derive_error_messages(&self, scope: Option<&str>) -> Result<usize> {
        let changed = self.conn().execute(
            r#"
            UPDATE executions SET error_message = raw_error
            WHERE error_message IS NULL
              AND raw_error IS NOT NULL
              AND (?1 IS NULL OR workflow_id = ?1)
            "#,
            params![scope],
        )?;
        debug!(changed, "Derived execution error messages");
        Ok(changed)
    }

    /// Recompute per-workflow execution statistics.
    ///
    /// Workflows without executions get zero counts and `NULL` rates.
    pub fn derive_workflow_aggregates(&self, scope: Option<&str>) -> Result<usize> {
        let changed = self.conn().execute(
            r#"
            UPDATE workflows SET
                execution_count = agg.total,
                success_count = agg.successes,
                failure_count = agg.failures,
                success_rate = CASE WHEN agg.total > 0
                    THEN ROUND(agg.successes * 100.0 / agg.total, 2)
                    ELSE NULL END,
                avg_duration_ms = agg.avg_duration,
                min_duration_ms = agg.min_duration,
                max_duration_ms = agg.max_duration,
                last_execution_at = agg.last_execution,
                last_success_at = agg.last_success,
                last_failure_at = agg.last_failure
            FROM (
                SELECT
                    w.id AS workflow_id,
                    COUNT(e.id) AS total,
                    COALESCE(SUM(CASE WHEN e.status = 'success' THEN 1 ELSE 0 END), 0) AS successes,
                    COALESCE(SUM(CASE WHEN e.status = 'error' THEN 1 ELSE 0 END), 0) AS failures,
                    ROUND(AVG(e.duration_ms), 2) AS avg_duration,
                    MIN(e.duration_ms) AS min_duration,
                    MAX(e.duration_ms) AS max_duration,
                    MAX(e.started_at) AS last_execution,
                    MAX(CASE WHEN e.status = 'success' THEN COALESCE(e.stopped_at, e.started_at) END) AS last_success,
                    MAX(CASE WHEN e.status = 'error' THEN COALESCE(e.stopped_at, e.started_at) END) AS last_failure
                FROM workflows w
                LEFT JOIN executions e ON e.workflow_id = w.id
                WHERE ?1 IS NULL OR w.id = ?1
                GROUP BY w.id
            ) AS agg
            WHERE workflows.id = agg.workflow_id
            "#,
            params![scope],
        )?;
        debug!(changed, "Derived workflow aggregates");
        Ok(changed)
    }

    /// Write structural metrics and node rows in one transaction.
    ///
    /// Node rows are upserted by `(workflow_id, node_id)` and rows for nodes
    /// no longer in the workflow are removed.
    pub fn write_structures(&self, structures: &[WorkflowStructure]) -> Result<usize> {
        self.with_transaction(|tx| {
            let mut update = tx.prepare(
                r#"
                UPDATE workflows SET
                    node_count = ?2,
                    connection_count = ?3,
                    trigger_count = ?4,
                    ai_node_count = ?5,
                    database_node_count = ?6,
                    http_node_count = ?7,
                    webhook_node_count = ?8,
                    unique_node_types = ?9,
                    has_manual_trigger = ?10,
                    has_wait_node = ?11,
                    has_error_handler = ?12,
                    complexity_score = ?13
                WHERE id = ?1
                "#,
            )?;
            let mut upsert_node = tx.prepare(
                r#"
                INSERT INTO workflow_nodes (workflow_id, node_id, name, node_type, category,
                                            show_order, notes, disabled)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(workflow_id, node_id) DO UPDATE SET
                    name = excluded.name,
                    node_type = excluded.node_type,
                    category = excluded.category,
                    show_order = excluded.show_order,
                    notes = excluded.notes,
                    disabled = excluded.disabled
                "#,
            )?;
            let mut existing_nodes =
                tx.prepare("SELECT node_id FROM workflow_nodes WHERE workflow_id = ?1")?;
            let mut delete_node =
                tx.prepare("DELETE FROM workflow_nodes WHERE workflow_id = ?1 AND node_id = ?2")?;

            let mut written = 0;
            for s in structures {
                written += update.execute(params![
                    s.workflow_id,
                    s.node_count,
                    s.connection_count,
                    s.trigger_count,
                    s.ai_node_count,
                    s.database_node_count,
                    s.http_node_count,
                    s.webhook_node_count,
                    s.unique_node_types,
                    s.has_manual_trigger,
                    s.has_wait_node,
                    s.has_error_handler,
                    s.complexity_score,
                ])?;

                for node in &s.nodes {
                    upsert_node.execute(params![
                        s.workflow_id,
                        node.node_id,
                        node.name,
                        node.node_type,
                        node.category,
                        node.show_order,
                        node.notes,
                        node.disabled,
                    ])?;
                }

                let stored: Vec<String> = existing_nodes
                    .query_map(params![s.workflow_id], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?;
                for node_id in stored {
                    if !s.nodes.iter().any(|n| n.node_id == node_id) {
                        delete_node.execute(params![s.workflow_id, node_id])?;
                    }
                }
            }

            debug!(written, "Wrote workflow structures");
            Ok(written)
        })
    }

    /// Node metadata rows of one workflow, in display order.
    pub fn workflow_nodes(&self, workflow_id: &str) -> Result<Vec<crate::rows::NodeRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT node_id, name, node_type, category, show_order, notes, disabled
             FROM workflow_nodes WHERE workflow_id = ?1
             ORDER BY show_order IS NULL, show_order, name",
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok(crate::rows::NodeRow {
                node_id: row.get(0)?,
                name: row.get(1)?,
                node_type: row.get(2)?,
                category: row.get(3)?,
                show_order: row.get(4)?,
                notes: row.get(5)?,
                disabled: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::NodeRow;
    use crate::store::test_support::{execution, workflow};
    use serde_json::json;

    fn seeded() -> MirrorStore {
        let store = MirrorStore::open_in_memory().unwrap();
        store.upsert_workflow(&workflow(json!({"id": "wf-1"}))).unwrap();
        store.upsert_workflow(&workflow(json!({"id": "wf-idle"}))).unwrap();
        for (id, status, start, stop) in [
            ("1", "success", 1_000, 1_100),
            ("2", "success", 2_000, 2_120),
            ("3", "error", 3_000, 3_130),
        ] {
            store
                .upsert_execution(&execution(json!({
                    "id": id, "workflowId": "wf-1", "status": status,
                    "finished": status == "success", "startedAt": start, "stoppedAt": stop
                })))
                .unwrap();
        }
        store
    }

    fn derive_executions(store: &MirrorStore, scope: Option<&str>) {
        store.derive_execution_status(scope).unwrap();
        store.derive_durations(scope).unwrap();
        store.derive_error_messages(scope).unwrap();
        store.derive_workflow_aggregates(scope).unwrap();
    }

    #[test]
    fn test_status_derivation_rules() {
        let store = MirrorStore::open_in_memory().unwrap();
        let cases = [
            ("err", json!({"finished": true, "data": {"resultData": {"error": {"message": "boom"}}}})),
            ("done", json!({"finished": true, "stoppedAt": 10})),
            ("live", json!({"finished": false})),
            ("dead", json!({"finished": false, "stoppedAt": 10})),
        ];
        for (id, mut body) in cases {
            body["id"] = json!(id);
            body["workflowId"] = json!("wf");
            store.upsert_execution(&execution(body)).unwrap();
        }

        assert_eq!(store.derive_execution_status(None).unwrap(), 4);
        let status = |id: &str| store.get_execution(id).unwrap().unwrap().status.unwrap();
        assert_eq!(status("err"), "error");
        assert_eq!(status("done"), "success");
        assert_eq!(status("live"), "running");
        assert_eq!(status("dead"), "error");

        // Second pass has nothing left to fill.
        assert_eq!(store.derive_execution_status(None).unwrap(), 0);
    }

    #[test]
    fn test_duration_and_error_message() {
        let store = MirrorStore::open_in_memory().unwrap();
        store
            .upsert_execution(&execution(json!({
                "id": "1", "workflowId": "wf", "startedAt": 1_000, "stoppedAt": 1_250,
                "data": {"resultData": {"error": {"message": "timeout"}}}
            })))
            .unwrap();
        store
            .upsert_execution(&execution(json!({"id": "2", "workflowId": "wf", "startedAt": 1_000})))
            .unwrap();

        derive_executions(&store, None);
        let first = store.get_execution("1").unwrap().unwrap();
        assert_eq!(first.duration_ms, Some(250));
        assert_eq!(first.error_message.as_deref(), Some("timeout"));
        assert_eq!(store.get_execution("2").unwrap().unwrap().duration_ms, None);
    }

    #[test]
    fn test_aggregates_round_average() {
        let store = seeded();
        derive_executions(&store, None);

        let wf = store.get_workflow("wf-1").unwrap().unwrap();
        assert_eq!(wf.execution_count, 3);
        assert_eq!(wf.success_count, 2);
        assert_eq!(wf.failure_count, 1);
        assert_eq!(wf.avg_duration_ms, Some(116.67));
        assert_eq!(wf.min_duration_ms, Some(100));
        assert_eq!(wf.max_duration_ms, Some(130));
        assert_eq!(wf.success_rate, Some(66.67));
        assert_eq!(wf.last_execution_at.map(|t| t.timestamp_millis()), Some(3_000));
        assert_eq!(wf.last_failure_at.map(|t| t.timestamp_millis()), Some(3_130));

        let idle = store.get_workflow("wf-idle").unwrap().unwrap();
        assert_eq!(idle.execution_count, 0);
        assert_eq!(idle.success_rate, None);
        assert_eq!(idle.avg_duration_ms, None);
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let store = seeded();
        derive_executions(&store, None);
        let first = store.list_workflows().unwrap();
        derive_executions(&store, None);
        assert_eq!(store.list_workflows().unwrap(), first);
    }

    #[test]
    fn test_scope_limits_aggregates() {
        let store = seeded();
        derive_executions(&store, Some("wf-idle"));
        let wf = store.get_workflow("wf-1").unwrap().unwrap();
        assert_eq!(wf.execution_count, 0);
        assert_eq!(store.get_execution("1").unwrap().unwrap().duration_ms, None);
    }

    #[test]
    fn test_write_structures_prunes_removed_nodes() {
        let store = seeded();
        let node = |id: &str, order| NodeRow {
            node_id: id.into(),
            name: id.into(),
            node_type: "n8n-nodes-base.set".into(),
            category: None,
            show_order: order,
            notes: None,
            disabled: false,
        };

        let mut structure = WorkflowStructure {
            workflow_id: "wf-1".into(),
            node_count: 2,
            complexity_score: 3.0,
            nodes: vec![node("a", Some(2)), node("b", Some(1))],
            ..Default::default()
        };
        assert_eq!(store.write_structures(&[structure.clone()]).unwrap(), 1);
        let names: Vec<_> = store
            .workflow_nodes("wf-1")
            .unwrap()
            .into_iter()
            .map(|n| n.node_id)
            .collect();
        assert_eq!(names, vec!["b", "a"]);

        structure.nodes = vec![node("a", None)];
        structure.node_count = 1;
        store.write_structures(&[structure]).unwrap();
        let nodes = store.workflow_nodes("wf-1").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].show_order, None);
        assert_eq!(store.get_workflow("wf-1").unwrap().unwrap().node_count, 1);
    }
}
