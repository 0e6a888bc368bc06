//! Tables filled by the enhanced and ultra extension passes.

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use super::MirrorStore;
use crate::error::Result;
use crate::rows::{AnalysisRow, DevelopmentRow, EdgeRow, SettingsRow, TagRow, TriggerRow};

impl MirrorStore {
    // ── Enhanced ────────────────────────────────────────────────────

    /// Replace a workflow's tags and its denormalized `tag_names` column.
    pub fn replace_tags(&self, workflow_id: &str, tags: &[TagRow]) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "DELETE FROM workflow_tags WHERE workflow_id = ?1",
                params![workflow_id],
            )?;
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO workflow_tags (workflow_id, tag_id, tag_name)
                 VALUES (?1, ?2, ?3)",
            )?;
            for tag in tags {
                insert.execute(params![workflow_id, tag.tag_id, tag.tag_name])?;
            }

            let names: Vec<&str> = tags.iter().map(|t| t.tag_name.as_str()).collect();
            let tag_names = (!names.is_empty()).then(|| names.join(", "));
            tx.execute(
                "UPDATE workflows SET tag_names = ?2 WHERE id = ?1",
                params![workflow_id, tag_names],
            )?;
            Ok(())
        })
    }

    /// Tags of one workflow.
    pub fn workflow_tags(&self, workflow_id: &str) -> Result<Vec<TagRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tag_id, tag_name FROM workflow_tags WHERE workflow_id = ?1 ORDER BY tag_name",
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok(TagRow {
                tag_id: row.get(0)?,
                tag_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn write_settings(&self, workflow_id: &str, settings: &SettingsRow) -> Result<()> {
        self.conn().execute(
            r#"
            UPDATE workflows SET
                timezone = ?2,
                error_workflow = ?3,
                save_data_on_error = ?4,
                save_data_on_success = ?5,
                execution_timeout = ?6
            WHERE id = ?1
            "#,
            params![
                workflow_id,
                settings.timezone,
                settings.error_workflow,
                settings.save_data_on_error,
                settings.save_data_on_success,
                settings.execution_timeout,
            ],
        )?;
        Ok(())
    }

    pub fn write_complexity(&self, workflow_id: &str, score: f64, level: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE workflows SET complexity_score = ?2, complexity_level = ?3 WHERE id = ?1",
            params![workflow_id, score, level],
        )?;
        Ok(())
    }

    // ── Ultra ───────────────────────────────────────────────────────

    /// Record a workflow version. Returns `true` if the version is new.
    pub fn record_version(
        &self,
        workflow_id: &str,
        version_id: &str,
        updated_at: Option<i64>,
        node_count: i64,
    ) -> Result<bool> {
        let inserted = self.conn().execute(
            r#"
            INSERT OR IGNORE INTO workflow_versions
                (workflow_id, version_id, updated_at, node_count, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                workflow_id,
                version_id,
                updated_at,
                node_count,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        if inserted > 0 {
            debug!(workflow_id, version_id, "Recorded new workflow version");
        }
        Ok(inserted > 0)
    }

    pub fn version_count(&self, workflow_id: &str) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM workflow_versions WHERE workflow_id = ?1",
            params![workflow_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Replace the edge table rows of a workflow.
    pub fn replace_connections(&self, workflow_id: &str, edges: &[EdgeRow]) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "DELETE FROM workflow_connections WHERE workflow_id = ?1",
                params![workflow_id],
            )?;
            let mut insert = tx.prepare(
                r#"
                INSERT OR IGNORE INTO workflow_connections
                    (workflow_id, source_node, target_node, connection_type, output_index, input_index)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for edge in edges {
                insert.execute(params![
                    workflow_id,
                    edge.source_node,
                    edge.target_node,
                    edge.connection_type,
                    edge.output_index,
                    edge.input_index,
                ])?;
            }
            Ok(())
        })
    }

    pub fn workflow_connections(&self, workflow_id: &str) -> Result<Vec<EdgeRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source_node, target_node, connection_type, output_index, input_index
             FROM workflow_connections WHERE workflow_id = ?1
             ORDER BY source_node, output_index, target_node",
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok(EdgeRow {
                source_node: row.get(0)?,
                target_node: row.get(1)?,
                connection_type: row.get(2)?,
                output_index: row.get(3)?,
                input_index: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Replace the trigger rows of a workflow.
    pub fn replace_triggers(&self, workflow_id: &str, triggers: &[TriggerRow]) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "DELETE FROM workflow_triggers WHERE workflow_id = ?1",
                params![workflow_id],
            )?;
            let mut insert = tx.prepare(
                r#"
                INSERT OR REPLACE INTO workflow_triggers
                    (workflow_id, node_id, trigger_type, webhook_path, http_method, schedule)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for t in triggers {
                insert.execute(params![
                    workflow_id,
                    t.node_id,
                    t.trigger_type,
                    t.webhook_path,
                    t.http_method,
                    t.schedule,
                ])?;
            }
            Ok(())
        })
    }

    pub fn workflow_triggers(&self, workflow_id: &str) -> Result<Vec<TriggerRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT node_id, trigger_type, webhook_path, http_method, schedule
             FROM workflow_triggers WHERE workflow_id = ?1 ORDER BY node_id",
        )?;
        let rows = stmt.query_map(params![workflow_id], |row| {
            Ok(TriggerRow {
                node_id: row.get(0)?,
                trigger_type: row.get(1)?,
                webhook_path: row.get(2)?,
                http_method: row.get(3)?,
                schedule: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Upsert the development columns of the analysis row.
    pub fn write_development(&self, workflow_id: &str, dev: &DevelopmentRow) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO workflow_analysis
                (workflow_id, has_pinned_data, has_static_data, disabled_nodes, analyzed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(workflow_id) DO UPDATE SET
                has_pinned_data = excluded.has_pinned_data,
                has_static_data = excluded.has_static_data,
                disabled_nodes = excluded.disabled_nodes,
                analyzed_at = excluded.analyzed_at
            "#,
            params![
                workflow_id,
                dev.has_pinned_data,
                dev.has_static_data,
                dev.disabled_nodes,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Upsert the graph-shape columns of the analysis row.
    pub fn write_analysis(&self, workflow_id: &str, analysis: &AnalysisRow) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO workflow_analysis
                (workflow_id, entry_nodes, terminal_nodes, orphan_nodes, max_depth, analyzed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(workflow_id) DO UPDATE SET
                entry_nodes = excluded.entry_nodes,
                terminal_nodes = excluded.terminal_nodes,
                orphan_nodes = excluded.orphan_nodes,
                max_depth = excluded.max_depth,
                analyzed_at = excluded.analyzed_at
            "#,
            params![
                workflow_id,
                serde_json::to_string(&analysis.entry_nodes)?,
                serde_json::to_string(&analysis.terminal_nodes)?,
                serde_json::to_string(&analysis.orphan_nodes)?,
                analysis.max_depth,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Stored analysis for a workflow, with its development flags.
    pub fn workflow_analysis(
        &self,
        workflow_id: &str,
    ) -> Result<Option<(AnalysisRow, DevelopmentRow)>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT entry_nodes, terminal_nodes, orphan_nodes, max_depth,
                        has_pinned_data, has_static_data, disabled_nodes
                 FROM workflow_analysis WHERE workflow_id = ?1",
                params![workflow_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        DevelopmentRow {
                            has_pinned_data: row.get(4)?,
                            has_static_data: row.get(5)?,
                            disabled_nodes: row.get(6)?,
                        },
                    ))
                },
            )
            .optional()?;

        let Some((entry, terminal, orphan, max_depth, dev)) = raw else {
            return Ok(None);
        };
        let analysis = AnalysisRow {
            entry_nodes: serde_json::from_str(&entry)?,
            terminal_nodes: serde_json::from_str(&terminal)?,
            orphan_nodes: serde_json::from_str(&orphan)?,
            max_depth,
        };
        Ok(Some((analysis, dev)))
    }
}
