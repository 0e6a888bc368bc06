//! Sync-run audit log.

use flowmirror_types::{ExtensionCounts, SyncMode, SyncResult};
use rusqlite::params;
use tracing::debug;

use super::MirrorStore;
use crate::error::{Result, StoreError};
use crate::rows::{from_millis, to_millis};

impl MirrorStore {
    /// Persist a finished run. Each run is written once and never updated.
    pub fn record_sync_run(&self, result: &SyncResult) -> Result<()> {
        let extensions = result
            .extensions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn().execute(
            r#"
            INSERT INTO sync_runs (id, mode, started_at, duration_ms, workflows_synced,
                                   workflows_updated, executions_synced, executions_updated,
                                   warnings, errors, extensions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                result.id,
                result.mode.as_str(),
                to_millis(Some(result.started_at)),
                i64::try_from(result.duration_ms).unwrap_or(i64::MAX),
                result.workflows_synced,
                result.workflows_updated,
                result.executions_synced,
                result.executions_updated,
                serde_json::to_string(&result.warnings)?,
                serde_json::to_string(&result.errors)?,
                extensions,
            ],
        )?;

        debug!(run_id = %result.id, "Recorded sync run");
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_sync_runs(&self, limit: u32) -> Result<Vec<SyncResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, mode, started_at, duration_ms, workflows_synced, workflows_updated,
                    executions_synced, executions_updated, warnings, errors, extensions
             FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
        )?;

        let raw_rows = stmt
            .query_map(params![limit], |row| {
                Ok(RawRun {
                    id: row.get(0)?,
                    mode: row.get(1)?,
                    started_at: row.get(2)?,
                    duration_ms: row.get(3)?,
                    workflows_synced: row.get(4)?,
                    workflows_updated: row.get(5)?,
                    executions_synced: row.get(6)?,
                    executions_updated: row.get(7)?,
                    warnings: row.get(8)?,
                    errors: row.get(9)?,
                    extensions: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw_rows.into_iter().map(RawRun::into_result).collect()
    }
}

struct RawRun {
    id: String,
    mode: String,
    started_at: i64,
    duration_ms: i64,
    workflows_synced: u32,
    workflows_updated: u32,
    executions_synced: u32,
    executions_updated: u32,
    warnings: String,
    errors: String,
    extensions: Option<String>,
}

impl RawRun {
    fn into_result(self) -> Result<SyncResult> {
        let mode: SyncMode = self.mode.parse().map_err(StoreError::InvalidData)?;
        let started_at = from_millis(Some(self.started_at))
            .ok_or_else(|| StoreError::InvalidData(format!("start time of run {}", self.id)))?;
        let extensions: Option<ExtensionCounts> = self
            .extensions
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(SyncResult {
            id: self.id,
            mode,
            started_at,
            duration_ms: u64::try_from(self.duration_ms).unwrap_or(0),
            workflows_synced: self.workflows_synced,
            workflows_updated: self.workflows_updated,
            executions_synced: self.executions_synced,
            executions_updated: self.executions_updated,
            warnings: serde_json::from_str(&self.warnings)?,
            errors: serde_json::from_str(&self.errors)?,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list_runs() {
        let store = MirrorStore::open_in_memory().unwrap();

        let mut first = SyncResult::new(SyncMode::Basic);
        first.workflows_synced = 3;
        first.warn("execution 7: constraint failed");
        first.finish();
        store.record_sync_run(&first).unwrap();

        let mut second = SyncResult::new(SyncMode::Ultra);
        second.error("workflow list: HTTP 500");
        second.extensions = Some(ExtensionCounts {
            tags_processed: 2,
            ..Default::default()
        });
        second.finish();
        store.record_sync_run(&second).unwrap();

        let runs = store.list_sync_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        let ultra = runs.iter().find(|r| r.mode == SyncMode::Ultra).unwrap();
        assert_eq!(ultra.errors, vec!["workflow list: HTTP 500"]);
        assert_eq!(ultra.extensions.as_ref().unwrap().tags_processed, 2);

        let basic = runs.iter().find(|r| r.id == first.id).unwrap();
        assert_eq!(basic.workflows_synced, 3);
        assert_eq!(basic.warnings.len(), 1);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let store = MirrorStore::open_in_memory().unwrap();
        let run = SyncResult::new(SyncMode::Basic);
        store.record_sync_run(&run).unwrap();
        assert!(store.record_sync_run(&run).is_err());
    }
}
