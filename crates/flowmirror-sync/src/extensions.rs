//! Optional deepening passes over stored workflow payloads.
//!
//! Enhanced mode covers tags, settings and complexity; ultra mode adds
//! version history, the edge table, trigger details, development artefacts
//! and graph analysis. No pass calls upstream.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use flowmirror_store::{
    AnalysisRow, DevelopmentRow, EdgeRow, MirrorStore, SettingsRow, TagRow, TriggerRow, to_millis,
};
use flowmirror_types::{ExtensionCounts, RawNode, RawWorkflowPayload, SyncMode, UltraCounts};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classify::{NodeCategory, NodeClassifier};
use crate::error::{Result, SyncError};
use crate::structure;

/// Counters plus per-workflow problems from one extension run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionReport {
    pub counts: ExtensionCounts,
    pub warnings: Vec<String>,
}

/// Runs the extension passes selected by a [`SyncMode`].
#[derive(Debug, Clone)]
pub struct ExtensionRunner {
    store: Arc<MirrorStore>,
    classifier: NodeClassifier,
}

impl ExtensionRunner {
    pub fn new(store: Arc<MirrorStore>, classifier: NodeClassifier) -> Self {
        Self { store, classifier }
    }

    /// Run every pass `mode` includes. Basic mode yields `None`.
    pub fn run(&self, mode: SyncMode, scope: Option<&str>) -> Result<Option<ExtensionReport>> {
        if !mode.includes_enhanced() {
            return Ok(None);
        }

        let mut report = ExtensionReport::default();
        let payloads = self.store.workflow_payloads(scope)?;
        let mut ultra = mode.includes_ultra().then(UltraCounts::default);

        for stored in payloads {
            let decoded = serde_json::from_str(&stored.raw_data)
                .and_then(RawWorkflowPayload::from_value);
            let payload = match decoded {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(workflow_id = %stored.id, error = %e, "Skipping undecodable workflow payload");
                    report
                        .warnings
                        .push(format!("workflow {}: stored payload unreadable: {e}", stored.id));
                    continue;
                }
            };

            if let Err(e) = self.enhanced(&payload, &mut report.counts) {
                warn!(workflow_id = %payload.id, error = %e, "Enhanced pass failed");
                report.warnings.push(e.to_string());
            }
            if let Some(counts) = ultra.as_mut()
                && let Err(e) = self.ultra(&payload, counts)
            {
                warn!(workflow_id = %payload.id, error = %e, "Ultra pass failed");
                report.warnings.push(e.to_string());
            }
        }

        report.counts.ultra = ultra;
        info!(mode = %mode, counts = ?report.counts, "Extension passes complete");
        Ok(Some(report))
    }

    fn enhanced(&self, payload: &RawWorkflowPayload, counts: &mut ExtensionCounts) -> Result<()> {
        let id = payload.id.as_str();
        let fail = |e| SyncError::persistence(format!("workflow {id} extensions"), e);

        self.store.replace_tags(id, &tag_rows(payload)).map_err(fail)?;
        counts.tags_processed += 1;

        self.store
            .write_settings(id, &settings_row(payload))
            .map_err(fail)?;
        counts.settings_processed += 1;

        let score = structure::analyze(payload, &self.classifier).complexity_score;
        self.store
            .write_complexity(id, score, structure::complexity_level(score))
            .map_err(fail)?;
        counts.complexity_processed += 1;

        Ok(())
    }

    fn ultra(&self, payload: &RawWorkflowPayload, counts: &mut UltraCounts) -> Result<()> {
        let id = payload.id.as_str();
        let fail = |e| SyncError::persistence(format!("workflow {id} extensions"), e);

        if let Some(version) = payload.version_id.as_deref().filter(|v| !v.is_empty()) {
            let recorded = self
                .store
                .record_version(id, version, to_millis(payload.updated_at), payload.nodes.len() as i64)
                .map_err(fail)?;
            if recorded {
                counts.versions_processed += 1;
            }
        }

        self.store
            .replace_connections(id, &edge_rows(payload))
            .map_err(fail)?;
        counts.connections_processed += 1;

        self.store
            .replace_triggers(id, &trigger_rows(payload, &self.classifier))
            .map_err(fail)?;
        counts.triggers_processed += 1;

        self.store
            .write_development(id, &development_row(payload))
            .map_err(fail)?;
        counts.development_processed += 1;

        self.store
            .write_analysis(id, &analyze_graph(payload, &self.classifier))
            .map_err(fail)?;
        counts.analysis_processed += 1;

        debug!(workflow_id = id, "Ultra passes written");
        Ok(())
    }
}

fn tag_rows(payload: &RawWorkflowPayload) -> Vec<TagRow> {
    payload
        .tags
        .iter()
        .filter(|t| !t.name.is_empty())
        .map(|t| TagRow {
            tag_id: if t.id.is_empty() { t.name.clone() } else { t.id.clone() },
            tag_name: t.name.clone(),
        })
        .collect()
}

fn settings_row(payload: &RawWorkflowPayload) -> SettingsRow {
    let Some(settings) = &payload.settings else {
        return SettingsRow::default();
    };
    SettingsRow {
        timezone: settings.timezone.clone(),
        error_workflow: settings.error_workflow.clone().filter(|s| !s.is_empty()),
        save_data_on_error: settings.save_data_error_execution.clone(),
        save_data_on_success: settings.save_data_success_execution.clone(),
        execution_timeout: settings.execution_timeout,
    }
}

fn edge_rows(payload: &RawWorkflowPayload) -> Vec<EdgeRow> {
    payload
        .edges()
        .map(|e| EdgeRow {
            source_node: e.source.to_string(),
            target_node: e.target.to_string(),
            connection_type: e.kind.to_string(),
            output_index: e.output_index as i64,
            input_index: e.input_index,
        })
        .collect()
}

fn trigger_rows(payload: &RawWorkflowPayload, classifier: &NodeClassifier) -> Vec<TriggerRow> {
    payload
        .nodes
        .iter()
        .filter(|n| classifier.categories(&n.node_type).contains(&NodeCategory::Trigger))
        .map(|n| TriggerRow {
            node_id: n.key().to_string(),
            trigger_type: n.node_type.clone(),
            webhook_path: n.parameter_str("path").map(String::from),
            http_method: n.parameter_str("httpMethod").map(String::from),
            schedule: schedule_rule(n),
        })
        .collect()
}

/// Schedule definition of a schedule or cron trigger, as JSON text.
fn schedule_rule(node: &RawNode) -> Option<String> {
    ["rule", "cronExpression", "triggerTimes"]
        .iter()
        .find_map(|key| match node.parameters.get(*key) {
            Some(Value::Null) | None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
}

fn development_row(payload: &RawWorkflowPayload) -> DevelopmentRow {
    DevelopmentRow {
        has_pinned_data: payload.has_pinned_data(),
        has_static_data: payload.has_static_data(),
        disabled_nodes: payload.nodes.iter().filter(|n| n.disabled).count() as i64,
    }
}

/// Entry, terminal and orphan nodes plus the longest shortest-path depth.
///
/// Connections are keyed by node name. Entry nodes have no incoming edges
/// and either feed something or are triggers; terminal nodes are fed but
/// feed nothing; orphans are non-trigger nodes with no edges at all. Depth
/// counts nodes along the path, so a lone entry node has depth 1.
pub fn analyze_graph(payload: &RawWorkflowPayload, classifier: &NodeClassifier) -> AnalysisRow {
    let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut incoming: BTreeSet<&str> = BTreeSet::new();
    for edge in payload.edges() {
        outgoing.entry(edge.source).or_default().insert(edge.target);
        incoming.insert(edge.target);
    }

    let mut analysis = AnalysisRow::default();
    for node in &payload.nodes {
        let name = node.name.as_str();
        let feeds = outgoing.get(name).is_some_and(|t| !t.is_empty());
        let fed = incoming.contains(name);
        let trigger = classifier
            .categories(&node.node_type)
            .contains(&NodeCategory::Trigger);

        match (fed, feeds) {
            (false, true) => analysis.entry_nodes.push(name.to_string()),
            (false, false) if trigger => analysis.entry_nodes.push(name.to_string()),
            (false, false) => analysis.orphan_nodes.push(name.to_string()),
            (true, false) => analysis.terminal_nodes.push(name.to_string()),
            (true, true) => {}
        }
    }

    let mut depth: BTreeMap<&str, i64> = BTreeMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for entry in &analysis.entry_nodes {
        depth.insert(entry.as_str(), 1);
        queue.push_back(entry.as_str());
    }
    while let Some(current) = queue.pop_front() {
        let next_depth = depth.get(current).copied().unwrap_or(1) + 1;
        for target in outgoing.get(current).into_iter().flatten() {
            if !depth.contains_key(target) {
                depth.insert(target, next_depth);
                queue.push_back(target);
            }
        }
    }
    analysis.max_depth = depth.values().copied().max().unwrap_or(0);
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmirror_store::WorkflowRecord;
    use serde_json::json;

    fn sample() -> RawWorkflowPayload {
        RawWorkflowPayload::from_value(json!({
            "id": "wf-1",
            "versionId": "v1",
            "tags": [{"id": "t1", "name": "crm"}, {"id": "t2", "name": "sales"}],
            "settings": {"timezone": "Europe/Berlin", "errorWorkflow": "wf-err", "executionTimeout": 300},
            "pinData": {"Hook": [{"json": {"a": 1}}]},
            "nodes": [
                {"id": "1", "name": "Hook", "type": "n8n-nodes-base.webhook",
                 "parameters": {"path": "intake", "httpMethod": "POST"}},
                {"id": "2", "name": "Every Hour", "type": "n8n-nodes-base.scheduleTrigger",
                 "parameters": {"rule": {"interval": [{"field": "hours"}]}}},
                {"id": "3", "name": "Fetch", "type": "n8n-nodes-base.httpRequest"},
                {"id": "4", "name": "Save", "type": "n8n-nodes-base.postgres"},
                {"id": "5", "name": "Scratch", "type": "n8n-nodes-base.set", "disabled": true}
            ],
            "connections": {
                "Hook": {"main": [[{"node": "Fetch", "type": "main", "index": 0}]]},
                "Every Hour": {"main": [[{"node": "Fetch", "type": "main", "index": 0}]]},
                "Fetch": {"main": [[{"node": "Save", "type": "main", "index": 0}]]}
            }
        }))
        .unwrap()
    }

    fn runner_with(payload: &RawWorkflowPayload) -> (ExtensionRunner, Arc<MirrorStore>) {
        let store = Arc::new(MirrorStore::open_in_memory().unwrap());
        store.upsert_workflow(&WorkflowRecord::from_payload(payload)).unwrap();
        (ExtensionRunner::new(store.clone(), NodeClassifier::default()), store)
    }

    #[test]
    fn test_basic_mode_runs_nothing() {
        let (runner, _) = runner_with(&sample());
        assert!(runner.run(SyncMode::Basic, None).unwrap().is_none());
    }

    #[test]
    fn test_enhanced_mode_counts() {
        let (runner, store) = runner_with(&sample());
        let report = runner.run(SyncMode::Enhanced, None).unwrap().unwrap();
        assert_eq!(report.counts.tags_processed, 1);
        assert_eq!(report.counts.settings_processed, 1);
        assert_eq!(report.counts.complexity_processed, 1);
        assert!(report.counts.ultra.is_none());

        let wf = store.get_workflow("wf-1").unwrap().unwrap();
        assert_eq!(wf.tag_names.as_deref(), Some("crm, sales"));
        assert_eq!(wf.timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(wf.error_workflow.as_deref(), Some("wf-err"));
        assert!(wf.complexity_level.is_some());
    }

    #[test]
    fn test_ultra_mode_writes_graph_details() {
        let (runner, store) = runner_with(&sample());
        let report = runner.run(SyncMode::Ultra, None).unwrap().unwrap();
        let ultra = report.counts.ultra.unwrap();
        assert_eq!(ultra.versions_processed, 1);
        assert_eq!(ultra.analysis_processed, 1);

        assert_eq!(store.workflow_connections("wf-1").unwrap().len(), 3);
        let triggers = store.workflow_triggers("wf-1").unwrap();
        assert_eq!(triggers.len(), 2);
        let hook = triggers.iter().find(|t| t.node_id == "1").unwrap();
        assert_eq!(hook.webhook_path.as_deref(), Some("intake"));
        assert_eq!(hook.http_method.as_deref(), Some("POST"));
        let schedule = triggers.iter().find(|t| t.node_id == "2").unwrap();
        assert!(schedule.schedule.as_deref().unwrap().contains("hours"));

        let (analysis, dev) = store.workflow_analysis("wf-1").unwrap().unwrap();
        assert_eq!(analysis.max_depth, 3);
        assert_eq!(analysis.orphan_nodes, vec!["Scratch".to_string()]);
        assert!(dev.has_pinned_data);
        assert_eq!(dev.disabled_nodes, 1);
    }

    #[test]
    fn test_version_recorded_once() {
        let (runner, store) = runner_with(&sample());
        runner.run(SyncMode::Ultra, None).unwrap();
        let second = runner.run(SyncMode::Ultra, None).unwrap().unwrap();
        assert_eq!(second.counts.ultra.unwrap().versions_processed, 0);
        assert_eq!(store.version_count("wf-1").unwrap(), 1);
    }

    #[test]
    fn test_graph_analysis() {
        let analysis = analyze_graph(&sample(), &NodeClassifier::default());
        assert_eq!(analysis.entry_nodes, vec!["Hook".to_string(), "Every Hour".to_string()]);
        assert_eq!(analysis.terminal_nodes, vec!["Save".to_string()]);
        assert_eq!(analysis.orphan_nodes, vec!["Scratch".to_string()]);
        assert_eq!(analysis.max_depth, 3);
    }

    #[test]
    fn test_graph_analysis_tolerates_cycles() {
        let payload = RawWorkflowPayload::from_value(json!({
            "id": "wf-loop",
            "nodes": [
                {"name": "Start", "type": "n8n-nodes-base.manualTrigger"},
                {"name": "A", "type": "n8n-nodes-base.set"},
                {"name": "B", "type": "n8n-nodes-base.if"}
            ],
            "connections": {
                "Start": {"main": [[{"node": "A", "index": 0}]]},
                "A": {"main": [[{"node": "B", "index": 0}]]},
                "B": {"main": [[{"node": "A", "index": 0}]]}
            }
        }))
        .unwrap();
        let analysis = analyze_graph(&payload, &NodeClassifier::default());
        assert_eq!(analysis.max_depth, 3);
        assert!(analysis.terminal_nodes.is_empty());
    }
}
