//! Structural metrics computed from a workflow's typed payload.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use flowmirror_store::{NodeRow, WorkflowStructure};
use flowmirror_types::RawWorkflowPayload;
use regex::Regex;

use crate::classify::{NodeCategory, NodeClassifier, is_error_trigger, is_manual_trigger, is_wait_node};

/// `show-<N>` display-order annotation inside node notes.
static SHOW_ORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bshow-(\d+)\b").expect("valid show-order pattern"));

/// Upper score bounds for the `simple` and `moderate` complexity levels.
const SIMPLE_MAX: f64 = 10.0;
const MODERATE_MAX: f64 = 25.0;

/// Extract the display order from a node note.
pub fn show_order(notes: &str) -> Option<i64> {
    SHOW_ORDER
        .captures(notes)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `nodes + connections + 2*ai + http + database + webhook`.
pub fn complexity_score(s: &WorkflowStructure) -> f64 {
    (s.node_count
        + s.connection_count
        + 2 * s.ai_node_count
        + s.http_node_count
        + s.database_node_count
        + s.webhook_node_count) as f64
}

/// Bucket a complexity score.
pub fn complexity_level(score: f64) -> &'static str {
    if score <= SIMPLE_MAX {
        "simple"
    } else if score <= MODERATE_MAX {
        "moderate"
    } else {
        "complex"
    }
}

/// Compute node counts, flags, score and node rows for one workflow.
pub fn analyze(payload: &RawWorkflowPayload, classifier: &NodeClassifier) -> WorkflowStructure {
    let mut s = WorkflowStructure {
        workflow_id: payload.id.clone(),
        node_count: payload.nodes.len() as i64,
        connection_count: payload.connection_count() as i64,
        ..Default::default()
    };

    let mut node_types = BTreeSet::new();
    for node in &payload.nodes {
        let categories = classifier.categories(&node.node_type);
        for category in &categories {
            match category {
                NodeCategory::Trigger => s.trigger_count += 1,
                NodeCategory::Ai => s.ai_node_count += 1,
                NodeCategory::Database => s.database_node_count += 1,
                NodeCategory::Http => s.http_node_count += 1,
                NodeCategory::Webhook => s.webhook_node_count += 1,
            }
        }

        s.has_manual_trigger |= is_manual_trigger(&node.node_type);
        s.has_wait_node |= is_wait_node(&node.node_type);
        s.has_error_handler |= is_error_trigger(&node.node_type);

        if !node.node_type.is_empty() {
            node_types.insert(node.node_type.as_str());
        }

        s.nodes.push(NodeRow {
            node_id: node.key().to_string(),
            name: node.name.clone(),
            node_type: node.node_type.clone(),
            category: categories.first().map(|c| c.as_str().to_string()),
            show_order: node.notes.as_deref().and_then(show_order),
            notes: node.notes.clone(),
            disabled: node.disabled,
        });
    }

    s.has_error_handler |= payload
        .settings
        .as_ref()
        .and_then(|settings| settings.error_workflow.as_deref())
        .is_some_and(|id| !id.is_empty());
    s.unique_node_types = node_types.len() as i64;
    s.complexity_score = complexity_score(&s);
    s
}
