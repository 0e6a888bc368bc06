//! Node-type classification.
//!
//! Categories come from a `pattern → category` table matched against the
//! lowercased node type, so new node families only need a new rule.

use std::borrow::Cow;
use std::fmt;

/// Node category counted in the workflow structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Trigger,
    Ai,
    Database,
    Http,
    Webhook,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Ai => "ai",
            Self::Database => "database",
            Self::Http => "http",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring rule: a node type containing `pattern` belongs to `category`.
///
/// Patterns are lowercase; node types are lowercased before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub pattern: Cow<'static, str>,
    pub category: NodeCategory,
}

const fn rule(pattern: &'static str, category: NodeCategory) -> ClassificationRule {
    ClassificationRule {
        pattern: Cow::Borrowed(pattern),
        category,
    }
}

/// Built-in rules. Order matters: the first matching category is the one
/// stored on a node row.
pub const DEFAULT_RULES: &[ClassificationRule] = &[
    rule("webhook", NodeCategory::Webhook),
    rule("trigger", NodeCategory::Trigger),
    rule("webhook", NodeCategory::Trigger),
    rule("cron", NodeCategory::Trigger),
    rule("n8n-nodes-base.schedule", NodeCategory::Trigger),
    rule("langchain", NodeCategory::Ai),
    rule("openai", NodeCategory::Ai),
    rule("anthropic", NodeCategory::Ai),
    rule("gemini", NodeCategory::Ai),
    rule("mistral", NodeCategory::Ai),
    rule("ollama", NodeCategory::Ai),
    rule("huggingface", NodeCategory::Ai),
    rule("postgres", NodeCategory::Database),
    rule("mysql", NodeCategory::Database),
    rule("mongodb", NodeCategory::Database),
    rule("mssql", NodeCategory::Database),
    rule("sqlite", NodeCategory::Database),
    rule("redis", NodeCategory::Database),
    rule("supabase", NodeCategory::Database),
    rule("snowflake", NodeCategory::Database),
    rule("elasticsearch", NodeCategory::Database),
    rule("httprequest", NodeCategory::Http),
    rule("graphql", NodeCategory::Http),
];

/// Marker node types used for structure flags.
pub const MANUAL_TRIGGER: &str = "manualtrigger";
pub const WAIT_NODE: &str = "n8n-nodes-base.wait";
pub const ERROR_TRIGGER: &str = "errortrigger";

/// Applies a rule table to node types.
#[derive(Debug, Clone)]
pub struct NodeClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for NodeClassifier {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }
}

impl NodeClassifier {
    /// Classifier with no rules at all.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. The pattern is matched case-insensitively.
    pub fn with_rule(mut self, pattern: impl Into<Cow<'static, str>>, category: NodeCategory) -> Self {
        let pattern = pattern.into();
        let pattern = if pattern.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(pattern.to_ascii_lowercase())
        } else {
            pattern
        };
        self.rules.push(ClassificationRule { pattern, category });
        self
    }

    /// Every category the node type belongs to, in rule order and without
    /// duplicates.
    pub fn categories(&self, node_type: &str) -> Vec<NodeCategory> {
        let lowered = node_type.to_ascii_lowercase();
        let mut found = Vec::new();
        for r in &self.rules {
            if lowered.contains(r.pattern.as_ref()) && !found.contains(&r.category) {
                found.push(r.category);
            }
        }
        found
    }
}

pub(crate) fn is_manual_trigger(node_type: &str) -> bool {
    node_type.to_ascii_lowercase().contains(MANUAL_TRIGGER)
}

pub(crate) fn is_wait_node(node_type: &str) -> bool {
    node_type.eq_ignore_ascii_case(WAIT_NODE)
}

pub(crate) fn is_error_trigger(node_type: &str) -> bool {
    node_type.to_ascii_lowercase().contains(ERROR_TRIGGER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(c: &NodeClassifier, node_type: &str) -> Option<NodeCategory> {
        c.categories(node_type).first().copied()
    }

    #[test]
    fn test_webhook_is_trigger_and_webhook() {
        let c = NodeClassifier::default();
        assert_eq!(
            c.categories("n8n-nodes-base.webhook"),
            vec![NodeCategory::Webhook, NodeCategory::Trigger]
        );
        assert_eq!(primary(&c, "n8n-nodes-base.webhook"), Some(NodeCategory::Webhook));
    }

    #[test]
    fn test_common_node_types() {
        let c = NodeClassifier::default();
        assert_eq!(primary(&c, "n8n-nodes-base.httpRequest"), Some(NodeCategory::Http));
        assert_eq!(primary(&c, "n8n-nodes-base.postgres"), Some(NodeCategory::Database));
        assert_eq!(
            primary(&c, "@n8n/n8n-nodes-langchain.lmChatOpenAi"),
            Some(NodeCategory::Ai)
        );
        assert_eq!(primary(&c, "n8n-nodes-base.scheduleTrigger"), Some(NodeCategory::Trigger));
        assert_eq!(primary(&c, "n8n-nodes-base.set"), None);
        // "mailchimp" must not look like an AI node.
        assert_eq!(primary(&c, "n8n-nodes-base.mailchimp"), None);
    }

    #[test]
    fn test_custom_rule_extends_table() {
        let c = NodeClassifier::empty().with_rule("airtable", NodeCategory::Database);
        assert_eq!(primary(&c, "n8n-nodes-base.airtable"), Some(NodeCategory::Database));
        assert_eq!(primary(&c, "n8n-nodes-base.postgres"), None);
    }

    #[test]
    fn test_custom_rule_is_case_insensitive() {
        let c = NodeClassifier::empty()
            .with_rule("AirTable", NodeCategory::Database)
            .with_rule(String::from("NocoDB"), NodeCategory::Database);
        assert_eq!(primary(&c, "n8n-nodes-base.airtable"), Some(NodeCategory::Database));
        assert_eq!(primary(&c, "n8n-nodes-base.airtableTrigger"), Some(NodeCategory::Database));
        assert_eq!(primary(&c, "n8n-nodes-base.nocoDb"), Some(NodeCategory::Database));
    }

    #[test]
    fn test_default_patterns_are_lowercase() {
        for r in DEFAULT_RULES {
            assert_eq!(r.pattern, r.pattern.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_marker_nodes() {
        assert!(is_manual_trigger("n8n-nodes-base.manualTrigger"));
        assert!(is_wait_node("n8n-nodes-base.wait"));
        assert!(!is_wait_node("n8n-nodes-base.waitForWebhook"));
        assert!(is_error_trigger("n8n-nodes-base.errorTrigger"));
    }
}
