//! Wire types shared by the API modules.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// The `{ data: [...], nextCursor }` envelope every list endpoint returns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A list item that came back from upstream but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    /// The item's `id`, when it had a usable one.
    pub id: Option<String>,
    pub error: String,
}

impl fmt::Display for RejectedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_deref().unwrap_or("<no id>");
        write!(f, "{id}: undecodable payload: {}", self.error)
    }
}

/// Decoded list items plus the items that failed to decode.
///
/// One malformed entity never fails the whole list; callers decide how to
/// report the rejects.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub rejected: Vec<RejectedItem>,
}

impl<T> Listing<T> {
    pub(crate) fn decode(
        entity: &'static str,
        values: Vec<Value>,
        decode: impl Fn(Value) -> serde_json::Result<T>,
    ) -> Self {
        let mut items = Vec::with_capacity(values.len());
        let mut rejected = Vec::new();
        for value in values {
            let id = match value.get("id") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            match decode(value) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(entity, id = ?id, error = %e, "Skipping undecodable list item");
                    rejected.push(RejectedItem {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Self { items, rejected }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
