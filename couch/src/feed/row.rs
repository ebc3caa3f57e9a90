use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::query_value;

/// Resumption cursor issued by the server.
///
/// Opaque: numeric on CouchDB 1.x, a string on later versions, or the literal
/// `"now"`. The client never orders tokens, it only replays the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(Value);

impl Seq {
    /// Start from the current end of the feed.
    pub fn now() -> Self {
        Self(Value::from("now"))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Form used in the `since` query parameter.
    pub fn to_query_value(&self) -> String {
        query_value(&self.0)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

impl From<Value> for Seq {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Seq {
    fn from(value: &str) -> Self {
        Self(Value::from(value))
    }
}

impl From<String> for Seq {
    fn from(value: String) -> Self {
        Self(Value::from(value))
    }
}

impl From<u64> for Seq {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

/// One entry of a change notification batch, kept as the raw JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRow(Value);

impl ChangeRow {
    pub fn seq(&self) -> Option<Seq> {
        self.0.get("seq").cloned().map(Seq)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn is_deleted(&self) -> bool {
        self.0
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ChangeRow {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
