//! Document reads and writes below `api/`.

use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{invalid_document, Error};
use crate::http::Method;
use crate::Client;

const API: &str = "api";

/// Body of a successful write.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteResult {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

impl Client {
    /// Fetches the document `id`.
    pub async fn get(&self, id: &str) -> Result<Value, Error> {
        let request = self.call(Method::Get, [API, id]);
        self.send(&request).await?.into_data()
    }

    /// Deletes revision `rev` of document `id` and returns the server's reply.
    pub async fn delete(&self, id: &str, rev: &str) -> Result<Value, Error> {
        let request = self.call(Method::Delete, [API, id]).with_query("rev", rev);
        let data = self.send(&request).await?.into_data()?;
        debug!("Deleted {id} at {rev}");
        Ok(data)
    }

    /// Stores a new document, under `id` when given (PUT) or under a
    /// server-assigned id otherwise (POST). Returns a copy of `doc` stamped
    /// with the resulting `_id` and `_rev`.
    pub async fn create(&self, id: Option<&str>, doc: &Value) -> Result<Value, Error> {
        if !doc.is_object() {
            return Err(invalid_document("a document must be a JSON object"));
        }
        let request = match id {
            Some(id) => self.call(Method::Put, [API, id]),
            // Trailing empty segment: the database itself, `api/`.
            None => self.call(Method::Post, [API, ""]),
        }
        .with_body(doc.clone());

        let written: WriteResult = self.send(&request).await?.decode()?;
        debug!("Created {} at {}", written.id, written.rev);
        Ok(stamped(doc, &written))
    }

    /// Writes a new revision of `doc`, which must carry `_id`. Its `_rev`, when
    /// present, is sent as the `rev` being replaced.
    pub async fn update(&self, doc: &Value) -> Result<Value, Error> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_document("update requires a document with a string _id"))?;

        let mut request = self.call(Method::Put, [API, id]).with_body(doc.clone());
        if let Some(rev) = doc.get("_rev").and_then(Value::as_str) {
            request = request.with_query("rev", rev);
        }

        let written: WriteResult = self.send(&request).await?.decode()?;
        debug!("Updated {} to {}", written.id, written.rev);
        Ok(stamped(doc, &written))
    }
}

fn stamped(doc: &Value, written: &WriteResult) -> Value {
    let mut doc = doc.clone();
    if let Value::Object(fields) = &mut doc {
        fields.insert("_id".to_string(), Value::String(written.id.clone()));
        fields.insert("_rev".to_string(), Value::String(written.rev.clone()));
    }
    doc
}
