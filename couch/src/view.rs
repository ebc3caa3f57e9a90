//! View queries and page-wise navigation through their results.

use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{empty_page, Error};
use crate::feed::Seq;
use crate::http::{Method, Params};
use crate::Client;

/// Keys whose non-string values are sent as JSON text.
const JSON_KEYS: [&str; 3] = ["key", "startkey", "endkey"];

/// Query arguments of a view request, in the order they were set.
///
/// `update_seq=true` and `reduce=false` are always sent ahead of these; a
/// caller can still override either.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery(Params);

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.set(key, value);
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.0.remove(key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.set("key", key)
    }

    pub fn start_key(self, key: impl Into<Value>) -> Self {
        self.set("startkey", key)
    }

    pub fn end_key(self, key: impl Into<Value>) -> Self {
        self.set("endkey", key)
    }

    pub fn descending(self, descending: bool) -> Self {
        self.set("descending", descending)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.set("limit", limit)
    }

    pub fn skip(self, skip: u64) -> Self {
        self.set("skip", skip)
    }

    pub fn include_docs(self, include: bool) -> Self {
        self.set("include_docs", include)
    }

    pub fn is_descending(&self) -> bool {
        self.0.is_truthy("descending")
    }

    /// The parameters actually sent.
    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new()
            .with("update_seq", true)
            .with("reduce", false);
        params.extend(&self.0);
        for key in JSON_KEYS {
            if let Some(value) = params.get(key) {
                if !value.is_string() {
                    let text = value.to_string();
                    params.set(key, text);
                }
            }
        }
        params
    }

    /// Continues after `row` in the same direction.
    fn after(&self, row: &ViewRow) -> Self {
        let mut query = self.clone().remove("key");
        query.0.set("startkey", row.key.to_string());
        match &row.id {
            Some(id) => query.0.set("startkey_docid", id.clone()),
            None => {
                query.0.remove("startkey_docid");
            }
        }
        query.skip(1)
    }

    fn reversed(&self) -> Self {
        let descending = !self.is_descending();
        self.clone().descending(descending)
    }
}

/// One row of a view result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewRow {
    /// Absent on reduced rows.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    /// Present with `include_docs=true`.
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    #[serde(default)]
    rows: Vec<ViewRow>,
    total_rows: Option<u64>,
    offset: Option<u64>,
    update_seq: Option<Seq>,
}

/// A page of view rows that knows how to fetch its neighbours.
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<ViewRow>,
    pub total_rows: Option<u64>,
    pub offset: Option<u64>,
    pub update_seq: Option<Seq>,
    client: Client,
    view_id: String,
    query: ViewQuery,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Query this page was fetched with, in the caller's direction.
    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    /// The page following the last row.
    pub async fn next(&self) -> Result<Page, Error> {
        let last = self.rows.last().ok_or_else(empty_page)?;
        self.client
            .view(&self.view_id, self.query.after(last))
            .await
    }

    /// The page preceding the first row, rows in this page's order.
    ///
    /// It is fetched by walking backwards from the first row and then
    /// reversed; the returned page navigates in this page's direction.
    pub async fn previous(&self) -> Result<Page, Error> {
        let first = self.rows.first().ok_or_else(empty_page)?;
        let query = self.query.after(first);

        let mut page = self.client.view(&self.view_id, query.reversed()).await?;
        page.rows.reverse();
        page.query = query;
        Ok(page)
    }
}

impl Client {
    /// Queries `ddoc/_view/{view_id}` with `reduce=false`.
    pub async fn view(&self, view_id: &str, query: ViewQuery) -> Result<Page, Error> {
        let request = self
            .call(Method::Get, ["ddoc", "_view", view_id])
            .with_params(&query.to_params());
        let response: ViewResponse = self.send(&request).await?.decode()?;
        trace!("View {view_id} returned {} rows", response.rows.len());

        Ok(Page {
            rows: response.rows,
            total_rows: response.total_rows,
            offset: response.offset,
            update_seq: response.update_seq,
            client: self.clone(),
            view_id: view_id.to_string(),
            query,
        })
    }
}
