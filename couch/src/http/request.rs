use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::Params;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single JSON exchange, described relative to the client's base URL.
///
/// Built once with the `with_*` methods and never mutated afterwards; the
/// feed loops clone a template and derive a fresh descriptor per iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl Request {
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Sets a query parameter, replacing an earlier value for the same key.
    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.query.push((key.to_string(), value)),
        }
        self
    }

    pub fn with_params(self, params: &Params) -> Self {
        params
            .to_pairs()
            .into_iter()
            .fold(self, |request, (key, value)| request.with_query(&key, value))
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolves the descriptor against `base`. Path segments are appended
    /// (percent-encoded) below the base path; any query on `base` is replaced.
    pub fn url(&self, base: &Url) -> Result<Url, Error> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::from(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(&self.path);

        url.set_query(None);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}
