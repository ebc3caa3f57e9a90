use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{application_error, network_error, Error, NetworkErrorKind};

/// Legacy platforms report a 204 as 1223.
const LEGACY_NO_CONTENT: u16 = 1223;

/// Outcome of one exchange. Never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    /// Final URL of the exchange when the transport discloses it.
    pub url: Option<Url>,
    /// Parsed body; `Value::Null` when the body was empty or not JSON.
    pub data: Value,
}

/// Maps 1223 to 204 and rejects anything outside `[100, 599]` as a
/// transport-level failure.
pub fn normalize_status(raw: u16) -> Result<u16, Error> {
    let status = if raw == LEGACY_NO_CONTENT { 204 } else { raw };
    if !(100..=599).contains(&status) {
        return Err(network_error(
            NetworkErrorKind::InvalidStatus(raw),
            &format!("Network request failed with status {raw}"),
        ));
    }
    Ok(status)
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status) || status == 304
}

impl Response {
    pub fn new(
        raw_status: u16,
        status_text: impl Into<String>,
        url: Option<Url>,
        data: Value,
    ) -> Result<Self, Error> {
        let status = normalize_status(raw_status)?;
        Ok(Self {
            ok: is_success(status),
            status,
            status_text: status_text.into(),
            url,
            data,
        })
    }

    /// The payload of a successful response, or an application error.
    pub fn into_data(self) -> Result<Value, Error> {
        if !self.ok {
            return Err(application_error(self.status, &self.status_text));
        }
        Ok(self.data)
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, Error> {
        let data = self.into_data()?;
        Ok(serde_json::from_value(data)?)
    }
}
