//! Error types for the `couch` crate.
//!
//! Follows the layered pattern used across the workspace: a root `Error` struct
//! carrying an `ErrorKind` tree plus an optional boxed source for chaining.
//!
//! The kinds line up with how failures are handled:
//! - `Network`: the exchange itself failed (connection, timeout, nonsense
//!   status). Never retried automatically, except the longpoll watchdog's
//!   liveness restart which does not surface as an error at all.
//! - `Application`: a well-formed response with a non-success status.
//! - everything else is produced locally, before or after the network call.
//!
//! Deliberate cancellation is not an `Error`; see [`crate::http::Aborted`].

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in `couch`.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Network(NetworkErrorKind),
    Application(ApplicationErrorKind),
    /// The response body did not have the expected shape.
    Decode,
    /// A document without the fields an operation needs (`_id` for update,
    /// an object for create/update).
    InvalidDocument,
    InvalidUrl,
    /// Navigation was requested from a page without rows.
    EmptyPage,
    Push(PushErrorKind),
}

#[derive(Debug, PartialEq)]
pub enum NetworkErrorKind {
    /// The server reported a status outside `[100, 599]`.
    InvalidStatus(u16),
    Connection,
    Timeout,
    BuilderFailed,
}

/// A non-success response. `status_text` is the reason phrase the error is
/// displayed with.
#[derive(Debug, PartialEq)]
pub struct ApplicationErrorKind {
    pub status: u16,
    pub status_text: String,
}

#[derive(Debug, PartialEq)]
pub enum PushErrorKind {
    /// The server does not serve the change feed as eventsource.
    Unsupported,
    /// The server answered a (re)connect with something other than an event
    /// stream.
    Rejected,
    /// The connection dropped; a new one may well succeed.
    Closed,
}

impl Error {
    pub fn is_network(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Network(_))
    }

    /// Status code of an application error, `None` for every other kind.
    pub fn status(&self) -> Option<u16> {
        match &self.error_kind {
            ErrorKind::Application(app) => Some(app.status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Network(kind) => write!(f, "Network request failed: {:?}", kind)?,
            ErrorKind::Application(app) => {
                write!(f, "Request failed ({}): {}", app.status, app.status_text)?
            }
            ErrorKind::Decode => write!(f, "Unexpected response body")?,
            ErrorKind::InvalidDocument => write!(f, "Invalid document")?,
            ErrorKind::InvalidUrl => write!(f, "Invalid URL")?,
            ErrorKind::EmptyPage => write!(f, "No further pages")?,
            ErrorKind::Push(kind) => write!(f, "Eventsource feed error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Builder errors happen before anything reaches the network.
        let kind = if err.is_builder() {
            NetworkErrorKind::BuilderFailed
        } else if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else {
            NetworkErrorKind::Connection
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Network(kind),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Decode,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::InvalidUrl,
        }
    }
}

impl From<eventsource_client::Error> for Error {
    fn from(err: eventsource_client::Error) -> Self {
        use eventsource_client::Error as EsError;

        let kind = match err {
            EsError::UnexpectedResponse(..) | EsError::InvalidParameter(..) => {
                PushErrorKind::Rejected
            }
            _ => PushErrorKind::Closed,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Push(kind),
        }
    }
}

/// Helper function to create network errors.
pub fn network_error(kind: NetworkErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Network(kind),
    }
}

/// Helper function to create application errors from a response status.
pub fn application_error(status: u16, status_text: &str) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Application(ApplicationErrorKind {
            status,
            status_text: status_text.to_string(),
        }),
    }
}

/// Helper function to create invalid document errors.
pub fn invalid_document(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::InvalidDocument,
    }
}

/// Helper function to create push feed errors.
pub fn push_error(kind: PushErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Push(kind),
    }
}

pub fn empty_page() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::EmptyPage,
    }
}
