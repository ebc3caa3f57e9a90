//! The transport layer: request/response descriptors, the [`Transport`]
//! seam with its `reqwest` implementation, cancellable exchanges, and the
//! reconnect backoff policy.

mod client;
mod exchange;
mod params;
mod request;
mod response;
mod retry;

pub use client::{HttpClientConfig, HttpTransport, HttpTransportBuilder};
pub use exchange::{exchange, Aborted, Transport};
pub use params::{query_value, Params};
pub use request::{Method, Request};
pub use response::{is_success, normalize_status, Response};
pub use retry::Backoff;
