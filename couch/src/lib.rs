//! Client for a CouchApp served through a CouchDB rewriter.
//!
//! The rewriter exposes the database under `api/` and the design document
//! under `ddoc/`; every path used here is relative to that base URL. A
//! [`Client`] offers document reads and writes, paginated views and live
//! change feeds, all over a pluggable [`http::Transport`].

use std::sync::Arc;
use std::time::Duration;

use log::*;
use serde::Deserialize;
use service::config::Config;
use url::Url;

pub mod error;
pub mod feed;
pub mod http;

mod document;
mod view;

#[cfg(test)]
mod testing;

pub use document::WriteResult;
pub use error::{Error, ErrorKind};
pub use feed::{
    ChangeRow, ChangesQuery, FeedEvent, FeedHandle, FeedOptions, FeedState, Seq, Topic,
};
pub use http::{Method, Request, Response};
pub use view::{Page, ViewQuery, ViewRow};

use feed::{EventSourcePush, PushSource};
use http::{HttpTransportBuilder, Transport};

/// Settings applied to every call a [`Client`] makes.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Timeout for document and view requests. Change feed requests never
    /// carry one.
    pub request_timeout: Option<Duration>,
    pub feed: FeedOptions,
}

/// Handle to one CouchApp. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    push: Option<Arc<dyn PushSource>>,
    options: Arc<ClientOptions>,
    /// Segments inserted between the base URL and every request path.
    prefix: Vec<String>,
}

/// Outcome of [`Client::init`].
pub enum Init {
    /// The `api` response, whatever its status.
    Ready(Response),
    /// `api` was only reachable below `_rewrite/`; use this client instead.
    Rewritten(Client),
}

impl Client {
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        push: Option<Arc<dyn PushSource>>,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            push,
            options: Arc::new(options),
            prefix: Vec::new(),
        }
    }

    /// Builds an HTTP client from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let base_url = Url::parse(config.couch_url())?;
        let transport = HttpTransportBuilder::new(base_url.clone())
            .with_connect_timeout(config.connect_timeout())
            .build()?;

        let push = if config.feed_transport.push_supported() {
            Some(Arc::new(EventSourcePush::new(base_url.clone())) as Arc<dyn PushSource>)
        } else {
            None
        };

        info!(
            "Client for {base_url} (feed transport: {})",
            config.feed_transport
        );

        let options = ClientOptions {
            request_timeout: Some(config.request_timeout()),
            feed: FeedOptions {
                heartbeat: config.heartbeat(),
                watchdog: config.watchdog(),
                max_retries: config.feed_max_retries,
            },
        };
        Ok(Self::with_transport(Arc::new(transport), push, options))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn feed_options(&self) -> &FeedOptions {
        &self.options.feed
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn push_source(&self) -> Option<Arc<dyn PushSource>> {
        self.push.clone()
    }

    /// A request below the client's prefix, without a timeout.
    pub(crate) fn request<I, S>(&self, method: Method, path: I) -> Request
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = self
            .prefix
            .iter()
            .cloned()
            .chain(path.into_iter().map(Into::into));
        Request::new(method, path)
    }

    /// A request for a document or view call, with the configured timeout.
    pub(crate) fn call<I, S>(&self, method: Method, path: I) -> Request
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request(method, path)
            .with_timeout(self.options.request_timeout)
    }

    pub(crate) async fn send(&self, request: &Request) -> Result<Response, Error> {
        self.transport.send(request).await
    }

    fn rebased(&self, segment: &str) -> Self {
        let mut client = self.clone();
        client.prefix.push(segment.to_string());
        client
    }

    /// Checks that the app's `api` is reachable.
    ///
    /// With `auto_redirect`, a 404 is followed by a request for `_rewrite/api`;
    /// when that succeeds the returned client addresses everything below
    /// `_rewrite/`. A failing check is not an error here: the response is
    /// handed back for the caller to inspect.
    pub async fn init(&self, auto_redirect: bool) -> Result<Init, Error> {
        let response = self.send(&self.call(Method::Get, ["api"])).await?;
        if !auto_redirect || response.status != 404 {
            return Ok(Init::Ready(response));
        }

        debug!("api not found, trying _rewrite/api");
        let rewritten = self.rebased("_rewrite");
        let rewrite = rewritten.send(&rewritten.call(Method::Get, ["api"])).await?;
        if rewrite.status == 200 {
            info!("Rebasing client onto _rewrite/");
            Ok(Init::Rewritten(rewritten))
        } else {
            warn!("api not reachable (status {})", rewrite.status);
            Ok(Init::Ready(rewrite))
        }
    }
}

/// The part of the database info `api` answers with that the client reads.
#[derive(Debug, Deserialize)]
struct DatabaseInfo {
    update_seq: Seq,
}

impl Client {
    /// Current end of the change feed, as reported by `api`.
    ///
    /// Subscribing from this token instead of `now` cannot miss a write made
    /// after this call returns.
    pub async fn update_seq(&self) -> Result<Seq, Error> {
        let info: DatabaseInfo = self.send(&self.call(Method::Get, ["api"])).await?.decode()?;
        Ok(info.update_seq)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("prefix", &self.prefix)
            .field("push", &self.push.is_some())
            .field("options", &self.options)
            .finish()
    }
}
