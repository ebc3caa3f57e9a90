//! Scripted transports for exercising the feed and pagination logic without a
//! server.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use crate::error::{network_error, Error, NetworkErrorKind};
use crate::feed::{PushEvent, PushSource};
use crate::http::{Request, Response, Transport};

pub(crate) enum Reply {
    Json(u16, Value),
    Delayed(Duration, Value),
    Fail,
    /// Never completes; only a canceller gets the exchange out.
    Hang,
}

impl Reply {
    pub fn json(status: u16, data: Value) -> Self {
        Reply::Json(status, data)
    }
}

/// Answers requests from a queue of replies, in order, and records them.
/// Once the queue is empty every request hangs.
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, Error> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            Some(Reply::Json(status, data)) => Response::new(status, "", None, data),
            Some(Reply::Delayed(delay, data)) => {
                tokio::time::sleep(delay).await;
                Response::new(200, "OK", None, data)
            }
            Some(Reply::Fail) => Err(network_error(
                NetworkErrorKind::Connection,
                "Network request failed",
            )),
            Some(Reply::Hang) | None => std::future::pending().await,
        }
    }
}

/// Hands out one scripted event list per `open`. A script without a
/// `Closed` item leaves the stream open afterwards.
pub(crate) struct ScriptedPush {
    scripts: Mutex<VecDeque<Vec<PushEvent>>>,
    opened: Mutex<Vec<Request>>,
    refuse: bool,
}

impl ScriptedPush {
    pub fn new(scripts: impl IntoIterator<Item = Vec<PushEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            opened: Mutex::new(Vec::new()),
            refuse: false,
        }
    }

    /// A source whose `open` itself fails.
    pub fn failing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Vec::<Vec<PushEvent>>::new())
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened(&self) -> Vec<Request> {
        self.opened.lock().unwrap().clone()
    }
}

impl PushSource for ScriptedPush {
    fn open(&self, request: &Request) -> Result<BoxStream<'static, PushEvent>, Error> {
        self.opened.lock().unwrap().push(request.clone());
        if self.refuse {
            return Err(Error::from(url::ParseError::EmptyHost));
        }
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(stream::iter(script).chain(stream::pending()).boxed())
    }
}
