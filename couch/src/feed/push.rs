//! Push listener: the change feed over server-sent events.

use async_stream::stream;
use eventsource_client::{self as es, Client as _};
use futures_util::stream::{BoxStream, StreamExt};
use log::*;
use url::Url;

use super::sink::Sink;
use super::{ChangeRow, Exit};
use crate::error::{Error, ErrorKind, PushErrorKind};
use crate::http::Request;

pub(crate) const FEED_EVENTSOURCE: &str = "eventsource";

/// Default event name; CouchDB sends one change row per `message` event and
/// names its keep-alives `heartbeat`.
const MESSAGE_EVENT: &str = "message";

/// Items read off a push connection.
#[derive(Debug)]
pub enum PushEvent {
    /// A dispatched event with its name and raw data.
    Message { event: String, data: String },
    Comment,
    /// The connection ended. Always the last item of a stream.
    Closed(Option<Error>),
}

/// Opens server-push connections. Implemented over `eventsource-client` by
/// [`EventSourcePush`]; the feed controller only sees this seam.
pub trait PushSource: Send + Sync {
    fn open(&self, request: &Request) -> Result<BoxStream<'static, PushEvent>, Error>;
}

/// Eventsource connections below a fixed base URL.
///
/// The client's own reconnect is disabled: every close has to reach the
/// listener, and reconnects are re-issued by the controller from the last
/// acknowledged sequence.
#[derive(Debug, Clone)]
pub struct EventSourcePush {
    base_url: Url,
}

impl EventSourcePush {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl PushSource for EventSourcePush {
    fn open(&self, request: &Request) -> Result<BoxStream<'static, PushEvent>, Error> {
        let url = request.url(&self.base_url)?;
        let client = es::ClientBuilder::for_url(url.as_str())
            .map_err(|e| Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::InvalidUrl,
            })?
            .header("Accept", "text/event-stream")?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        Ok(stream! {
            let mut events = client.stream();
            while let Some(item) = events.next().await {
                match item {
                    Ok(es::SSE::Event(event)) => yield PushEvent::Message {
                        event: event.event_type,
                        data: event.data,
                    },
                    Ok(es::SSE::Comment(_)) => yield PushEvent::Comment,
                    Err(e) => {
                        yield PushEvent::Closed(Some(e.into()));
                        return;
                    }
                }
            }
            yield PushEvent::Closed(None);
        }
        .boxed())
    }
}

/// Runs one push connection until it closes or the feed is stopped.
///
/// Anything received (event or comment) counts as a handshake. `established`
/// tells whether an earlier connection of the same feed got that far.
///
/// - A rejected (re)connect is [`Exit::Unsupported`].
/// - A dropped connection of an established feed is [`Exit::Disconnected`].
/// - A dropped connection of a feed that never saw a handshake is taken as
///   missing server support, [`Exit::Unsupported`] as well.
pub(crate) async fn listen(
    source: &dyn PushSource,
    request: &Request,
    sink: &Sink,
    established: bool,
) -> Exit {
    let mut events = match source.open(request) {
        Ok(events) => events,
        Err(e) => return Exit::Failed(e),
    };
    debug!("Eventsource feed opened since {:?}", request.query_value("since"));

    let mut handshake = false;
    loop {
        let item = tokio::select! {
            biased;
            _ = sink.stopped() => {
                debug!("Eventsource feed closed on stop");
                return Exit::Stopped;
            }
            item = events.next() => item,
        };

        match item {
            Some(PushEvent::Message { event, data }) => {
                handshake = true;
                if event != MESSAGE_EVENT {
                    trace!("Eventsource {event} event");
                    continue;
                }
                match serde_json::from_str::<ChangeRow>(&data) {
                    Ok(row) => sink.notify(vec![row]),
                    Err(e) => warn!("Skipping eventsource message that is not JSON: {e}"),
                }
            }
            Some(PushEvent::Comment) => handshake = true,
            Some(PushEvent::Closed(error)) => return closed(handshake || established, error),
            None => return closed(handshake || established, None),
        }
    }
}

fn closed(established: bool, error: Option<Error>) -> Exit {
    let rejected = matches!(
        &error,
        Some(e) if e.error_kind == ErrorKind::Push(PushErrorKind::Rejected)
    );

    if established && !rejected {
        match &error {
            Some(e) => info!("Eventsource connection dropped: {e}"),
            None => info!("Eventsource stream ended"),
        }
        return Exit::Disconnected;
    }

    Exit::Unsupported(Error {
        source: error.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        error_kind: ErrorKind::Push(PushErrorKind::Unsupported),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::push_error;
    use crate::feed::observer::{FeedEvent, Registry, Topic};
    use crate::feed::Seq;
    use crate::http::Method;
    use crate::testing::ScriptedPush;
    use mockito::{Matcher, Server};
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    struct Harness {
        sink: Sink,
        stop: watch::Sender<bool>,
        events: Arc<Mutex<Vec<FeedEvent>>>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(Registry::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        for topic in [Topic::Changes, Topic::Error] {
            let events = Arc::clone(&events);
            registry.register(
                topic,
                Arc::new(move |event| events.lock().unwrap().push(event.clone())),
            );
        }
        let (stop, stop_rx) = watch::channel(false);
        let last_seq = Arc::new(watch::Sender::new(Some(Seq::now())));
        Harness {
            sink: Sink::new(registry, stop_rx, last_seq),
            stop,
            events,
        }
    }

    fn request() -> Request {
        Request::new(Method::Get, ["api", "_changes"]).with_query("feed", FEED_EVENTSOURCE)
    }

    fn message(data: &str) -> PushEvent {
        PushEvent::Message {
            event: MESSAGE_EVENT.to_string(),
            data: data.to_string(),
        }
    }

    fn batches(events: &[FeedEvent]) -> Vec<Vec<String>> {
        events
            .iter()
            .filter_map(|e| match e {
                FeedEvent::Changes(rows) => Some(
                    rows.iter()
                        .filter_map(ChangeRow::id)
                        .map(str::to_string)
                        .collect(),
                ),
                FeedEvent::Error(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_each_message_is_a_batch_of_one() {
        let h = harness();
        let source = ScriptedPush::new([vec![
            message(r#"{"seq":1,"id":"a"}"#),
            message(r#"{"seq":2,"id":"b"}"#),
            PushEvent::Closed(None),
        ]]);

        let exit = listen(&source, &request(), &h.sink, false).await;

        assert!(matches!(exit, Exit::Disconnected));
        assert_eq!(batches(&h.events.lock().unwrap()), vec![vec!["a"], vec!["b"]]);
        assert_eq!(h.sink.last_seq(), Some(Seq::from(2u64)));
    }

    #[tokio::test]
    async fn test_close_before_anything_is_unsupported() {
        let h = harness();
        let source = ScriptedPush::new([vec![PushEvent::Closed(Some(push_error(
            PushErrorKind::Closed,
            "connection reset",
        )))]]);

        let exit = listen(&source, &request(), &h.sink, false).await;

        match exit {
            Exit::Unsupported(err) => assert_eq!(
                err.error_kind,
                ErrorKind::Push(PushErrorKind::Unsupported)
            ),
            other => panic!("expected unsupported, got {other:?}"),
        }
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_after_handshake_is_a_disconnect() {
        let h = harness();
        let source = ScriptedPush::new([vec![
            message(r#"{"seq":1,"id":"a"}"#),
            PushEvent::Closed(Some(push_error(PushErrorKind::Closed, "connection reset"))),
        ]]);

        let exit = listen(&source, &request(), &h.sink, false).await;

        assert!(matches!(exit, Exit::Disconnected));
        assert_eq!(h.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_established_feed_survives_a_silent_reconnect_failure() {
        let h = harness();
        let source = ScriptedPush::new([vec![PushEvent::Closed(Some(push_error(
            PushErrorKind::Closed,
            "connection refused",
        )))]]);

        let exit = listen(&source, &request(), &h.sink, true).await;

        assert!(matches!(exit, Exit::Disconnected));
    }

    #[tokio::test]
    async fn test_rejected_reconnect_is_unsupported() {
        let h = harness();
        let source = ScriptedPush::new([vec![PushEvent::Closed(Some(push_error(
            PushErrorKind::Rejected,
            "400 Bad Request",
        )))]]);

        let exit = listen(&source, &request(), &h.sink, true).await;

        assert!(matches!(exit, Exit::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_counts_as_handshake() {
        let h = harness();
        let source = ScriptedPush::new([vec![
            PushEvent::Message {
                event: "heartbeat".to_string(),
                data: String::new(),
            },
            PushEvent::Closed(None),
        ]]);

        let exit = listen(&source, &request(), &h.sink, false).await;

        assert!(matches!(exit, Exit::Disconnected));
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_is_skipped() {
        let h = harness();
        let source = ScriptedPush::new([vec![
            message("not json"),
            message(r#"{"seq":3,"id":"c"}"#),
            PushEvent::Closed(None),
        ]]);

        listen(&source, &request(), &h.sink, false).await;

        assert_eq!(h.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_the_connection() {
        let h = harness();
        // No close in the script: the stream stays open until stopped.
        let source = ScriptedPush::new([vec![message(r#"{"seq":1,"id":"a"}"#)]]);

        let request = request();
        let listener = listen(&source, &request, &h.sink, false);
        let stopper = async {
            tokio::task::yield_now().await;
            h.stop.send_replace(true);
        };
        let (exit, _) = tokio::join!(listener, stopper);

        assert!(matches!(exit, Exit::Stopped));
        assert_eq!(source.open_count(), 1);
    }

    fn eventsource(server: &Server) -> EventSourcePush {
        EventSourcePush::new(Url::parse(&format!("{}/app/_rewrite/", server.url())).unwrap())
    }

    #[tokio::test]
    async fn test_server_without_eventsource_is_unsupported() {
        let mut server = Server::new_async().await;
        let changes = server
            .mock("GET", "/app/_rewrite/api/_changes")
            .match_query(Matcher::UrlEncoded("feed".into(), "eventsource".into()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"bad_request","reason":"invalid feed"}"#)
            .create_async()
            .await;
        let h = harness();

        let exit = listen(&eventsource(&server), &request(), &h.sink, false).await;

        assert!(matches!(exit, Exit::Unsupported(_)));
        assert!(h.events.lock().unwrap().is_empty());
        changes.assert_async().await;
    }

    #[tokio::test]
    async fn test_event_stream_rows_are_delivered() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/_rewrite/api/_changes")
            .match_query(Matcher::UrlEncoded("feed".into(), "eventsource".into()))
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"seq\":1,\"id\":\"a\"}\n\n")
            .create_async()
            .await;
        let h = harness();

        let exit = listen(&eventsource(&server), &request(), &h.sink, false).await;

        assert!(matches!(exit, Exit::Disconnected));
        assert_eq!(batches(&h.events.lock().unwrap()), vec![vec!["a"]]);
        assert_eq!(h.sink.last_seq(), Some(Seq::from(1u64)));
    }
}
