//! Live change feed subscriptions.
//!
//! # Lifecycle
//!
//! [`Client::changes`] spawns one task per subscription and returns a
//! [`FeedHandle`]. The task walks an explicit [`FeedState`] machine:
//!
//! 1. `PushActive` when the client has a [`PushSource`]: an eventsource
//!    connection, one row per `message` event. A connection that drops after
//!    it was established is re-opened from the last acknowledged sequence,
//!    without reporting an error.
//! 2. If the first connection closes before delivering anything, or the
//!    server rejects a (re)connect, the server is taken not to support
//!    eventsource and the task falls back, once, to `PullActive`: sequential
//!    longpoll requests guarded by a watchdog.
//! 3. `Stopped` on [`FeedHandle::stop`] (or when the handle is dropped),
//!    `Failed` on an error the retry budget does not cover.
//!
//! Errors never escape the task; they are delivered to the `error` topic,
//! after which the feed is finished and the consumer re-subscribes from
//! [`FeedHandle::last_seq`] if it wants to continue.

mod observer;
mod pull;
mod push;
mod row;
mod sink;
mod state;

use std::sync::Arc;
use std::time::Duration;

use log::*;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::http::{Backoff, Method, Params, Request, Transport};
use crate::Client;

pub use observer::{FeedEvent, Topic};
pub use push::{EventSourcePush, PushEvent, PushSource};
pub use row::{ChangeRow, Seq};
pub use state::FeedState;

use observer::Registry;
use sink::Sink;
use state::FeedMachine;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(180);

/// Pause before re-opening a dropped eventsource connection.
const PUSH_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Timing and retry settings shared by every subscription of a client.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Keep-alive interval requested from the server.
    pub heartbeat: Duration,
    /// Longest a longpoll request may stay silent before it is re-issued.
    pub watchdog: Duration,
    /// Reconnects allowed after genuine failures; 0 reports the first one.
    pub max_retries: u32,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            watchdog: DEFAULT_WATCHDOG,
            max_retries: 0,
        }
    }
}

/// Extra `_changes` query parameters; they override the computed `since` and
/// `heartbeat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesQuery(Params);

impl ChangesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.set(key, value);
        self
    }

    pub fn include_docs(self, include: bool) -> Self {
        self.set("include_docs", include)
    }

    pub fn filter(self, filter: &str) -> Self {
        self.set("filter", filter)
    }

    pub fn style(self, style: &str) -> Self {
        self.set("style", style)
    }
}

/// How a push or pull listener finished.
#[derive(Debug)]
pub(crate) enum Exit {
    Stopped,
    /// Push is not served; a candidate for fallback.
    Unsupported(Error),
    /// An established push connection dropped; re-open it.
    Disconnected,
    Failed(Error),
}

/// Consumer side of a subscription.
///
/// Dropping the handle stops the feed.
pub struct FeedHandle {
    registry: Arc<Registry>,
    stop: watch::Sender<bool>,
    state: watch::Receiver<FeedState>,
    last_seq: watch::Receiver<Option<Seq>>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Registers `observer` for the topic called `topic` (`"changes"` or
    /// `"error"`). Any other name is ignored.
    pub fn on<F>(&self, topic: &str, observer: F)
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        match Topic::from_name(topic) {
            Some(topic) => self.registry.register(topic, Arc::new(observer)),
            None => debug!("Ignoring observer for unknown feed topic {topic:?}"),
        }
    }

    pub fn on_changes<F>(&self, observer: F)
    where
        F: Fn(&[ChangeRow]) + Send + Sync + 'static,
    {
        self.registry.register(
            Topic::Changes,
            Arc::new(move |event| {
                if let FeedEvent::Changes(rows) = event {
                    observer(rows)
                }
            }),
        );
    }

    pub fn on_error<F>(&self, observer: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.registry.register(
            Topic::Error,
            Arc::new(move |event| {
                if let FeedEvent::Error(err) = event {
                    observer(err)
                }
            }),
        );
    }

    /// Channel fan-out of both topics, for consumers that prefer to await
    /// events instead of registering callbacks.
    pub fn events(&self) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for topic in [Topic::Changes, Topic::Error] {
            let tx = tx.clone();
            self.registry.register(
                topic,
                Arc::new(move |event| {
                    let _ = tx.send(event.clone());
                }),
            );
        }
        rx
    }

    /// Stops the feed. Idempotent.
    ///
    /// Once this returns no new observer call starts, even if a request
    /// completes afterwards. A call already running on another worker thread
    /// is not interrupted.
    pub fn stop(&self) {
        if self.registry.close() {
            self.stop.send_replace(true);
            info!("Change feed stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    /// Receiver following every state transition.
    pub fn watch_state(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Last sequence token acknowledged by a notification or longpoll batch.
    pub fn last_seq(&self) -> Option<Seq> {
        self.last_seq.borrow().clone()
    }

    /// Waits for the subscription task to finish (after stop or failure).
    ///
    /// Cancel-safe: dropping the future keeps the task joinable.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                error!("Change feed task ended abnormally: {e}");
            }
            self.task = None;
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the subscription task owns.
struct Subscription {
    transport: Arc<dyn Transport>,
    push: Option<Arc<dyn PushSource>>,
    template: Request,
    options: FeedOptions,
    sink: Sink,
    state: watch::Sender<FeedState>,
}

impl Client {
    /// Opens a change feed resuming after `last_seq`.
    ///
    /// Must be called from within a tokio runtime; the subscription runs on a
    /// spawned task until stopped or failed. Events are not replayed, so
    /// observers should be registered right after this returns; nothing is
    /// published before the first response arrives.
    pub fn changes(&self, last_seq: impl Into<Seq>, query: ChangesQuery) -> FeedHandle {
        let options = self.feed_options().clone();

        let mut params = Params::new()
            .with("since", last_seq.into().as_value().clone())
            .with("heartbeat", options.heartbeat.as_millis() as u64);
        params.extend(&query.0);
        let since = params.get("since").cloned().map(Seq::from);

        let registry = Arc::new(Registry::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(FeedState::Uninitialized);
        let last_seq = Arc::new(watch::Sender::new(since));
        let last_seq_rx = last_seq.subscribe();

        let subscription = Subscription {
            transport: self.transport(),
            push: self.push_source(),
            template: self
                .request(Method::Get, ["api", "_changes"])
                .with_params(&params),
            options,
            sink: Sink::new(Arc::clone(&registry), stop_rx, last_seq),
            state: state_tx,
        };
        let task = tokio::spawn(run(subscription));

        FeedHandle {
            registry,
            stop: stop_tx,
            state: state_rx,
            last_seq: last_seq_rx,
            task: Some(task),
        }
    }
}

async fn run(subscription: Subscription) {
    let Subscription {
        transport,
        push,
        template,
        options,
        sink,
        state,
    } = subscription;

    let backoff = Backoff::new(options.max_retries);
    let mut retries = 0u32;
    let mut seq_at_last_failure = None;
    let mut push_established = false;

    let mut machine = FeedMachine::new();
    state.send_replace(machine.start(push.is_some()));

    loop {
        let exit = match (machine.state(), &push) {
            (FeedState::PushActive, Some(push)) => {
                let request = template
                    .clone()
                    .with_query("feed", push::FEED_EVENTSOURCE)
                    .with_query("since", current_since(&sink));
                push::listen(push.as_ref(), &request, &sink, push_established).await
            }
            (FeedState::PushActive, None) | (FeedState::PullActive, _) => {
                pull::poll(transport.as_ref(), &template, options.watchdog, &sink).await
            }
            (FeedState::Uninitialized | FeedState::Stopped | FeedState::Failed, _) => break,
        };

        match exit {
            Exit::Stopped => {
                state.send_replace(machine.stop());
                break;
            }
            Exit::Disconnected => {
                push_established = true;
                debug!("Re-opening eventsource feed in {PUSH_RECONNECT_DELAY:?}");
                tokio::select! {
                    biased;
                    _ = sink.stopped() => {
                        state.send_replace(machine.stop());
                        break;
                    }
                    _ = tokio::time::sleep(PUSH_RECONNECT_DELAY) => {}
                }
            }
            Exit::Unsupported(err) => {
                let next = machine.push_unsupported();
                state.send_replace(next);
                if next == FeedState::Failed {
                    error!("Eventsource unsupported after fallback was spent: {err}");
                    sink.error(err);
                    break;
                }
                warn!("Eventsource not supported by the server ({err}), falling back to longpoll");
            }
            Exit::Failed(err) => {
                // Progress since the previous failure restores the full budget.
                let seq = sink.last_seq();
                if seq != seq_at_last_failure {
                    retries = 0;
                }
                seq_at_last_failure = seq;

                match backoff.delay(retries) {
                    Some(delay) => {
                        retries += 1;
                        warn!(
                            "Change feed failed ({err}), reconnecting in {delay:?} (attempt {retries}/{})",
                            backoff.max_retries()
                        );
                        tokio::select! {
                            biased;
                            _ = sink.stopped() => {
                                state.send_replace(machine.stop());
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        error!("Change feed failed: {err}");
                        state.send_replace(machine.fail());
                        sink.error(err);
                        break;
                    }
                }
            }
        }
    }
}

fn current_since(sink: &Sink) -> String {
    sink.last_seq().unwrap_or_else(Seq::now).to_query_value()
}
