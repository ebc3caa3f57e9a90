use anyhow::Result;
use couch::{ChangeRow, ChangesQuery, Client, FeedEvent, FeedHandle, FeedState, Seq};
use log::*;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Change {
    pub row: ChangeRow,
    pub timestamp: Instant,
}

/// A change feed subscription whose notifications can be awaited one by one.
pub struct Watcher {
    pub label: String,
    feed: FeedHandle,
    event_rx: mpsc::UnboundedReceiver<FeedEvent>,
}

impl Watcher {
    /// Subscribes from `since` and waits until a transport is active.
    ///
    /// Pass an explicit sequence (see [`Client::update_seq`]): an active state
    /// does not mean the server has seen the request yet, so `now` could skip
    /// writes made right after this returns.
    pub async fn establish(
        client: &Client,
        label: String,
        since: Seq,
        timeout: Duration,
    ) -> Result<Self> {
        debug!("{} subscribing since {}", label, since);
        let feed = client.changes(since, ChangesQuery::new());
        let event_rx = feed.events();

        let mut state = feed.watch_state();
        let active = tokio::time::timeout(timeout, async {
            state
                .wait_for(|s| matches!(s, FeedState::PushActive | FeedState::PullActive))
                .await
                .map(|_| ())
        })
        .await;
        match active {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => anyhow::bail!("Change feed task for {} ended during startup", label),
            Err(_) => anyhow::bail!("Change feed for {} did not start within {:?}", label, timeout),
        }
        debug!("{} subscribed in state {:?}", label, feed.state());

        Ok(Self {
            label,
            feed,
            event_rx,
        })
    }

    pub fn state(&self) -> FeedState {
        self.feed.state()
    }

    pub fn last_seq(&self) -> Option<Seq> {
        self.feed.last_seq()
    }

    pub async fn wait_for_change(&mut self, doc_id: &str, timeout: Duration) -> Result<Change> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for change to: {}", doc_id);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(FeedEvent::Changes(rows))) => {
                    if let Some(row) = rows.into_iter().find(|row| row.id() == Some(doc_id)) {
                        return Ok(Change {
                            row,
                            timestamp: Instant::now(),
                        });
                    }
                    // Changes to other documents, keep waiting
                }
                Ok(Some(FeedEvent::Error(e))) => {
                    anyhow::bail!("Change feed failed: {}", e);
                }
                Ok(None) => {
                    anyhow::bail!("Change feed closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for change to: {}", doc_id);
                }
            }
        }
    }

    pub async fn stop(mut self) -> FeedState {
        self.feed.stop();
        self.feed.closed().await;
        self.feed.state()
    }
}
