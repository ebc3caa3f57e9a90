use std::sync::Arc;

use tokio::sync::watch;

use super::observer::{FeedEvent, Registry};
use super::{ChangeRow, Seq};
use crate::error::Error;

/// What the push and pull listeners report into: notifications, errors, the
/// acknowledged cursor, and the stop signal they race their work against.
#[derive(Clone)]
pub(crate) struct Sink {
    registry: Arc<Registry>,
    stop: watch::Receiver<bool>,
    last_seq: Arc<watch::Sender<Option<Seq>>>,
}

impl Sink {
    pub fn new(
        registry: Arc<Registry>,
        stop: watch::Receiver<bool>,
        last_seq: Arc<watch::Sender<Option<Seq>>>,
    ) -> Self {
        Self {
            registry,
            stop,
            last_seq,
        }
    }

    pub fn notify(&self, rows: Vec<ChangeRow>) {
        if self.is_stopped() {
            return;
        }
        if let Some(seq) = rows.last().and_then(ChangeRow::seq) {
            self.acknowledge(seq);
        }
        self.registry.publish(FeedEvent::Changes(rows));
    }

    pub fn error(&self, err: Error) {
        self.registry.publish(FeedEvent::Error(Arc::new(err)));
    }

    pub fn acknowledge(&self, seq: Seq) {
        self.last_seq.send_replace(Some(seq));
    }

    pub fn last_seq(&self) -> Option<Seq> {
        self.last_seq.borrow().clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow() || self.registry.is_closed()
    }

    /// Resolves once the feed is stopped, or immediately if the handle is gone.
    pub async fn stopped(&self) {
        let mut stop = self.stop.clone();
        let _ = stop.wait_for(|stopped| *stopped).await;
    }
}
