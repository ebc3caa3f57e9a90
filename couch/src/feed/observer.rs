use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::*;

use super::ChangeRow;
use crate::error::Error;

/// Topics a feed handle accepts observers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Changes,
    Error,
}

impl Topic {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "changes" => Some(Topic::Changes),
            "error" => Some(Topic::Error),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Topic::Changes => "changes",
            Topic::Error => "error",
        }
    }
}

/// Payload delivered to observers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Changes(Vec<ChangeRow>),
    Error(Arc<Error>),
}

impl FeedEvent {
    pub fn topic(&self) -> Topic {
        match self {
            FeedEvent::Changes(_) => Topic::Changes,
            FeedEvent::Error(_) => Topic::Error,
        }
    }
}

pub(crate) type Observer = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

/// Topic to observers table plus the delivery gate.
///
/// Once `close` has returned, `publish` starts no further observer call. The
/// gate is checked before each call, so a call that already started on
/// another thread runs to completion.
#[derive(Default)]
pub(crate) struct Registry {
    observers: DashMap<Topic, Vec<Observer>>,
    closed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, topic: Topic, observer: Observer) {
        self.observers.entry(topic).or_default().push(observer);
    }

    /// Returns `true` only for the call that actually closed the registry.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn publish(&self, event: FeedEvent) {
        if self.is_closed() {
            trace!("Dropping {} event for a stopped feed", event.topic().name());
            return;
        }

        // Snapshot so observers may register more observers without deadlocking.
        let observers = match self.observers.get(&event.topic()) {
            Some(entry) => entry.value().clone(),
            None => return,
        };

        for observer in observers {
            if self.is_closed() {
                return;
            }
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> Observer {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn changes() -> FeedEvent {
        FeedEvent::Changes(vec![ChangeRow::from(json!({"seq": 1, "id": "a"}))])
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::from_name("changes"), Some(Topic::Changes));
        assert_eq!(Topic::from_name("error"), Some(Topic::Error));
        assert_eq!(Topic::from_name("change"), None);
        assert_eq!(Topic::Changes.name(), "changes");
    }

    #[test]
    fn test_publish_reaches_only_matching_topic_in_order() {
        let registry = Registry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let order = Arc::clone(&order);
            registry.register(
                Topic::Changes,
                Arc::new(move |_| order.lock().unwrap().push(label)),
            );
        }
        let errors = Arc::new(AtomicUsize::new(0));
        registry.register(Topic::Error, counting(&errors));

        registry.publish(changes());

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_is_single_fire_and_gates_delivery() {
        let registry = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(Topic::Changes, counting(&count));

        assert!(registry.close());
        assert!(!registry.close());
        registry.publish(changes());

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_closing_registry_stops_remaining_observers() {
        let registry = Arc::new(Registry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&registry);
        registry.register(
            Topic::Changes,
            Arc::new(move |_| {
                inner.close();
            }),
        );
        registry.register(Topic::Changes, counting(&count));

        registry.publish(changes());

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_from_another_thread_lets_running_observer_finish() {
        use std::sync::mpsc;

        let registry = Arc::new(Registry::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let finished = Arc::new(AtomicUsize::new(0));
        let later = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&finished);
        registry.register(
            Topic::Changes,
            Arc::new(move |_| {
                started_tx.send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
                done.fetch_add(1, Ordering::SeqCst);
            }),
        );
        registry.register(Topic::Changes, counting(&later));

        let publisher = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.publish(changes()))
        };
        started_rx.recv().unwrap();
        assert!(registry.close());
        release_tx.send(()).unwrap();
        publisher.join().unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }
}
