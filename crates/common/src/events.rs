//! Change notifications for the node tree
//!
//! The store publishes one [`Event`] per committed mutation. Delivery is a
//! synchronous fan-out to every subscriber registered at publish time, in
//! publish order. There is no backlog: a subscriber sees only what is
//! published after it subscribed.
//!
//! Subscribers come in two shapes: plain callbacks, and flume channels for
//! consumers that would rather pull events from an async task.

use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::SubscriberError;
use crate::path::PathKey;

/// The kind of object an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
    Directory,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::File => "file",
            ObjectType::Directory => "directory",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    /// The node now at `path` used to live at `from`
    Renamed { from: PathKey },
}

/// A structural change to the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    pub path: PathKey,
    pub object_type: ObjectType,
}

impl Event {
    pub fn created(path: PathKey, object_type: ObjectType) -> Self {
        Self {
            kind: EventKind::Created,
            path,
            object_type,
        }
    }

    pub fn modified(path: PathKey, object_type: ObjectType) -> Self {
        Self {
            kind: EventKind::Modified,
            path,
            object_type,
        }
    }

    pub fn deleted(path: PathKey, object_type: ObjectType) -> Self {
        Self {
            kind: EventKind::Deleted,
            path,
            object_type,
        }
    }

    pub fn renamed(from: PathKey, to: PathKey, object_type: ObjectType) -> Self {
        Self {
            kind: EventKind::Renamed { from },
            path: to,
            object_type,
        }
    }

    /// `"created"`, `"modified"`, `"deleted"` or `"renamed"`
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Renamed { .. } => "renamed",
        }
    }
}

/// Identifies a subscription so it can be cancelled later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

type Callback = dyn Fn(&Event) -> Result<(), String> + Send + Sync;

#[derive(Clone)]
enum Sink {
    Callback(Arc<Callback>),
    Channel(flume::Sender<Event>),
}

/// Observer list with synchronous, ordered fan-out
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(u64, Sink)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback that cannot fail
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(Sink::Callback(Arc::new(move |event: &Event| {
            callback(event);
            Ok(())
        })))
    }

    /// Register a callback whose errors are logged and otherwise ignored
    pub fn subscribe_fallible<F, E>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        self.add(Sink::Callback(Arc::new(move |event: &Event| {
            callback(event).map_err(|e| e.to_string())
        })))
    }

    /// Register an unbounded channel subscriber
    ///
    /// Dropping the receiver ends the subscription on the next publish.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        (self.add(Sink::Channel(tx)), rx)
    }

    /// Remove a subscription, returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != handle.0);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every current subscriber
    ///
    /// Never fails. Subscriber errors and panics are reported through
    /// `tracing` and do not stop delivery to the remaining subscribers.
    pub fn publish(&self, event: Event) {
        // Snapshot so callbacks may subscribe or unsubscribe while we deliver
        let subscribers: Vec<(u64, Sink)> = self.subscribers.read().clone();

        if subscribers.is_empty() {
            tracing::trace!(
                event_type = event.event_type(),
                path = %event.path,
                "no subscribers, dropping event"
            );
            return;
        }

        let mut disconnected = Vec::new();
        for (id, sink) in &subscribers {
            match sink {
                Sink::Callback(callback) => {
                    if let Err(e) = deliver(*id, callback.as_ref(), &event) {
                        tracing::warn!(
                            event_type = event.event_type(),
                            path = %event.path,
                            "{}",
                            e
                        );
                    }
                }
                Sink::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        disconnected.push(*id);
                    }
                }
            }
        }

        if !disconnected.is_empty() {
            tracing::debug!(count = disconnected.len(), "pruning closed event channels");
            self.subscribers
                .write()
                .retain(|(id, _)| !disconnected.contains(id));
        }
    }

    fn add(&self, sink: Sink) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, sink));
        tracing::debug!(subscription = id, "event subscriber registered");
        SubscriptionHandle(id)
    }
}

fn deliver(id: u64, callback: &Callback, event: &Event) -> Result<(), SubscriberError> {
    match catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(SubscriberError::Failed { id, message }),
        Err(payload) => Err(SubscriberError::Panicked {
            id,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn file_event(path: &str) -> Event {
        Event::created(PathKey::parse(path).unwrap(), ObjectType::File)
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(file_event("/a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_delivery_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe(move |event| sink.lock().push(event.path.to_string()));

        bus.publish(file_event("/a"));
        bus.publish(file_event("/b"));
        bus.publish(file_event("/c"));

        assert_eq!(*seen.lock(), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));

        bus.subscribe_fallible(|_| Err::<(), _>("boom"));
        bus.subscribe(|_| panic!("subscriber panic"));
        let sink = seen.clone();
        bus.subscribe(move |_| *sink.lock() += 1);

        bus.publish(file_event("/a"));
        bus.publish(file_event("/b"));

        assert_eq!(*seen.lock(), 2);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(file_event("/early"));

        let (_handle, rx) = bus.subscribe_channel();
        bus.publish(file_event("/late"));

        let received: Vec<Event> = rx.try_iter().collect();
        assert_eq!(received, vec![file_event("/late")]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));

        let sink = seen.clone();
        let handle = bus.subscribe(move |_| *sink.lock() += 1);
        bus.publish(file_event("/a"));

        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        bus.publish(file_event("/b"));

        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let bus = EventBus::new();
        let (_handle, rx) = bus.subscribe_channel();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.publish(file_event("/a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::renamed(
            PathKey::parse("/old").unwrap(),
            PathKey::parse("/new").unwrap(),
            ObjectType::Directory,
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "renamed");
        assert_eq!(json["from"], "/old");
        assert_eq!(json["path"], "/new");
        assert_eq!(json["object_type"], "directory");

        let created = serde_json::to_value(file_event("/f")).unwrap();
        assert_eq!(created["event_type"], "created");
        assert_eq!(created["object_type"], "file");
    }
}
