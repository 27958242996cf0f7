//! # Event Bus System
//!
//! Typed publish/subscribe built on `tokio::sync::broadcast`. Every producer
//! (one per collection backend) owns a clone of an [`EventBus`] and every
//! consumer holds an independent [`Receiver`] or a filtered [`EventStream`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit    ┌───────────┐  subscribe  ┌──────────────────┐
//! │ Backend (worker) ├──────────>│ EventBus  ├────────────>│ Collection model │
//! └──────────────────┘           │ (broadcast│             └──────────────────┘
//!                                │  channel) │  subscribe  ┌──────────────────┐
//!                                │           ├────────────>│ Error reporter   │
//!                                └───────────┘             └──────────────────┘
//! ```
//!
//! The bus is generic over the event type. Event enums implement
//! [`BusEvent`] so subscribers can log or filter them uniformly.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BusEvent, EventBus, EventSeverity};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Ping {
//!     Hello,
//! }
//!
//! impl BusEvent for Ping {
//!     fn description(&self) -> &str {
//!         "hello"
//!     }
//!
//!     fn severity(&self) -> EventSeverity {
//!         EventSeverity::Debug
//!     }
//! }
//!
//! let bus: EventBus<Ping> = EventBus::new(16);
//! let mut rx = bus.subscribe();
//! bus.emit(Ping::Hello).ok();
//! assert_eq!(rx.try_recv().unwrap(), Ping::Hello);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export for convenience
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

/// Common surface of every event type carried by an [`EventBus`].
pub trait BusEvent: Clone + Send + 'static {
    /// Human-readable description of the event.
    fn description(&self) -> &str;

    /// Severity used for filtering and log routing.
    fn severity(&self) -> EventSeverity;
}

/// Central broadcast channel.
///
/// - Cheap to clone (all clones share one channel)
/// - Past events are never replayed to new subscribers
/// - Slow subscribers get `RecvError::Lagged`
#[derive(Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: E) -> Result<usize, SendError<E>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber that receives all future events.
    pub fn subscribe(&self) -> Receiver<E> {
        self.sender.subscribe()
    }

    /// Creates a new [`EventStream`] over a fresh subscription.
    pub fn stream(&self) -> EventStream<E> {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream<E> {
    receiver: Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E: Clone> EventStream<E> {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<E, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<E, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl<E: BusEvent> EventStream<E> {
    /// Keeps only events at or above `min` severity.
    pub fn min_severity(self, min: EventSeverity) -> Self {
        self.filter(move |event: &E| event.severity() >= min)
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload")]
    enum TestEvent {
        Added { id: i64 },
        Removed { id: i64 },
        Failed { message: String },
    }

    impl BusEvent for TestEvent {
        fn description(&self) -> &str {
            match self {
                TestEvent::Added { .. } => "Item added",
                TestEvent::Removed { .. } => "Item removed",
                TestEvent::Failed { .. } => "Operation failed",
            }
        }

        fn severity(&self) -> EventSeverity {
            match self {
                TestEvent::Failed { .. } => EventSeverity::Error,
                _ => EventSeverity::Debug,
            }
        }
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus: EventBus<TestEvent> = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus: EventBus<TestEvent> = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(TestEvent::Added { id: 1 }).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = TestEvent::Removed { id: 7 };
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, TestEvent::Removed { .. }));

        bus.emit(TestEvent::Added { id: 1 }).ok();
        bus.emit(TestEvent::Removed { id: 2 }).ok();

        assert_eq!(stream.recv().await.unwrap(), TestEvent::Removed { id: 2 });
    }

    #[tokio::test]
    async fn test_event_stream_min_severity() {
        let bus = EventBus::new(10);
        let mut stream = bus.stream().min_severity(EventSeverity::Warning);

        bus.emit(TestEvent::Added { id: 1 }).ok();
        bus.emit(TestEvent::Failed {
            message: "boom".to_string(),
        })
        .ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received.description(), "Operation failed");
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for id in 0..5 {
            bus.emit(TestEvent::Added { id }).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        bus.emit(TestEvent::Added { id: worker * 10 + i }).ok();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let mut received = 0;
        while let Ok(_event) = sub.try_recv() {
            received += 1;
        }
        assert_eq!(received, 40);
    }

    #[test]
    fn test_event_serialization() {
        let event = TestEvent::Failed {
            message: "disk full".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Failed\""));

        let back: TestEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let mut stream = bus.stream();
        assert!(stream.try_recv().is_none());
    }
}
