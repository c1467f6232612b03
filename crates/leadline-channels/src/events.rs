//! In-process event bus between the channel layer and its consumers
//! (persistence writer, AI-analysis trigger, notification dispatcher).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::message::Message;

/// Boxed error a subscriber may return; it is logged and dropped.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Events published by the channel manager.
///
/// Serializes as `{"type": "message.received", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    #[serde(rename = "message.received")]
    MessageReceived(Message),
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::MessageReceived(_) => "message.received",
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            ChannelEvent::MessageReceived(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            ChannelEvent::MessageReceived(m) => m,
        }
    }
}

/// Synchronous subscriber. Runs on the webhook request path, so slow work
/// (database writes, LLM calls) belongs behind a queue such as
/// [`QueueSubscriber`].
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &ChannelEvent) -> Result<(), SubscriberError>;
}

struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&ChannelEvent) -> Result<(), SubscriberError> + Send + Sync,
{
    fn handle(&self, event: &ChannelEvent) -> Result<(), SubscriberError> {
        (self.0)(event)
    }
}

struct Subscription {
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// Per-emit tally, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered list of named subscribers.
///
/// Emission walks subscribers in registration order. Each call is isolated:
/// an `Err` or a panic from one subscriber is logged and the walk continues.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. A subscriber with the same name is replaced in place,
    /// keeping its original position.
    pub fn subscribe(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let name = name.into();
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match subs.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.handler = handler,
            None => subs.push(Subscription {
                name: name.clone(),
                handler,
            }),
        }
        info!(subscriber = %name, "event subscriber registered");
    }

    /// Closure form of [`subscribe`](Self::subscribe).
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&ChannelEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(FnHandler(f)));
    }

    /// Remove a subscriber by name. Returns false if none matched.
    pub fn unsubscribe(&self, name: &str) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.name != name);
        let removed = subs.len() < before;
        if removed {
            info!(subscriber = name, "event subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscriber, in order.
    pub fn emit(&self, event: &ChannelEvent) -> EmitReport {
        // Snapshot the handlers so a subscriber may (un)subscribe from inside
        // its own callback without deadlocking on the registry lock.
        let snapshot: Vec<(String, Arc<dyn EventHandler>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| (s.name.clone(), Arc::clone(&s.handler)))
            .collect();

        let mut report = EmitReport::default();
        for (name, handler) in snapshot {
            let t = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            let elapsed_ms = t.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    debug!(subscriber = %name, event = event.name(), duration_ms = elapsed_ms, "subscriber completed");
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(subscriber = %name, event = event.name(), error = %e, "subscriber failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(subscriber = %name, event = event.name(), "subscriber panicked");
                }
            }
        }
        report
    }
}

/// Subscriber that hands each event to a bounded queue and returns at once.
///
/// The consumer drains the receiver on its own task. A full or closed queue
/// counts as this subscriber failing; the webhook path never waits on it.
pub struct QueueSubscriber {
    tx: mpsc::Sender<ChannelEvent>,
}

impl QueueSubscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventHandler for QueueSubscriber {
    fn handle(&self, event: &ChannelEvent) -> Result<(), SubscriberError> {
        self.tx
            .try_send(event.clone())
            .map_err(|e| format!("event queue rejected {}: {}", event.name(), e).into())
    }
}
