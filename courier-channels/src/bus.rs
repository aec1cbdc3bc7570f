//! In-process event bus and the transport that rides on it
//!
//! [`EventBus`] delivers every published payload synchronously to the
//! subscribers of its topic. [`BusTransport`] publishes requests on one topic
//! and listens for replies on another, so a peer living in the same process
//! only needs the bus to talk to a messenger.

use async_trait::async_trait;
use courier_core::{MessageHandler, Transport, Unsubscribe};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::base::{Channel, ChannelError};

/// Default topic carrying messages towards the messenger
pub const INBOUND_TOPIC: &str = "message";
/// Default topic carrying the messenger's requests
pub const OUTBOUND_TOPIC: &str = "message-request";

/// Subscriber callback
pub type BusCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, BusCallback)>>>,
    next_id: AtomicU64,
}

/// In-process publish/subscribe bus keyed by topic
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: BusCallback = Arc::new(callback);
        self.inner
            .subscribers
            .lock()
            .entry(topic.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a subscription; returns false when it was already gone
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let Some(callbacks) = subscribers.get_mut(topic) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            subscribers.remove(topic);
        }
        removed
    }

    /// Deliver `payload` to every subscriber of `topic`
    ///
    /// Returns the number of subscribers reached. Callbacks run outside the
    /// bus lock and may publish or subscribe themselves.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let callbacks: Vec<BusCallback> = match self.inner.subscribers.lock().get(topic) {
            Some(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
            None => {
                debug!("No subscribers for topic: {}", topic);
                return 0;
            }
        };

        for callback in &callbacks {
            callback(payload.clone());
        }
        callbacks.len()
    }

    /// Number of subscribers of a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Transport over an [`EventBus`]
pub struct BusTransport {
    bus: EventBus,
    inbound_topic: String,
    outbound_topic: String,
    running: Arc<AtomicBool>,
}

impl BusTransport {
    /// Transport on the default `message` / `message-request` topics
    pub fn new(bus: EventBus) -> Self {
        Self::with_topics(bus, INBOUND_TOPIC, OUTBOUND_TOPIC)
    }

    /// Transport on custom topics
    pub fn with_topics(
        bus: EventBus,
        inbound_topic: impl Into<String>,
        outbound_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            inbound_topic: inbound_topic.into(),
            outbound_topic: outbound_topic.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The bus this transport publishes on
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl Transport for BusTransport {
    fn subscribe(&self, handler: MessageHandler) -> courier_core::Result<Unsubscribe> {
        let running = self.running.clone();
        let id = self.bus.subscribe(self.inbound_topic.clone(), move |payload| {
            if running.load(Ordering::Acquire) {
                handler(payload);
            }
        });

        let bus = self.bus.clone();
        let topic = self.inbound_topic.clone();
        Ok(Unsubscribe::new(move || {
            bus.unsubscribe(&topic, id);
        }))
    }

    fn send(&self, payload: &Value, _args: &[Value]) -> courier_core::Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ChannelError::NotRunning("event bus transport is stopped".to_string()).into());
        }
        self.bus.publish(&self.outbound_topic, payload.clone());
        Ok(())
    }
}

#[async_trait]
impl Channel for BusTransport {
    fn name(&self) -> &str {
        "bus"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn start(&self) -> crate::Result<()> {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!(
                inbound = %self.inbound_topic,
                outbound = %self.outbound_topic,
                "Event bus transport started"
            );
        }
        Ok(())
    }

    async fn stop(&self) -> crate::Result<()> {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("Event bus transport stopped");
        }
        Ok(())
    }
}
