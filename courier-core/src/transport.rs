//! Transport adapter contract
//!
//! A transport moves payloads over a real channel. The messenger only needs
//! two synchronous hand-offs from it: register an inbound handler, and send
//! one outbound payload.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Inbound entry point handed to [`Transport::subscribe`]
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Disposer returned by [`Transport::subscribe`]
pub struct Unsubscribe {
    dispose: Box<dyn FnOnce() + Send>,
}

impl Unsubscribe {
    /// Wrap a disposer closure
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            dispose: Box::new(dispose),
        }
    }

    /// A disposer that does nothing
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Run the disposer
    pub fn call(self) {
        (self.dispose)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Trait for transport adapters
pub trait Transport: Send + Sync {
    /// Register the inbound handler with the real channel
    fn subscribe(&self, handler: MessageHandler) -> crate::Result<Unsubscribe>;

    /// Transmit one outbound payload; `args` are transport-specific extras
    fn send(&self, payload: &Value, args: &[Value]) -> crate::Result<()>;
}

/// Shared transport type
pub type TransportPtr = Arc<dyn Transport>;
