//! Per-call options and messenger statistics

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Options of one `invoke` call
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the configured timeout when non-zero
    pub timeout: Option<Duration>,
    /// Send without waiting for a reply
    pub send_only: bool,
    /// Resolution value used when the request times out
    pub default_res: Option<Value>,
    /// Overrides the configured `use_res_data_only`
    pub use_res_data_only: Option<bool>,
    /// Extra arguments handed to the transport's `send`
    pub transport_args: Vec<Value>,
}

impl RequestOptions {
    /// Options of a fire-and-forget send
    pub fn send_only() -> Self {
        Self {
            send_only: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_default_res(mut self, default_res: Value) -> Self {
        self.default_res = Some(default_res);
        self
    }

    pub fn with_use_res_data_only(mut self, data_only: bool) -> Self {
        self.use_res_data_only = Some(data_only);
        self
    }

    pub fn with_transport_args(mut self, args: Vec<Value>) -> Self {
        self.transport_args = args;
        self
    }
}

/// Snapshot of a messenger's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Invocations issued, send-only included
    pub total: u64,
    /// Replies matched to a pending invocation
    pub success: u64,
    /// Invocations that timed out
    pub timeout: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    timeout: AtomicU64,
}

impl Counters {
    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
        }
    }
}
