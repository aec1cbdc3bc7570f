//! Correlation store: pending invocations waiting for their reply
//!
//! Each [`PendingRequest`] owns the oneshot sender of one `invoke` call. The
//! routing path and the timeout path both try to remove the record; whoever
//! removes it decides the outcome, so a reply is delivered at most once.

use crate::message::MessageType;
use crate::messenger::RequestOptions;
use crate::store::{DataStore, FindOptions, Record, RecordId};
use crate::utils::non_blank;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// A pending invocation
pub struct PendingRequest {
    /// Routing key the reply must carry
    pub message_type: MessageType,
    /// Correlation id the reply must echo as `responseId`
    pub request_id: Option<String>,
    /// Logical peer the request was addressed to
    pub scope: Option<String>,
    /// The payload as it was sent
    pub request_data: Value,
    /// Options of the original call
    pub request_options: RequestOptions,
    /// Creation time
    pub request_time: DateTime<Utc>,
    /// Narrow the reply to its `data` field
    pub use_res_data_only: bool,
    sender: oneshot::Sender<Value>,
}

impl PendingRequest {
    /// Create a record and the receiver its reply will arrive on
    pub fn new(
        message_type: MessageType,
        request_id: Option<String>,
        scope: Option<String>,
        request_data: Value,
        request_options: RequestOptions,
        use_res_data_only: bool,
    ) -> (Self, oneshot::Receiver<Value>) {
        let (sender, receiver) = oneshot::channel();
        let record = Self {
            message_type,
            request_id,
            scope,
            request_data,
            request_options,
            request_time: Utc::now(),
            use_res_data_only,
            sender,
        };
        (record, receiver)
    }

    /// Deliver the reply; returns false when the caller stopped waiting
    pub fn complete(self, value: Value) -> bool {
        self.sender.send(value).is_ok()
    }

    /// Whether the caller dropped its receiver
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }

    fn info(&self) -> PendingInfo {
        PendingInfo {
            message_type: self.message_type.to_string(),
            request_id: self.request_id.clone(),
            scope: self.scope.clone(),
            request_time: self.request_time,
        }
    }
}

impl Record for PendingRequest {
    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.request_id.is_some() && self.request_id == other.request_id && self.scope == other.scope
    }

    fn normalize(&mut self) {
        self.scope = non_blank(self.scope.take());
        self.request_id = non_blank(self.request_id.take());
    }
}

/// Diagnostic view of a pending invocation
#[derive(Debug, Clone, Serialize)]
pub struct PendingInfo {
    pub message_type: String,
    pub request_id: Option<String>,
    pub scope: Option<String>,
    pub request_time: DateTime<Utc>,
}

/// Thread-safe store of pending invocations
pub struct CorrelationStore {
    records: Mutex<DataStore<PendingRequest>>,
}

impl CorrelationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: Mutex::new(DataStore::new()),
        }
    }

    /// Register a pending invocation
    pub fn register(&self, record: PendingRequest) -> RecordId {
        let message_type = record.message_type.clone();
        let id = self.records.lock().add(message_type.clone(), record);
        debug!(message_type = %message_type, record = ?id, "Registered pending request");
        id
    }

    /// Remove and return the first live invocation a reply answers
    ///
    /// Matching records whose caller stopped waiting are discarded on the way.
    pub fn take(
        &self,
        message_type: &MessageType,
        scope: Option<&str>,
        response_id: Option<&str>,
    ) -> Option<PendingRequest> {
        let options = FindOptions::scope(scope).with_request_id(response_id);
        let mut records = self.records.lock();
        while let Some(record) = records.remove_one_by_options(message_type, &options) {
            if !record.is_abandoned() {
                return Some(record);
            }
            debug!(message_type = %message_type, "Discarded abandoned pending request");
        }
        None
    }

    /// Guard that removes the record `id` when dropped, unless disarmed
    pub fn guard(&self, message_type: MessageType, id: RecordId) -> PendingGuard<'_> {
        PendingGuard {
            store: self,
            message_type,
            id: Some(id),
        }
    }

    /// Remove one invocation by identity
    pub fn remove(&self, message_type: &MessageType, id: RecordId) -> Option<PendingRequest> {
        self.records.lock().remove(message_type, id)
    }

    /// Whether an invocation of `message_type` matches the filters
    pub fn contains(
        &self,
        message_type: &MessageType,
        scope: Option<&str>,
        request_id: Option<&str>,
    ) -> bool {
        let options = FindOptions::scope(scope).with_request_id(request_id);
        self.records.lock().has(message_type, &options)
    }

    /// Number of pending invocations
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of every pending invocation, oldest first
    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let records = self.records.lock();
        let mut pending: Vec<(RecordId, PendingInfo)> = records
            .iter()
            .map(|(_, id, record)| (id, record.info()))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending.into_iter().map(|(_, info)| info).collect()
    }

    /// Drop every pending invocation; their callers see a cancellation
    pub fn clear(&self) {
        // Senders are dropped outside the lock.
        let drained = self.records.lock().drain();
        drop(drained);
    }
}

/// Removes a pending invocation whose caller stops waiting before it settles
pub struct PendingGuard<'a> {
    store: &'a CorrelationStore,
    message_type: MessageType,
    id: Option<RecordId>,
}

impl PendingGuard<'_> {
    /// The invocation settled; leave the store as it is
    pub fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if self.store.remove(&self.message_type, id).is_some() {
                debug!(message_type = %self.message_type, record = ?id, "Removed abandoned pending request");
            }
        }
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(
        message_type: &str,
        scope: Option<&str>,
        request_id: Option<&str>,
    ) -> (PendingRequest, oneshot::Receiver<Value>) {
        PendingRequest::new(
            MessageType::from(message_type),
            request_id.map(ToString::to_string),
            scope.map(ToString::to_string),
            json!({"method": message_type}),
            RequestOptions::default(),
            false,
        )
    }

    #[test]
    fn test_take_matches_request_id() {
        let store = CorrelationStore::new();
        let (a, _rx_a) = pending("ping", None, Some("a"));
        let (b, mut rx_b) = pending("ping", None, Some("b"));
        store.register(a);
        store.register(b);

        let ping = MessageType::from("ping");
        let taken = store.take(&ping, None, Some("b")).unwrap();
        assert_eq!(taken.request_id.as_deref(), Some("b"));
        assert!(taken.complete(json!({"ok": true})));
        assert_eq!(rx_b.try_recv().unwrap(), json!({"ok": true}));
        assert_eq!(store.len(), 1);
        assert!(store.take(&ping, None, Some("b")).is_none());
    }

    #[test]
    fn test_take_matches_scope() {
        let store = CorrelationStore::new();
        let (left, _rx_left) = pending("ping", Some("left"), None);
        let (right, _rx_right) = pending("ping", Some("right"), None);
        store.register(left);
        store.register(right);

        let ping = MessageType::from("ping");
        let taken = store.take(&ping, Some("right"), None).unwrap();
        assert_eq!(taken.scope.as_deref(), Some("right"));
        assert!(store.contains(&ping, Some("left"), None));
        assert!(!store.contains(&ping, Some("right"), None));
    }

    #[test]
    fn test_remove_by_identity() {
        let store = CorrelationStore::new();
        let (record, _rx) = pending("ping", None, None);
        let ping = MessageType::from("ping");
        let id = store.register(record);

        assert!(store.remove(&ping, id).is_some());
        assert!(store.remove(&ping, id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_complete_after_receiver_dropped() {
        let (record, rx) = pending("ping", None, None);
        drop(rx);
        assert!(!record.complete(json!(1)));
    }

    #[test]
    fn test_clear_cancels_waiters() {
        let store = CorrelationStore::new();
        let (record, mut rx) = pending("ping", None, None);
        store.register(record);
        store.clear();

        assert!(store.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_take_skips_abandoned_records() {
        let store = CorrelationStore::new();
        let (stale, stale_rx) = pending("ping", None, None);
        let (live, mut live_rx) = pending("ping", None, None);
        store.register(stale);
        store.register(live);
        drop(stale_rx);

        let taken = store.take(&MessageType::from("ping"), None, None).unwrap();
        assert!(taken.complete(json!("pong")));
        assert_eq!(live_rx.try_recv().unwrap(), json!("pong"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_guard_removes_unless_disarmed() {
        let store = CorrelationStore::new();
        let ping = MessageType::from("ping");
        let (dropped, _rx_dropped) = pending("ping", None, Some("1"));
        let (settled, _rx_settled) = pending("ping", None, Some("2"));
        let dropped_id = store.register(dropped);
        let settled_id = store.register(settled);

        drop(store.guard(ping.clone(), dropped_id));
        store.guard(ping.clone(), settled_id).disarm();

        assert!(!store.contains(&ping, None, Some("1")));
        assert!(store.contains(&ping, None, Some("2")));
    }

    #[test]
    fn test_snapshot_is_oldest_first() {
        let store = CorrelationStore::new();
        let (a, _rx_a) = pending("ping", None, Some("1"));
        let (b, _rx_b) = pending("pong", Some("left"), Some("2"));
        store.register(a);
        store.register(b);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].request_id.as_deref(), Some("1"));
        assert_eq!(snapshot[1].message_type, "pong");
        assert_eq!(snapshot[1].scope.as_deref(), Some("left"));
    }
}
