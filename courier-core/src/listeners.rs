//! Listener registry for broadcast fan-out
//!
//! Listeners are persistent callbacks keyed by message type and optional
//! scope. A listener registered without a scope hears every scope of its
//! type. `emit` snapshots the matching listeners before running any of
//! them, so a listener may add or remove listeners (itself included) while
//! a pass is in flight without affecting that pass.

use crate::message::MessageType;
use crate::store::{DataStore, FindOptions, Record, ScopeMatch};
use crate::utils::non_blank;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Execution context handed to a listener on every call
pub type ListenerContext = Arc<dyn Any + Send + Sync>;

type ListenerFn = dyn Fn(Value, Option<&ListenerContext>) + Send + Sync;

/// Shared handle to a listener callback, compared by identity
#[derive(Clone)]
pub struct Listener {
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Wrap a callback receiving the payload and the bound context
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Value, Option<&ListenerContext>) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Wrap a callback that ignores the context
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self::new(move |payload, _| callback(payload))
    }

    /// Whether both handles point at the same callback
    pub fn ptr_eq(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    fn call(&self, payload: Value, context: Option<&ListenerContext>) {
        (self.callback)(payload, context)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.callback))
    }
}

/// Registration options
#[derive(Clone, Default)]
pub struct ListenerOptions {
    /// Only hear messages of this scope
    pub scope: Option<String>,
    /// Context passed to the callback
    pub context: Option<ListenerContext>,
}

impl ListenerOptions {
    /// Options restricted to one scope
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            context: None,
        }
    }

    /// Attach a context
    pub fn with_context(mut self, context: ListenerContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// A registered listener
#[derive(Clone)]
pub struct ListenerRecord {
    pub message_type: MessageType,
    pub scope: Option<String>,
    pub callback: Listener,
    pub context: Option<ListenerContext>,
}

impl Record for ListenerRecord {
    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.callback.ptr_eq(&other.callback) && self.scope == other.scope
    }

    fn normalize(&mut self) {
        self.scope = non_blank(self.scope.take());
    }
}

/// Thread-safe registry of broadcast listeners
pub struct ListenerRegistry {
    records: Mutex<DataStore<ListenerRecord>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: Mutex::new(DataStore::with_scope_match(ScopeMatch::UnscopedIsWildcard)),
        }
    }

    /// Register a listener; the same callback twice for one scope is ignored
    pub fn on(
        &self,
        message_type: impl Into<MessageType>,
        listener: Listener,
        options: ListenerOptions,
    ) -> bool {
        let message_type = message_type.into();
        let record = ListenerRecord {
            message_type: message_type.clone(),
            scope: non_blank(options.scope),
            callback: listener,
            context: options.context,
        };

        let mut records = self.records.lock();
        let duplicate = records
            .get(&message_type, &FindOptions::default())
            .into_iter()
            .any(|(_, existing)| existing.same_as(&record));
        if duplicate {
            drop(records);
            warn!(
                message_type = %message_type,
                scope = ?record.scope,
                "Listener already registered, ignoring duplicate"
            );
            return false;
        }

        records.add(message_type.clone(), record);
        debug!(message_type = %message_type, "Listener added");
        true
    }

    /// Unregister a listener registered with the same callback and scope
    pub fn off(&self, message_type: impl Into<MessageType>, listener: &Listener, options: ListenerOptions) -> bool {
        let message_type = message_type.into();
        let target = ListenerRecord {
            message_type: message_type.clone(),
            scope: non_blank(options.scope),
            callback: listener.clone(),
            context: None,
        };
        let removed = self.records.lock().remove_record(&message_type, &target);
        debug!(message_type = %message_type, removed = removed.is_some(), "Listener removed");
        removed.is_some()
    }

    /// Whether any listener hears `(message_type, scope)`
    pub fn has(&self, message_type: &MessageType, scope: Option<&str>) -> bool {
        self.records.lock().has(message_type, &FindOptions::scope(scope))
    }

    /// Invoke every matching listener with its own copy of `data`
    ///
    /// Returns the number of listeners invoked. A panicking listener is
    /// logged and does not stop the others.
    pub fn emit(&self, message_type: &MessageType, data: &Value, scope: Option<&str>) -> usize {
        let snapshot: Vec<ListenerRecord> = self
            .records
            .lock()
            .get(message_type, &FindOptions::scope(scope))
            .into_iter()
            .map(|(_, record)| record.clone())
            .collect();

        for record in &snapshot {
            let payload = data.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                record.callback.call(payload, record.context.as_ref())
            }));
            if outcome.is_err() {
                error!(
                    message_type = %message_type,
                    listener = ?record.callback,
                    "Listener panicked during dispatch"
                );
            }
        }

        snapshot.len()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop every listener
    pub fn clear(&self) {
        let drained = self.records.lock().drain();
        drop(drained);
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
