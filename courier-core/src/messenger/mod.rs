//! Messenger: request/response correlation over a transport
//!
//! [`Messenger::invoke`] sends a payload and waits for the inbound message
//! that answers it. [`Messenger::on_message`] routes every inbound payload to
//! the listeners registered for it and to the pending invocation it answers.
//! Broadcast always runs before resolution.

mod builder;
mod options;

pub use builder::MessengerBuilder;
pub use options::{RequestOptions, Statistics};

use crate::config::MessengerConfig;
use crate::correlation::{CorrelationStore, PendingInfo, PendingRequest};
use crate::error::{Error, Result};
use crate::hooks::{ResolvedHooks, SendFn};
use crate::listeners::{Listener, ListenerOptions, ListenerRegistry};
use crate::message::{self, MessageType, REQUEST_ID_FIELD, SCOPE_FIELD};
use crate::store::RecordId;
use crate::transport::{MessageHandler, TransportPtr, Unsubscribe};
use crate::utils::{effective_timeout, preview};
use options::Counters;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

struct MessengerInner {
    config: MessengerConfig,
    hooks: ResolvedHooks,
    transport: Option<TransportPtr>,
    pending: CorrelationStore,
    listeners: ListenerRegistry,
    counters: Counters,
    activated: AtomicBool,
    subscription: Mutex<Option<Unsubscribe>>,
}

impl Drop for MessengerInner {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.subscription.get_mut().take() {
            unsubscribe.call();
        }
    }
}

/// A payload ready to send, with its routing keys
struct Prepared {
    message_type: MessageType,
    request_id: Option<String>,
    scope: Option<String>,
    payload: Value,
    send: SendFn,
}

/// Correlates requests and replies over one transport
///
/// Cloning is cheap; clones share the same stores and statistics.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

impl Messenger {
    /// Start configuring a messenger
    pub fn builder() -> MessengerBuilder {
        MessengerBuilder::new()
    }

    /// Messenger with the default configuration over `transport`
    pub fn new(transport: TransportPtr) -> Result<Self> {
        MessengerBuilder::new().transport(transport).build()
    }

    fn from_parts(
        config: MessengerConfig,
        hooks: ResolvedHooks,
        transport: Option<TransportPtr>,
    ) -> Self {
        Self {
            inner: Arc::new(MessengerInner {
                config,
                hooks,
                transport,
                pending: CorrelationStore::new(),
                listeners: ListenerRegistry::new(),
                counters: Counters::default(),
                activated: AtomicBool::new(false),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// The configuration this messenger was built with
    pub fn config(&self) -> &MessengerConfig {
        &self.inner.config
    }

    /// Send `payload` and wait for the reply that answers it
    ///
    /// Resolves with `None` for send-only calls. Fails with
    /// [`Error::Timeout`] when no reply arrives in time and no default
    /// response applies, and with [`Error::Cancelled`] when the pending
    /// invocation is cleared.
    pub async fn invoke(&self, payload: Value, options: RequestOptions) -> Result<Option<Value>> {
        let prepared = self.prepare(payload)?;

        if options.send_only {
            (prepared.send)(&prepared.payload, &options.transport_args)?;
            return Ok(None);
        }

        let inner = &self.inner;
        let timeout = effective_timeout(options.timeout, inner.config.timeout());
        let use_res_data_only = options
            .use_res_data_only
            .unwrap_or(inner.config.use_res_data_only);

        let (record, receiver) = PendingRequest::new(
            prepared.message_type.clone(),
            prepared.request_id.clone(),
            prepared.scope.clone(),
            prepared.payload.clone(),
            options.clone(),
            use_res_data_only,
        );
        let id = inner.pending.register(record);
        // Drops the record if the send fails or the caller stops polling.
        let guard = inner.pending.guard(prepared.message_type.clone(), id);

        (prepared.send)(&prepared.payload, &options.transport_args)?;

        let result = self
            .await_reply(prepared, id, receiver, timeout, options.default_res)
            .await;
        guard.disarm();
        result.map(Some)
    }

    /// Send `payload` without waiting for a reply
    ///
    /// `options` is treated as send-only; only `transport_args` matter.
    pub fn invoke_only(&self, payload: Value, options: RequestOptions) -> Result<()> {
        let prepared = self.prepare(payload)?;
        (prepared.send)(&prepared.payload, &options.transport_args)
    }

    fn prepare(&self, mut payload: Value) -> Result<Prepared> {
        let inner = &self.inner;
        inner.counters.record_total();

        let message_type =
            (inner.hooks.request_message_type)(&payload).ok_or(Error::MissingMessageType)?;
        let send = inner.hooks.send.clone().ok_or_else(|| {
            Error::Config("no send function: define a transport or a send hook".to_string())
        })?;

        let mut request_id = message::str_field(&payload, REQUEST_ID_FIELD);
        if !message::has_field(&payload, REQUEST_ID_FIELD) {
            if let (Some(id), Some(obj)) = ((inner.hooks.request_id)(&payload), payload.as_object_mut()) {
                obj.insert(REQUEST_ID_FIELD.to_string(), Value::String(id.clone()));
                request_id = Some(id);
            }
        }
        let scope = message::str_field(&payload, SCOPE_FIELD);

        Ok(Prepared {
            message_type,
            request_id,
            scope,
            payload,
            send,
        })
    }

    async fn await_reply(
        &self,
        prepared: Prepared,
        id: RecordId,
        mut receiver: oneshot::Receiver<Value>,
        timeout: Duration,
        default_res: Option<Value>,
    ) -> Result<Value> {
        let inner = &self.inner;
        let message_type = prepared.message_type;

        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(_)) => return Err(cancelled(&message_type)),
            Err(_) => {}
        }

        if inner.config.clear_timeout_req {
            if inner.pending.remove(&message_type, id).is_none() {
                // Routing already took the record; its reply is in flight.
                return receiver.await.map_err(|_| cancelled(&message_type));
            }
        } else if let Ok(reply) = receiver.try_recv() {
            return Ok(reply);
        }

        inner.counters.record_timeout();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if inner.config.enable_log {
            warn!(
                message_type = %message_type,
                request_id = ?prepared.request_id,
                timeout_ms,
                request = %preview(&prepared.payload),
                "Request timed out"
            );
        }

        match default_res {
            Some(default) if inner.config.enable_default_response => Ok(default),
            fallback => Err(Error::Timeout {
                message_type: message_type.to_string(),
                request_id: prepared.request_id,
                timeout_ms,
                fallback,
            }),
        }
    }

    /// Route one inbound payload
    ///
    /// Matching listeners get a copy first; then the pending invocation of
    /// the same type, scope and response id is settled with it.
    pub fn on_message(&self, payload: Value) {
        let inner = &self.inner;
        let hooks = &inner.hooks;

        let Some(message_type) = (hooks.response_message_type)(&payload) else {
            if inner.config.log_unhandled_event {
                warn!(payload = %preview(&payload), "Inbound message has no message type, dropping");
            }
            return;
        };
        let response_id = (hooks.response_id)(&payload);
        let scope = (hooks.response_scope)(&payload);
        let payload = (hooks.on_response)(&message_type, payload);

        let has_listeners = inner.listeners.has(&message_type, scope.as_deref());
        if has_listeners {
            let heard = inner.listeners.emit(&message_type, &payload, scope.as_deref());
            debug!(message_type = %message_type, listeners = heard, "Broadcast inbound message");
        }

        let Some(record) = inner
            .pending
            .take(&message_type, scope.as_deref(), response_id.as_deref())
        else {
            if !has_listeners && inner.config.log_unhandled_event {
                warn!(
                    message_type = %message_type,
                    response_id = ?response_id,
                    scope = ?scope,
                    "Unhandled inbound message"
                );
            }
            return;
        };

        inner.counters.record_success();
        let reply = if record.use_res_data_only {
            message::data_of(payload)
        } else {
            payload
        };
        if !record.complete(reply) {
            debug!(message_type = %message_type, "Reply arrived after the caller stopped waiting");
        }
    }

    /// Register a broadcast listener
    ///
    /// Returns false when the same callback is already registered for the
    /// same scope.
    pub fn add_listener(
        &self,
        message_type: impl Into<MessageType>,
        listener: Listener,
        options: ListenerOptions,
    ) -> bool {
        self.inner.listeners.on(message_type, listener, options)
    }

    /// Unregister a listener added with the same callback and scope
    pub fn remove_listener(
        &self,
        message_type: impl Into<MessageType>,
        listener: &Listener,
        options: ListenerOptions,
    ) -> bool {
        self.inner.listeners.off(message_type, listener, options)
    }

    /// Whether a message of `(message_type, scope)` would reach a listener
    pub fn has_listener(&self, message_type: impl Into<MessageType>, scope: Option<&str>) -> bool {
        self.inner.listeners.has(&message_type.into(), scope)
    }

    /// Subscribe to the transport's inbound messages
    ///
    /// Activating twice is a no-op. Fails when there is no transport.
    pub fn activate(&self) -> Result<()> {
        let inner = &self.inner;
        let transport = inner.transport.as_ref().ok_or_else(|| {
            Error::Config("cannot activate a messenger without a transport".to_string())
        })?;

        if inner
            .activated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Messenger already activated");
            return Ok(());
        }

        // The transport holds a weak handle so it never keeps the messenger alive.
        let weak = Arc::downgrade(&self.inner);
        let handler: MessageHandler = Arc::new(move |payload: Value| {
            if let Some(inner) = weak.upgrade() {
                Messenger { inner }.on_message(payload);
            }
        });

        match transport.subscribe(handler) {
            Ok(unsubscribe) => {
                *inner.subscription.lock() = Some(unsubscribe);
                info!("Messenger activated");
                Ok(())
            }
            Err(e) => {
                inner.activated.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Unsubscribe from the transport; safe when not active
    pub fn deactivate(&self) {
        let inner = &self.inner;
        let unsubscribe = inner.subscription.lock().take();
        inner.activated.store(false, Ordering::Release);
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe.call();
            info!("Messenger deactivated");
        }
    }

    /// Whether the transport subscription is live
    pub fn is_activated(&self) -> bool {
        self.inner.activated.load(Ordering::Acquire)
    }

    /// Snapshot of the counters
    pub fn statistics(&self) -> Statistics {
        self.inner.counters.snapshot()
    }

    /// Drop every pending invocation and every listener
    ///
    /// Pending callers fail with [`Error::Cancelled`]. Statistics are kept.
    pub fn clear(&self) {
        self.inner.pending.clear();
        self.inner.listeners.clear();
    }

    /// Number of invocations waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Diagnostic view of the pending invocations, oldest first
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        self.inner.pending.snapshot()
    }
}

fn cancelled(message_type: &MessageType) -> Error {
    Error::Cancelled(format!("{} was dropped before a reply arrived", message_type))
}
