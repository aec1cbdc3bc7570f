//! Extension hooks of the messenger
//!
//! Every hook is optional. [`Hooks::resolve`] runs once when the messenger is
//! built and fills each missing hook with the built-in behavior, so the hot
//! paths never branch on "is there an override".

use crate::config::MessengerConfig;
use crate::message::{self, MessageType, RESPONSE_ID_FIELD, SCOPE_FIELD};
use crate::transport::TransportPtr;
use crate::utils::generate_request_id;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

/// Extracts a message type from a payload
pub type MessageTypeFn = Arc<dyn Fn(&Value) -> Option<MessageType> + Send + Sync>;
/// Extracts an optional string field from a payload
pub type FieldFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;
/// Post-processes an inbound payload before routing
pub type ResponseFn = Arc<dyn Fn(&MessageType, Value) -> Value + Send + Sync>;
/// Sends one outbound payload
pub type SendFn = Arc<dyn Fn(&Value, &[Value]) -> crate::Result<()> + Send + Sync>;

/// Optional overrides of the messenger's behavior
#[derive(Clone, Default)]
pub struct Hooks {
    /// Message type of an outgoing request
    pub request_message_type: Option<MessageTypeFn>,
    /// Message type of an inbound message
    pub response_message_type: Option<MessageTypeFn>,
    /// Correlation id carried by an inbound message
    pub response_id: Option<FieldFn>,
    /// Scope carried by an inbound message
    pub response_scope: Option<FieldFn>,
    /// Id assigned to a request that has none
    pub request_id: Option<FieldFn>,
    /// Inbound payload post-processing
    pub on_response: Option<ResponseFn>,
    /// Outbound send, used instead of the transport's
    pub send: Option<SendFn>,
}

impl Hooks {
    pub fn with_request_message_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<MessageType> + Send + Sync + 'static,
    {
        self.request_message_type = Some(Arc::new(f));
        self
    }

    pub fn with_response_message_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<MessageType> + Send + Sync + 'static,
    {
        self.response_message_type = Some(Arc::new(f));
        self
    }

    pub fn with_response_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.response_id = Some(Arc::new(f));
        self
    }

    pub fn with_response_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.response_scope = Some(Arc::new(f));
        self
    }

    pub fn with_request_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.request_id = Some(Arc::new(f));
        self
    }

    pub fn with_on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&MessageType, Value) -> Value + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(f));
        self
    }

    pub fn with_send<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.send = Some(Arc::new(f));
        self
    }

    /// Fill every missing hook with its default
    pub(crate) fn resolve(self, config: &MessengerConfig, transport: Option<&TransportPtr>) -> ResolvedHooks {
        let auto_id = config.auto_generate_request_id;

        let send = self.send.or_else(|| {
            transport.map(|transport| {
                let transport = transport.clone();
                Arc::new(move |payload: &Value, args: &[Value]| transport.send(payload, args)) as SendFn
            })
        });
        if send.is_none() {
            error!("send lookup failed: define a transport or a send hook");
        }

        ResolvedHooks {
            request_message_type: self
                .request_message_type
                .unwrap_or_else(|| Arc::new(message::message_type_of) as MessageTypeFn),
            response_message_type: self
                .response_message_type
                .unwrap_or_else(|| Arc::new(message::message_type_of) as MessageTypeFn),
            response_id: self.response_id.unwrap_or_else(|| {
                Arc::new(|payload: &Value| message::str_field(payload, RESPONSE_ID_FIELD)) as FieldFn
            }),
            response_scope: self.response_scope.unwrap_or_else(|| {
                Arc::new(|payload: &Value| message::str_field(payload, SCOPE_FIELD)) as FieldFn
            }),
            request_id: self.request_id.unwrap_or_else(|| {
                Arc::new(move |_: &Value| if auto_id { Some(generate_request_id()) } else { None })
                    as FieldFn
            }),
            on_response: self.on_response.unwrap_or_else(|| {
                Arc::new(|_: &MessageType, payload: Value| payload) as ResponseFn
            }),
            send,
        }
    }
}

/// Hook table with every default filled in
pub(crate) struct ResolvedHooks {
    pub request_message_type: MessageTypeFn,
    pub response_message_type: MessageTypeFn,
    pub response_id: FieldFn,
    pub response_scope: FieldFn,
    pub request_id: FieldFn,
    pub on_response: ResponseFn,
    pub send: Option<SendFn>,
}
