//! Messenger construction

use super::Messenger;
use crate::config::MessengerConfig;
use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::listeners::{Listener, ListenerOptions};
use crate::message::MessageType;
use crate::transport::TransportPtr;
use crate::utils::non_blank;
use std::collections::HashSet;
use tracing::warn;

struct Binding {
    message_type: MessageType,
    listener: Listener,
    options: ListenerOptions,
}

/// Builder for [`Messenger`]
#[derive(Default)]
pub struct MessengerBuilder {
    config: MessengerConfig,
    transport: Option<TransportPtr>,
    hooks: Hooks,
    bindings: Vec<Binding>,
}

impl MessengerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: MessengerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Queue a listener registered when the messenger is built
    ///
    /// Only the first binding of a `(message_type, scope)` pair is kept.
    pub fn bind_listener(
        mut self,
        message_type: impl Into<MessageType>,
        listener: Listener,
        options: ListenerOptions,
    ) -> Self {
        self.bindings.push(Binding {
            message_type: message_type.into(),
            listener,
            options,
        });
        self
    }

    /// Resolve hooks, register bindings and activate when `auto_active` is set
    pub fn build(self) -> Result<Messenger> {
        if self.config.timeout_ms == 0 {
            return Err(Error::Validation(
                "messenger.timeout_ms must be > 0".to_string(),
            ));
        }

        let hooks = self.hooks.resolve(&self.config, self.transport.as_ref());
        let auto_active = self.config.auto_active;
        let messenger = Messenger::from_parts(self.config, hooks, self.transport);

        let mut bound: HashSet<(MessageType, Option<String>)> = HashSet::new();
        for binding in self.bindings {
            let key = (
                binding.message_type.clone(),
                non_blank(binding.options.scope.clone()),
            );
            if !bound.insert(key) {
                warn!(
                    message_type = %binding.message_type,
                    scope = ?binding.options.scope,
                    "Listener binding already bound, skipping"
                );
                continue;
            }
            messenger.add_listener(binding.message_type, binding.listener, binding.options);
        }

        if auto_active {
            messenger.activate()?;
        }
        Ok(messenger)
    }
}
