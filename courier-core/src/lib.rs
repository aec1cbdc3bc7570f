//! Core types for courier
//!
//! Request/response correlation and listener fan-out over any bidirectional
//! message channel. Transports implement [`transport::Transport`]; the
//! [`Messenger`] does the rest.

pub mod config;
pub mod correlation;
pub mod error;
pub mod hooks;
pub mod listeners;
pub mod logging;
pub mod message;
pub mod messenger;
pub mod store;
pub mod transport;
pub mod utils;

pub use error::{Error, Result};
pub use hooks::Hooks;
pub use listeners::{Listener, ListenerContext, ListenerOptions};
pub use message::{MessageType, Symbol};
pub use messenger::{Messenger, MessengerBuilder, RequestOptions, Statistics};
pub use transport::{MessageHandler, Transport, TransportPtr, Unsubscribe};
