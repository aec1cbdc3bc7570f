//! Transport adapters for courier
//!
//! Each adapter implements [`courier_core::Transport`] over a concrete
//! channel and the [`Channel`] lifecycle on top of it.

pub mod base;
pub mod bus;
pub mod websocket;

pub use base::{Channel, ChannelError, Result};
pub use bus::{BusTransport, EventBus, SubscriptionId};
pub use websocket::{WebSocketConfig, WebSocketTransport};
