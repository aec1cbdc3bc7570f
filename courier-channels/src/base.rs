//! Shared lifecycle trait and errors of the transport adapters

use async_trait::async_trait;
use courier_core::Transport;

/// Lifecycle of a transport backed by a real channel
#[async_trait]
pub trait Channel: Transport {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Check if the channel is running
    fn is_running(&self) -> bool;

    /// Start moving messages
    async fn start(&self) -> Result<()>;

    /// Stop moving messages; pending outbound messages are dropped
    async fn stop(&self) -> Result<()>;
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel error: {0}")]
    Error(String),

    #[error("Channel not running: {0}")]
    NotRunning(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send error: {0}")]
    SendError(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<ChannelError> for courier_core::Error {
    fn from(e: ChannelError) -> Self {
        courier_core::Error::Transport(e.to_string())
    }
}
