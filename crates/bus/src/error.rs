use thiserror::Error;

/// Errors that can occur in the message-bus layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("not connected to the message bus")]
    NotConnected,

    #[error("connect error: {0}")]
    Connect(String),

    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("stream setup error: {0}")]
    Stream(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("receive error: {0}")]
    Receive(String),

    #[error("ack error: {0}")]
    Ack(String),
}
