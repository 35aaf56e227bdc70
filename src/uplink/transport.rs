//! Transport abstraction for the uplink.
//!
//! The worker and facade only ever talk to this trait, which keeps the
//! connection state machine testable against an in-memory fake
//! ([`crate::testing::FakeTransport`]) and leaves the broker I/O to one
//! implementation ([`super::MqttTransport`]).

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Handler for inbound messages: `(topic, payload)`.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Errors surfaced by a transport. All of them are treated as transient by the
/// connection worker; none cross the crate's public surface.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection rejected by broker: {0}")]
    Rejected(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("not connected")]
    NotConnected,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("publish not acknowledged in time")]
    PublishTimeout,
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// A broker session the connection worker can drive.
///
/// `connect` performs the whole session establishment, including whatever
/// authentication the configuration selected, and is internally time-bounded.
/// `poll` is the serve step: it drives keepalive, dispatches inbound messages
/// to the installed handler, and reports a lost connection as an error.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the session down. Best effort; never fails.
    async fn disconnect(&mut self);

    async fn send(
        &mut self,
        topic: &str,
        payload: &[u8],
        retained: bool,
    ) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError>;

    /// Service the session for a short, bounded interval.
    async fn poll(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Install the inbound message handler. Survives reconnects.
    fn set_message_handler(&mut self, handler: MessageHandler);
}
