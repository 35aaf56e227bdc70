//! Connection-resilient MQTT uplink.
//!
//! [`UplinkClient`] is the operation surface; [`worker::ConnectionWorker`] is
//! the background task owning the transport lifecycle. The two share exactly
//! one mutex (transport + offline publish buffer + subscription list), so a
//! publish can never race a connection state transition.

mod client;
mod mqtt;
mod queue;
mod transport;
pub(crate) mod worker;

pub use client::UplinkClient;
pub use mqtt::MqttTransport;
pub use queue::PublishItem;
pub use transport::{MessageHandler, Transport, TransportError};
pub use worker::ConnectionState;

/// Tag the uplink uses for its own records in the logging facade.
pub(crate) const LOG_TAG: &str = "uplink";
