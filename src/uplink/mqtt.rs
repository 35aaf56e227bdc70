//! rumqttc-backed [`Transport`] implementation.
//!
//! Owns the `AsyncClient`/`EventLoop` pair for one broker session. Connection
//! establishment waits for the actual ConnAck rather than treating any event
//! as success; publishes wait for the broker's PubAck within the configured
//! publish timeout. Inbound messages observed while waiting are still
//! dispatched to the installed handler.

use std::time::Duration;

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::{TlsConfiguration, Transport as TcpTransport};
use tracing::debug;
use uuid::Uuid;

use super::transport::{MessageHandler, Transport, TransportError};
use crate::config::{AuthMode, UplinkConfig};

/// Upper bound on one session establishment, TLS handshake included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long one serve step may sit on the event loop before yielding.
const POLL_WINDOW: Duration = Duration::from_millis(100);

const KEEP_ALIVE: Duration = Duration::from_secs(60);

pub struct MqttTransport {
    config: UplinkConfig,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoop>,
    connected: bool,
    handler: Option<MessageHandler>,
}

impl MqttTransport {
    pub fn new(config: UplinkConfig) -> Self {
        MqttTransport {
            config,
            client: None,
            event_loop: None,
            connected: false,
            handler: None,
        }
    }

    fn build_options(&self) -> MqttOptions {
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("device-{}", Uuid::new_v4().simple()));
        let mut options = MqttOptions::new(client_id, self.config.server.clone(), self.config.port);
        options.set_keep_alive(KEEP_ALIVE);

        match self.config.auth_mode {
            AuthMode::Certificate => {
                // Mutual TLS; validate() guarantees the material is present.
                let tls = TlsConfiguration::Simple {
                    ca: self.config.root_ca.clone().unwrap_or_default().into_bytes(),
                    alpn: None,
                    client_auth: Some((
                        self.config
                            .client_cert
                            .clone()
                            .unwrap_or_default()
                            .into_bytes(),
                        self.config
                            .client_key
                            .clone()
                            .unwrap_or_default()
                            .into_bytes(),
                    )),
                };
                options.set_transport(TcpTransport::Tls(tls));
            }
            AuthMode::UsernamePassword => {
                if let (Some(username), Some(password)) =
                    (&self.config.username, &self.config.password)
                {
                    options.set_credentials(username.clone(), password.clone());
                }
                let transport = match &self.config.root_ca {
                    Some(ca) => TcpTransport::Tls(TlsConfiguration::Simple {
                        ca: ca.clone().into_bytes(),
                        alpn: None,
                        client_auth: None,
                    }),
                    None => TcpTransport::tls_with_default_config(),
                };
                options.set_transport(transport);
            }
        }

        options
    }

    fn reset_session(&mut self) {
        self.client = None;
        self.event_loop = None;
        self.connected = false;
    }
}

#[async_trait::async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.reset_session();
        let options = self.build_options();
        let (client, mut event_loop) = AsyncClient::new(options, 16);

        let established = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if matches!(ack.code, ConnectReturnCode::Success) {
                            Ok(())
                        } else {
                            Err(TransportError::Rejected(format!("{:?}", ack.code)))
                        };
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(TransportError::Connect(e.to_string())),
                }
            }
        })
        .await;

        match established {
            Ok(Ok(())) => {
                debug!(server = %self.config.server, port = self.config.port, "broker session established");
                self.client = Some(client);
                self.event_loop = Some(event_loop);
                self.connected = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Connect(
                "timed out waiting for broker acknowledgement".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.disconnect().await;
        }
        self.event_loop = None;
        self.connected = false;
    }

    async fn send(
        &mut self,
        topic: &str,
        payload: &[u8],
        retained: bool,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .publish(topic.to_string(), QoS::AtLeastOnce, retained, payload.to_vec())
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        let handler = self.handler.clone();
        let event_loop = self.event_loop.as_mut().ok_or(TransportError::NotConnected)?;
        match wait_for_ack(event_loop, &handler, self.config.publish_timeout(), |p| {
            matches!(p, Packet::PubAck(_))
        })
        .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::PublishTimeout),
            Err(e) => {
                self.reset_session();
                Err(e)
            }
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .subscribe(topic.to_string(), qos_from(qos))
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let handler = self.handler.clone();
        let event_loop = self.event_loop.as_mut().ok_or(TransportError::NotConnected)?;
        match wait_for_ack(event_loop, &handler, self.config.publish_timeout(), |p| {
            matches!(p, Packet::SubAck(_))
        })
        .await
        {
            Ok(true) => {
                debug!(topic, qos, "subscription acknowledged");
                Ok(())
            }
            Ok(false) => Err(TransportError::Subscribe(
                "not acknowledged in time".to_string(),
            )),
            Err(e) => {
                self.reset_session();
                Err(e)
            }
        }
    }

    async fn poll(&mut self) -> Result<(), TransportError> {
        let handler = self.handler.clone();
        let event_loop = self.event_loop.as_mut().ok_or(TransportError::NotConnected)?;
        let outcome = match tokio::time::timeout(POLL_WINDOW, event_loop.poll()).await {
            // Nothing happened inside the window; keepalive is current.
            Err(_) => Ok(()),
            Ok(Ok(Event::Incoming(packet))) => deliver(&handler, &packet),
            Ok(Ok(Event::Outgoing(_))) => Ok(()),
            Ok(Err(e)) => Err(TransportError::ConnectionLost(e.to_string())),
        };
        if outcome.is_err() {
            self.reset_session();
        }
        outcome
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }
}

/// Drive the event loop until `is_ack` matches an incoming packet.
/// `Ok(false)` means the window elapsed first. Messages seen along the way are
/// delivered to the handler.
async fn wait_for_ack(
    event_loop: &mut EventLoop,
    handler: &Option<MessageHandler>,
    window: Duration,
    is_ack: fn(&Packet) -> bool,
) -> Result<bool, TransportError> {
    let result = tokio::time::timeout(window, async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(packet)) => {
                    if is_ack(&packet) {
                        return Ok(());
                    }
                    deliver(handler, &packet)?;
                }
                Ok(Event::Outgoing(_)) => {}
                Err(e) => return Err(TransportError::ConnectionLost(e.to_string())),
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(true),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(false),
    }
}

/// Hand an incoming packet to the message handler; a broker-initiated
/// disconnect surfaces as a lost connection.
fn deliver(handler: &Option<MessageHandler>, packet: &Packet) -> Result<(), TransportError> {
    match packet {
        Packet::Publish(publish) => {
            if let Some(handler) = handler {
                let topic = String::from_utf8_lossy(&publish.topic);
                handler(&topic, &publish.payload);
            }
            Ok(())
        }
        Packet::Disconnect(_) => Err(TransportError::ConnectionLost(
            "broker sent disconnect".to_string(),
        )),
        _ => Ok(()),
    }
}

fn qos_from(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}
