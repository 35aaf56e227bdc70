//! Public uplink surface: publish-or-buffer, subscriptions, lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use super::mqtt::MqttTransport;
use super::queue::{PublishItem, PublishQueue};
use super::transport::Transport;
use super::worker::{ConnectionState, ConnectionWorker, Shared, Subscription};
use super::LOG_TAG;
use crate::config::UplinkConfig;
use crate::error::UplinkError;
use crate::logf;
use crate::logging::{self, Logger, Severity};

/// Upper bound on how long `stop` waits for the worker to wind down before
/// aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resilient MQTT uplink.
///
/// While connected, `publish` goes straight to the broker; while disconnected
/// it lands in a bounded buffer that the background worker replays in FIFO
/// order once the connection is back. Subscriptions are recorded and re-applied
/// after every reconnect.
///
/// ```no_run
/// use devlink::config::UplinkConfig;
/// use devlink::uplink::UplinkClient;
///
/// # async fn demo() -> Result<(), devlink::UplinkError> {
/// let mut config = UplinkConfig::new("broker.example.com", 8883);
/// config.username = Some("device-7".into());
/// config.password = Some("s3cret".into());
///
/// let mut uplink = UplinkClient::new(config);
/// uplink.begin()?;
/// uplink.publish("devices/7/state", "online", true).await;
/// uplink.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct UplinkClient {
    config: UplinkConfig,
    logger: Arc<Logger>,
    shared: Arc<Mutex<Shared>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl UplinkClient {
    /// Build a client over the real MQTT transport, logging through the
    /// process-wide logger.
    pub fn new(config: UplinkConfig) -> Self {
        let transport = Box::new(MqttTransport::new(config.clone()));
        Self::with_transport(config, transport, logging::global_handle())
    }

    /// Build a client over an injected transport and logger. This is the
    /// test seam; production code uses [`UplinkClient::new`].
    pub fn with_transport(
        config: UplinkConfig,
        transport: Box<dyn Transport>,
        logger: Arc<Logger>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Mutex::new(Shared {
            transport,
            queue: PublishQueue::new(config.publish_buffer_size),
            subscriptions: Vec::new(),
        }));
        UplinkClient {
            config,
            logger,
            shared,
            state_tx: Some(state_tx),
            state_rx,
            shutdown_tx: None,
            worker: None,
        }
    }

    /// Validate the configuration and start the connection worker.
    ///
    /// A configuration that cannot work (missing credential material for the
    /// selected auth mode) is reported here, once; the worker is not started.
    /// Must be called from within a Tokio runtime.
    pub fn begin(&mut self) -> Result<(), UplinkError> {
        if self.worker.is_some() {
            return Err(UplinkError::AlreadyRunning);
        }
        self.config.validate()?;

        let state_tx = match self.state_tx.take() {
            Some(tx) => tx,
            None => {
                // Restarted after a stop: fresh state channel.
                let (tx, rx) = watch::channel(ConnectionState::Disconnected);
                self.state_rx = rx;
                tx
            }
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let worker = ConnectionWorker {
            shared: self.shared.clone(),
            logger: self.logger.clone(),
            reconnect_interval: self.config.reconnect_interval(),
            max_retries: self.config.max_retries,
            state_tx,
            shutdown_rx,
        };
        self.worker = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Signal the worker to stop and wait (bounded) for it to exit. Once this
    /// returns, no further transport calls happen.
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.worker.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("uplink worker did not stop in time, aborting");
                abort.abort();
            }
        }
    }

    /// Publish now if connected, otherwise buffer for replay on reconnect.
    ///
    /// Returns `true` when the message was sent or accepted into the buffer;
    /// `false` when the send failed or the buffer is full.
    pub async fn publish(&self, topic: &str, payload: &str, retained: bool) -> bool {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        if shared.transport.is_connected() {
            match shared
                .transport
                .send(topic, payload.as_bytes(), retained)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    logf!(
                        self.logger,
                        Severity::Warning,
                        LOG_TAG,
                        "publish to {topic} failed: {e}"
                    );
                    false
                }
            }
        } else {
            let accepted = shared.queue.enqueue(PublishItem {
                topic: topic.to_string(),
                payload: payload.to_string(),
                retained,
            });
            if !accepted {
                logf!(
                    self.logger,
                    Severity::Warning,
                    LOG_TAG,
                    "publish buffer full, dropping message for {topic}"
                );
            }
            accepted
        }
    }

    /// Record a subscription (honored on every connect) and, when connected,
    /// subscribe immediately.
    ///
    /// A topic already recorded is not recorded twice; entries are never
    /// removed.
    pub async fn subscribe(&self, topic: &str, qos: u8) -> bool {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        if !shared.subscriptions.iter().any(|s| s.topic == topic) {
            shared.subscriptions.push(Subscription {
                topic: topic.to_string(),
                qos,
            });
        }
        if !shared.transport.is_connected() {
            return true;
        }
        match shared.transport.subscribe(topic, qos).await {
            Ok(()) => true,
            Err(e) => {
                logf!(
                    self.logger,
                    Severity::Warning,
                    LOG_TAG,
                    "subscribe to {topic} failed: {e}"
                );
                false
            }
        }
    }

    /// Install the handler for inbound messages. Survives reconnects.
    pub async fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.shared
            .lock()
            .await
            .transport
            .set_message_handler(Arc::new(handler));
    }

    /// Non-blocking connection snapshot.
    pub fn is_connected(&self) -> bool {
        matches!(*self.state_rx.borrow(), ConnectionState::Connected)
    }

    /// Current lifecycle state, as last published by the worker.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

impl Drop for UplinkClient {
    fn drop(&mut self) {
        // Explicit stop() is the graceful path; this only keeps a forgotten
        // worker from running on.
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    fn test_config() -> UplinkConfig {
        let mut config = UplinkConfig::new("broker.local", 8883);
        config.username = Some("u".into());
        config.password = Some("p".into());
        config.reconnect_interval_ms = 10;
        config
    }

    fn test_client() -> (UplinkClient, crate::testing::FakeHandle, Arc<Logger>) {
        let (transport, handle) = FakeTransport::new();
        let logger = Arc::new(Logger::with_capacity(32));
        let client =
            UplinkClient::with_transport(test_config(), Box::new(transport), logger.clone());
        (client, handle, logger)
    }

    #[tokio::test]
    async fn begin_rejects_invalid_config() {
        let (transport, _handle) = FakeTransport::new();
        let mut config = test_config();
        config.username = None;
        let mut client = UplinkClient::with_transport(
            config,
            Box::new(transport),
            Arc::new(Logger::with_capacity(8)),
        );
        assert!(matches!(client.begin(), Err(UplinkError::Config(_))));
        // The worker never started.
        assert!(client.worker.is_none());
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let (mut client, _handle, _logger) = test_client();
        client.begin().unwrap();
        assert!(matches!(client.begin(), Err(UplinkError::AlreadyRunning)));
        client.stop().await;
    }

    #[tokio::test]
    async fn publish_while_disconnected_buffers() {
        let (client, handle, _logger) = test_client();
        assert!(!client.is_connected());
        assert!(client.publish("t", "p", false).await);
        // Never sent anywhere: the worker was not even started.
        assert!(handle.sent().is_empty());
    }

    #[tokio::test]
    async fn publish_rejected_when_buffer_full() {
        let (client, _handle, logger) = test_client();
        for n in 0..5 {
            assert!(client.publish("t", &format!("{n}"), false).await);
        }
        assert!(!client.publish("t", "overflow", false).await);
        // The rejection is visible through the logging facade.
        assert!(logger
            .peek(0)
            .map(|r| r.message.contains("publish buffer full"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn subscribe_before_begin_is_recorded() {
        let (client, _handle, _logger) = test_client();
        assert!(client.subscribe("devices/7/cmd", 1).await);
        assert!(client.subscribe("devices/7/cmd", 1).await);
        let shared = client.shared.lock().await;
        assert_eq!(shared.subscriptions.len(), 1);
        assert_eq!(shared.subscriptions[0].topic, "devices/7/cmd");
        assert_eq!(shared.subscriptions[0].qos, 1);
    }

    #[tokio::test]
    async fn stop_without_begin_is_a_no_op() {
        let (mut client, _handle, _logger) = test_client();
        client.stop().await;
        assert!(!client.is_connected());
    }
}
