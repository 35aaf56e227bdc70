//! Test support: an in-memory transport for exercising the uplink without a
//! broker.
//!
//! [`FakeTransport`] moves into the client; the paired [`FakeHandle`] stays
//! with the test to script failures and inspect what the worker did.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::uplink::{MessageHandler, Transport, TransportError};

/// A message the fake accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

#[derive(Default)]
struct State {
    total_calls: AtomicU32,
    connect_attempts: AtomicU32,
    connect_failures_remaining: AtomicU32,
    fail_sends: AtomicBool,
    drop_connection: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
    subscribed: Mutex<Vec<(String, u8)>>,
    fail_subscribe_topic: Mutex<Option<String>>,
    handler: Mutex<Option<MessageHandler>>,
}

/// Scriptable in-memory [`Transport`].
pub struct FakeTransport {
    state: Arc<State>,
    connected: bool,
}

/// Inspection and scripting handle for a [`FakeTransport`] that has been
/// moved into a client.
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<State>,
}

impl FakeTransport {
    pub fn new() -> (FakeTransport, FakeHandle) {
        let state = Arc::new(State::default());
        (
            FakeTransport {
                state: state.clone(),
                connected: false,
            },
            FakeHandle { state },
        )
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .state
            .connect_failures_remaining
            .load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .connect_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("scripted connect failure".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }

    async fn send(
        &mut self,
        topic: &str,
        payload: &[u8],
        retained: bool,
    ) -> Result<(), TransportError> {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("scripted send failure".into()));
        }
        self.state.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).to_string(),
            retained,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError> {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self
            .state
            .fail_subscribe_topic
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|failing| failing == topic)
        {
            return Err(TransportError::Subscribe(
                "scripted subscribe failure".into(),
            ));
        }
        self.state
            .subscribed
            .lock()
            .unwrap()
            .push((topic.to_string(), qos));
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), TransportError> {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.state.drop_connection.swap(false, Ordering::SeqCst) {
            self.connected = false;
            return Err(TransportError::ConnectionLost(
                "scripted connection drop".into(),
            ));
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        *self.state.handler.lock().unwrap() = Some(handler);
    }
}

impl FakeHandle {
    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state
            .connect_failures_remaining
            .store(n, Ordering::SeqCst);
    }

    /// Make every send fail until cleared.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subscriptions to exactly `topic` fail.
    pub fn fail_subscribes_to(&self, topic: &str) {
        *self.state.fail_subscribe_topic.lock().unwrap() = Some(topic.to_string());
    }

    /// Fail the next poll, simulating a dropped connection.
    pub fn drop_connection(&self) {
        self.state.drop_connection.store(true, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Total transport calls of any kind, for no-calls-after-stop assertions.
    pub fn total_calls(&self) -> u32 {
        self.state.total_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, u8)> {
        self.state.subscribed.lock().unwrap().clone()
    }

    /// Deliver a message through the installed handler, as the broker would.
    /// Returns `false` when no handler is installed.
    pub fn inject_message(&self, topic: &str, payload: &[u8]) -> bool {
        let handler = self.state.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => {
                handler(topic, payload);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_connect_failures_then_success() {
        let (mut transport, handle) = FakeTransport::new();
        handle.fail_next_connects(2);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        tokio_test::assert_ok!(transport.connect().await,);
        assert!(transport.is_connected());
        assert_eq!(handle.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn records_sends_and_subscriptions() {
        let (mut transport, handle) = FakeTransport::new();
        transport.connect().await.unwrap();
        transport.send("t", b"p", true).await.unwrap();
        transport.subscribe("s", 1).await.unwrap();

        assert_eq!(
            handle.sent(),
            vec![SentMessage {
                topic: "t".into(),
                payload: "p".into(),
                retained: true,
            }]
        );
        assert_eq!(handle.subscriptions(), vec![("s".into(), 1)]);
    }

    #[tokio::test]
    async fn dropped_connection_fails_next_poll() {
        let (mut transport, handle) = FakeTransport::new();
        transport.connect().await.unwrap();
        assert!(transport.poll().await.is_ok());
        handle.drop_connection();
        assert!(transport.poll().await.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn inject_message_reaches_handler() {
        let (mut transport, handle) = FakeTransport::new();
        assert!(!handle.inject_message("t", b"x"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        transport.set_message_handler(Arc::new(move |topic: &str, payload: &[u8]| {
            seen_in_handler
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
        }));

        assert!(handle.inject_message("devices/7/cmd", b"reboot"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
