//! Connection worker: the background task that owns the transport lifecycle.
//!
//! One loop, explicit states: connect, replay subscriptions, drain the offline
//! publish buffer, then serve until the connection drops. Failed connects are
//! retried forever on a fixed interval; after `max_retries` consecutive
//! failures the worker escalates once through the logging facade and keeps
//! going. Shutdown is a watch signal checked at every state checkpoint,
//! including inside the reconnect delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use super::queue::PublishQueue;
use super::transport::{Transport, TransportError};
use super::LOG_TAG;
use crate::logf;
use crate::logging::{Logger, Severity};

/// Connection lifecycle as observed through [`super::UplinkClient::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Session establishment in progress, authentication included.
    Connecting,
    /// Connected; replaying recorded subscriptions.
    Subscribing,
    Connected,
    /// Terminal; the worker has exited.
    Stopped,
}

/// A recorded subscription, replayed after every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Subscription {
    pub(crate) topic: String,
    pub(crate) qos: u8,
}

/// Everything the facade and the worker both touch, behind the one shared
/// mutex per client instance.
pub(crate) struct Shared {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) queue: PublishQueue,
    pub(crate) subscriptions: Vec<Subscription>,
}

enum ServeExit {
    Shutdown,
    Disconnected,
}

pub(crate) struct ConnectionWorker {
    pub(crate) shared: Arc<Mutex<Shared>>,
    pub(crate) logger: Arc<Logger>,
    pub(crate) reconnect_interval: Duration,
    pub(crate) max_retries: u32,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

/// Pause between serve iterations, outside the shared lock, so callers get a
/// fair shot at the mutex.
const SERVE_IDLE: Duration = Duration::from_millis(10);

/// The escalation fires exactly when the failure streak reaches the limit;
/// the streak keeps counting, so each outage escalates once.
fn escalation_due(consecutive_failures: u32, max_retries: u32) -> bool {
    consecutive_failures == max_retries
}

impl ConnectionWorker {
    pub(crate) async fn run(mut self) {
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.shutdown_requested() {
                break;
            }

            let _ = self.state_tx.send(ConnectionState::Connecting);
            let attempt = {
                let mut shared = self.shared.lock().await;
                shared.transport.connect().await
            };

            match attempt {
                Ok(()) => {
                    consecutive_failures = 0;
                    self.logger.log(LOG_TAG, Severity::Info, "connected to broker");

                    // Shutdown is observed at every state transition, not just
                    // inside the serve loop.
                    if self.shutdown_requested() {
                        break;
                    }
                    let _ = self.state_tx.send(ConnectionState::Subscribing);
                    self.resubscribe().await;

                    if self.shutdown_requested() {
                        break;
                    }
                    let _ = self.state_tx.send(ConnectionState::Connected);
                    if let ServeExit::Shutdown = self.serve().await {
                        break;
                    }
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    logf!(
                        self.logger,
                        Severity::Warning,
                        LOG_TAG,
                        "connect attempt {consecutive_failures} failed: {e}"
                    );
                    if escalation_due(consecutive_failures, self.max_retries) {
                        logf!(
                            self.logger,
                            Severity::Error,
                            LOG_TAG,
                            "broker unreachable after {} attempts, still retrying",
                            self.max_retries
                        );
                    }
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                }
            }

            if !self.sleep_interruptible(self.reconnect_interval).await {
                break;
            }
        }

        // Release the transport before reporting the terminal state, so no
        // session outlives the worker.
        self.shared.lock().await.transport.disconnect().await;
        let _ = self.state_tx.send(ConnectionState::Stopped);
    }

    /// Replay every recorded subscription in registration order. A failing
    /// topic is logged and the rest are still attempted.
    async fn resubscribe(&self) {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        for sub in &shared.subscriptions {
            if let Err(e) = shared.transport.subscribe(&sub.topic, sub.qos).await {
                logf!(
                    self.logger,
                    Severity::Warning,
                    LOG_TAG,
                    "resubscribe to {} failed: {e}",
                    sub.topic
                );
            }
        }
    }

    /// Serve the live connection: drain anything buffered, then poll. Each
    /// iteration takes the shared lock once and yields between iterations.
    async fn serve(&mut self) -> ServeExit {
        loop {
            if self.shutdown_requested() {
                return ServeExit::Shutdown;
            }

            let step = {
                let mut guard = self.shared.lock().await;
                let shared = &mut *guard;
                match drain_queue(shared, &self.logger).await {
                    Ok(()) => shared.transport.poll().await,
                    Err(e) => Err(e),
                }
            };

            if let Err(e) = step {
                logf!(
                    self.logger,
                    Severity::Warning,
                    LOG_TAG,
                    "connection lost: {e}"
                );
                return ServeExit::Disconnected;
            }

            tokio::select! {
                _ = self.shutdown_rx.changed() => {}
                _ = tokio::time::sleep(SERVE_IDLE) => {}
            }
        }
    }

    async fn sleep_interruptible(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.changed() => !*self.shutdown_rx.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

/// Send buffered items oldest-first until the queue is empty or a send fails;
/// a failed item stays at the front for the next attempt.
async fn drain_queue(shared: &mut Shared, logger: &Logger) -> Result<(), TransportError> {
    let mut flushed = 0usize;
    loop {
        let next = match shared.queue.front() {
            Some(item) => item.clone(),
            None => break,
        };
        shared
            .transport
            .send(&next.topic, next.payload.as_bytes(), next.retained)
            .await?;
        shared.queue.dequeue();
        flushed += 1;
    }
    if flushed > 0 {
        logf!(
            logger,
            Severity::Info,
            LOG_TAG,
            "flushed {flushed} buffered messages"
        );
    }
    Ok(())
}
