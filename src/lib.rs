//! devlink - runtime support for small connected devices
//!
//! Two subsystems, usable together or on their own:
//!
//! - [`logging`]: a fixed-capacity, thread-safe log ring with severity
//!   filtering and callback/observer fan-out. Writes never block on I/O and
//!   never fail; when the ring is full the oldest entry is overwritten.
//! - [`uplink`]: a connection-resilient MQTT client. Publishes are buffered
//!   while the broker is unreachable and replayed in order by a background
//!   worker that reconnects forever on a fixed interval.
//!
//! # Quick Start
//!
//! ```rust
//! use devlink::logging::{Logger, Severity};
//!
//! let logger = Logger::new();
//! logger.set_filter_level(Severity::Info);
//! logger.add_observer(Box::new(|tag, level, message| {
//!     println!("[{level}] {tag}: {message}");
//! }));
//!
//! devlink::logf!(logger, Severity::Warning, "power", "battery at {}%", 12);
//!
//! let record = logger.next().unwrap();
//! assert_eq!(record.tag, "power");
//! assert_eq!(record.message, "battery at 12%");
//! ```
//!
//! Bringing up the uplink:
//!
//! ```rust,no_run
//! use devlink::config::UplinkConfig;
//! use devlink::uplink::UplinkClient;
//!
//! # async fn demo() -> Result<(), devlink::UplinkError> {
//! let mut config = UplinkConfig::new("broker.example.com", 8883);
//! config.username = Some("device-7".into());
//! config.password = Some("s3cret".into());
//!
//! let mut uplink = UplinkClient::new(config);
//! uplink.begin()?;
//!
//! // Sent immediately when connected, buffered and replayed otherwise.
//! uplink.publish("devices/7/telemetry", "{\"rssi\":-67}", false).await;
//!
//! uplink.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod testing;
pub mod uplink;

pub use config::{AuthMode, UplinkConfig};
pub use error::{UplinkError, UplinkResult};
pub use logging::{LogRecord, Logger, Severity};
pub use uplink::{ConnectionState, UplinkClient};
