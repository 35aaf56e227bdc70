//! Crate-level error surface.
//!
//! Only lifecycle operations return errors; the data-path operations
//! (`publish`, `subscribe`, buffer reads) report failure through their return
//! values and the logging facade instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::uplink::TransportError;

/// Errors returned by the uplink lifecycle (`begin`).
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("uplink is already running")]
    AlreadyRunning,
}

/// Result alias for uplink lifecycle operations.
pub type UplinkResult<T> = Result<T, UplinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert() {
        let error: UplinkError = ConfigError::Invalid("missing credential".into()).into();
        assert!(matches!(error, UplinkError::Config(_)));
        assert!(error.to_string().contains("missing credential"));
    }

    #[test]
    fn transport_errors_convert() {
        let error: UplinkError = TransportError::NotConnected.into();
        assert!(matches!(error, UplinkError::Transport(_)));
    }

    #[test]
    fn display_is_non_empty_for_all_variants() {
        let errors = vec![
            UplinkError::Config(ConfigError::Invalid("x".into())),
            UplinkError::Transport(TransportError::NotConnected),
            UplinkError::AlreadyRunning,
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
