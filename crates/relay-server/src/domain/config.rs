//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled in `main.rs` from CLI flags, environment variables and an
//! optional TOML file, or taken from [`Default`] in tests and local runs.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the relay easy to embed in tests.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use relay_core::DEFAULT_MAX_MESSAGE_SIZE;

/// Default listener address: all interfaces, port 5000.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default path of the WebSocket endpoint.
pub const DEFAULT_PATH: &str = "/chat";

/// Default per-recipient send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a new connection gets to deliver its HTTP request head.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A configuration value that can never work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("endpoint path must start with '/', got '{0}'")]
    PathNotAbsolute(String),
    #[error("endpoint path must be literal (no '{{', '}}', '*' or ':'), got '{0}'")]
    PathNotLiteral(String),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("max_message_size must be greater than zero")]
    ZeroMessageSize,
}

/// All runtime configuration for the relay.
///
/// Build this struct once at startup and then wrap it in an `Arc` so it can be
/// shared cheaply across all session tasks.
///
/// # Example
///
/// ```rust
/// use relay_server::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 5000);
/// assert_eq!(cfg.path, "/chat");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// The address and port the listener binds to.
    pub bind_addr: SocketAddr,

    /// The only request path that is upgraded to a WebSocket.
    ///
    /// A non-upgrade request to this path is answered with `400 Bad Request`;
    /// any other path gets `404 Not Found`.
    pub path: String,

    /// Upper bound on one send to one recipient during a broadcast.
    ///
    /// A recipient that cannot accept the message in time is skipped and
    /// evicted, so a stalled peer never holds a broadcast up for longer than
    /// this.
    pub send_timeout: Duration,

    /// Cap on the size of one logical (reassembled) message, in bytes.
    ///
    /// A peer that exceeds it is closed with code 1009.
    pub max_message_size: usize,

    /// How long a freshly accepted TCP connection may take to send its HTTP
    /// request head before it is dropped.
    ///
    /// The same bound applies to finishing the upgrade after the `101`.
    pub handshake_timeout: Duration,
}

impl RelayConfig {
    /// Checks the values that parse fine but can never work.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigValidationError`] found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.path.starts_with('/') {
            return Err(ConfigValidationError::PathNotAbsolute(self.path.clone()));
        }
        if self.path.contains(['{', '}', '*', ':']) {
            return Err(ConfigValidationError::PathNotLiteral(self.path.clone()));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigValidationError::ZeroTimeout("send_timeout"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigValidationError::ZeroTimeout("handshake_timeout"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigValidationError::ZeroMessageSize);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    /// | Field             | Default        |
    /// |-------------------|----------------|
    /// | bind_addr         | `0.0.0.0:5000` |
    /// | path              | `/chat`        |
    /// | send_timeout      | 5 seconds      |
    /// | max_message_size  | 1 MiB          |
    /// | handshake_timeout | 10 seconds     |
    fn default() -> Self {
        Self {
            // Safe: compile-time constant, known to be a valid socket address.
            bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
            path: DEFAULT_PATH.to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_5000() {
        // Arrange / Act
        let cfg = RelayConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 5000);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_path_is_chat() {
        assert_eq!(RelayConfig::default().path, "/chat");
    }

    #[test]
    fn test_default_send_timeout_is_5s() {
        assert_eq!(RelayConfig::default().send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_max_message_size_is_1mib() {
        assert_eq!(RelayConfig::default().max_message_size, 1024 * 1024);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(RelayConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_relative_path() {
        let cfg = RelayConfig {
            path: "chat".to_string(),
            ..RelayConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigValidationError::PathNotAbsolute("chat".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_route_pattern_in_path() {
        let cfg = RelayConfig {
            path: "/chat/{room}".to_string(),
            ..RelayConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigValidationError::PathNotLiteral("/chat/{room}".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_zero_send_timeout() {
        let cfg = RelayConfig {
            send_timeout: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigValidationError::ZeroTimeout("send_timeout"))
        );
    }

    #[test]
    fn test_validate_rejects_zero_handshake_timeout() {
        let cfg = RelayConfig {
            handshake_timeout: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_message_size() {
        let cfg = RelayConfig {
            max_message_size: 0,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigValidationError::ZeroMessageSize));
    }
}
