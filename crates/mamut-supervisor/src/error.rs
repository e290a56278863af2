//! Error types for process supervision, discovery and proxying.

use std::time::Duration;
use thiserror::Error;

use crate::signal::Signal;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can occur while supervising processes or proxying traffic.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The program could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A process is already tracked and has not exited.
    #[error("process {name} is already running")]
    AlreadyRunning { name: String },

    /// An endpoint was not announced before the deadline.
    #[error("endpoint {endpoint} was not discovered within {timeout:?}")]
    DiscoveryTimeout { endpoint: String, timeout: Duration },

    /// Waiting for an endpoint was cancelled.
    #[error("discovery of endpoint {endpoint} was cancelled")]
    DiscoveryCancelled { endpoint: String },

    /// The endpoint is not one the discovery was set up for.
    #[error("unknown endpoint {endpoint}")]
    UnknownEndpoint { endpoint: String },

    /// The process exited before announcing its endpoints.
    #[error("process {name} exited before announcing endpoint {endpoint}")]
    ExitedEarly { name: String, endpoint: String },

    /// Every dial attempt to the upstream failed.
    #[error("failed to dial upstream {upstream} after {attempts} attempts")]
    DialExhausted { upstream: String, attempts: u32 },

    /// The proxy has been closed.
    #[error("proxy is closed")]
    ProxyClosed,

    /// An address could not be parsed.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Delivering a signal failed.
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        signal: Signal,
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    /// A core primitive failed.
    #[error(transparent)]
    Core(#[from] mamut_core::CoreError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates an unknown endpoint error.
    pub fn unknown_endpoint(endpoint: impl Into<String>) -> Self {
        Self::UnknownEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Checks if this error came from cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::DiscoveryCancelled { .. } | Self::ProxyClosed)
    }

    /// Checks if retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryTimeout { .. } | Self::DialExhausted { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SupervisorError::DiscoveryTimeout {
            endpoint: "rpc".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "endpoint rpc was not discovered within 30s");
    }

    #[test]
    fn test_error_classification() {
        assert!(SupervisorError::ProxyClosed.is_cancelled());
        assert!(!SupervisorError::ProxyClosed.is_retryable());
        let err = SupervisorError::DialExhausted {
            upstream: "127.0.0.1:1".into(),
            attempts: 3,
        };
        assert!(err.is_retryable());
        assert!(!SupervisorError::unknown_endpoint("x").is_retryable());
    }
}
