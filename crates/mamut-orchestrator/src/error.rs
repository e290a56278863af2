//! Error types for the orchestrator crate.
//!
//! This module provides error types for building, hydrating and controlling
//! a devnet.

use mamut_core::{ComponentId, CoreError, IdError, MatchError};
use mamut_supervisor::SupervisorError;
use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A component was registered under an ID that is already taken.
    #[error("duplicate component {0}")]
    Duplicate(ComponentId),

    /// A component depends on something that has not been set up.
    #[error("missing dependency {dependency} for {component}")]
    MissingDependency {
        /// The component being built.
        component: String,
        /// What it needed.
        dependency: String,
    },

    /// No component is registered under the ID.
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    /// The component has no lifecycle to drive.
    #[error("component {0} cannot be started or stopped")]
    NotControllable(ComponentId),

    /// The component discovers its endpoints once and cannot be restarted.
    #[error("component {0} does not support restarts")]
    RestartUnsupported(ComponentId),

    /// The component is already running.
    #[error("component {0} is already running")]
    AlreadyRunning(ComponentId),

    /// The component has no endpoint with that name.
    #[error("component {component} has no endpoint {endpoint}")]
    UnknownEndpoint {
        /// The component.
        component: ComponentId,
        /// The requested endpoint.
        endpoint: String,
    },

    /// A launch argument template could not be resolved.
    #[error("template error in {template:?}: {reason}")]
    Template {
        /// The template text.
        template: String,
        /// The reason for the failure.
        reason: String,
    },

    /// No payload with that name exists.
    #[error("payload {0} not found")]
    PayloadNotFound(String),

    /// A payload with that name was already stored.
    #[error("payload {0} already set")]
    DuplicatePayload(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// JWT secret or token error.
    #[error("jwt error: {0}")]
    Jwt(String),

    /// A JSON-RPC call failed.
    #[error("rpc call {method} to {url} failed: {reason}")]
    Rpc {
        /// The endpoint URL.
        url: String,
        /// The method called.
        method: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Identifier error.
    #[error(transparent)]
    Id(#[from] IdError),

    /// Matcher resolution error.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Core primitive error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Process supervision error.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Creates a missing dependency error.
    pub fn missing_dependency(component: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            component: component.into(),
            dependency: dependency.into(),
        }
    }

    /// Creates a template error.
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Creates an RPC error.
    pub fn rpc(url: impl Into<String>, method: impl Into<String>, reason: impl ToString) -> Self {
        Self::Rpc {
            url: url.into(),
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    /// Checks if this error is a topology or programming error rather than
    /// a runtime condition.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::Duplicate(_)
                | Self::MissingDependency { .. }
                | Self::UnknownComponent(_)
                | Self::NotControllable(_)
                | Self::RestartUnsupported(_)
                | Self::Id(_)
        )
    }

    /// Checks if this error might go away on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { .. } => true,
            Self::Supervisor(e) => e.is_retryable(),
            _ => false,
        }
    }
}
