//! Component capabilities.
//!
//! A component is anything the orchestrator registers under a
//! [`ComponentId`]: a node process, an in-process service, a switch inside
//! another component. Every component knows its stable endpoints and how to
//! project itself into a [`System`]. Components that can be started and
//! stopped at runtime also expose a [`Lifecycle`].

use crate::error::Result;
use crate::system::System;
use async_trait::async_trait;
use mamut_core::ComponentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether a component can be started again after a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Stop and start may alternate freely. Endpoints are rediscovered on
    /// every start and the stable proxies are re-pointed.
    #[default]
    RestartSafe,
    /// Endpoints are discovered on the first start only; a start after a
    /// stop is refused.
    DiscoverOnce,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::RestartSafe => write!(f, "restart_safe"),
            RestartPolicy::DiscoverOnce => write!(f, "discover_once"),
        }
    }
}

/// A stable endpoint published by a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Proxy-stable URL.
    pub url: String,
    /// Requests need a JWT bearer token.
    #[serde(default)]
    pub auth: bool,
}

impl Endpoint {
    /// Creates an unauthenticated endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: false,
        }
    }

    /// Creates an endpoint requiring bearer auth.
    pub fn authenticated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: true,
        }
    }
}

/// Runtime start and stop.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Starts the component. Fails if it is already running.
    async fn start(&self) -> Result<()>;

    /// Stops the component. Stopping a stopped component is not an error.
    async fn stop(&self) -> Result<()>;

    /// Returns true while the component is running.
    async fn is_running(&self) -> bool;

    /// Restart capability of this component.
    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::RestartSafe
    }

    /// Returns true once the component has been stopped at least once.
    fn stopped_once(&self) -> bool {
        false
    }
}

/// A registered participant of the devnet.
pub trait Component: Send + Sync {
    /// The component's identifier.
    fn id(&self) -> ComponentId;

    /// Stable endpoints by name. Empty before the first start.
    fn endpoints(&self) -> BTreeMap<String, Endpoint>;

    /// Relations to other components, as `(relation, target)` pairs.
    fn links(&self) -> Vec<(String, ComponentId)> {
        Vec::new()
    }

    /// Start/stop control, if the component supports it.
    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        None
    }

    /// Attaches a fresh front-end for this component to `system`.
    fn hydrate(&self, system: &System) -> Result<()> {
        let frontend = system.frontend(self.id(), self.endpoints());
        for (rel, target) in self.links() {
            frontend.link(rel, target);
        }
        system.attach(frontend)
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id().to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_serde() {
        assert_eq!(RestartPolicy::default(), RestartPolicy::RestartSafe);
        let text = serde_json::to_string(&RestartPolicy::DiscoverOnce).unwrap();
        assert_eq!(text, "\"discover_once\"");
        let back: RestartPolicy = serde_json::from_str("\"restart_safe\"").unwrap();
        assert_eq!(back, RestartPolicy::RestartSafe);
        assert_eq!(RestartPolicy::DiscoverOnce.to_string(), "discover_once");
    }

    #[test]
    fn test_endpoint_constructors() {
        assert!(!Endpoint::new("http://127.0.0.1:1").auth);
        assert!(Endpoint::authenticated("http://127.0.0.1:2").auth);
    }
}
