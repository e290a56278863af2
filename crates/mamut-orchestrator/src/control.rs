//! Runtime start/stop of registered components.

use crate::component::RestartPolicy;
use crate::error::{OrchestratorError, Result};
use crate::registries::ComponentRegistries;
use mamut_core::{ComponentId, Id};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// A control-plane request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Start a stopped component.
    Start,
    /// Stop a running component.
    Stop,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Start => write!(f, "start"),
            ControlAction::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for ControlAction {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            other => Err(OrchestratorError::Configuration(format!(
                "unknown control action {other:?}"
            ))),
        }
    }
}

/// Starts and stops components by ID.
///
/// Holds only a handle on the registries, so it stays valid for as long as
/// the orchestrator's components do. Restarts go through the same stable
/// proxies, so clients keep their addresses.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    registries: ComponentRegistries,
}

impl ControlPlane {
    /// Creates a control plane over `registries`.
    pub fn new(registries: ComponentRegistries) -> Self {
        Self { registries }
    }

    /// Applies `action` to the component registered under `id`.
    pub async fn action(&self, id: &ComponentId, action: ControlAction) -> Result<()> {
        let component = self
            .registries
            .get(id)
            .ok_or_else(|| OrchestratorError::UnknownComponent(id.clone()))?;
        let lifecycle = component
            .lifecycle()
            .ok_or_else(|| OrchestratorError::NotControllable(id.clone()))?;

        info!(id = %id, action = %action, "control action");
        match action {
            ControlAction::Start => {
                if lifecycle.restart_policy() == RestartPolicy::DiscoverOnce
                    && lifecycle.stopped_once()
                {
                    return Err(OrchestratorError::RestartUnsupported(id.clone()));
                }
                if lifecycle.is_running().await {
                    return Err(OrchestratorError::AlreadyRunning(id.clone()));
                }
                lifecycle.start().await
            }
            ControlAction::Stop => lifecycle.stop().await,
        }
    }

    /// Typed form of [`action`](Self::action).
    pub async fn action_for<I: Id>(&self, id: &I, action: ControlAction) -> Result<()> {
        self.action(&id.erase(), action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Endpoint, Lifecycle};
    use async_trait::async_trait;
    use mamut_core::id::{L2BatcherId, L2CLNodeId, L2ELNodeId};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Toggle {
        id: ComponentId,
        policy: RestartPolicy,
        running: AtomicBool,
        stopped: AtomicBool,
    }

    impl Toggle {
        fn new(id: impl Into<ComponentId>, policy: RestartPolicy) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                policy,
                running: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Lifecycle for Toggle {
        async fn start(&self) -> Result<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn restart_policy(&self) -> RestartPolicy {
            self.policy
        }

        fn stopped_once(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    impl Component for Toggle {
        fn id(&self) -> ComponentId {
            self.id.clone()
        }

        fn endpoints(&self) -> BTreeMap<String, Endpoint> {
            BTreeMap::new()
        }

        fn lifecycle(&self) -> Option<&dyn Lifecycle> {
            Some(self)
        }
    }

    struct Passive(ComponentId);

    impl Component for Passive {
        fn id(&self) -> ComponentId {
            self.0.clone()
        }

        fn endpoints(&self) -> BTreeMap<String, Endpoint> {
            BTreeMap::new()
        }
    }

    #[tokio::test]
    async fn test_stop_start_round_trip() {
        let regs = ComponentRegistries::new();
        let node = Toggle::new(L2CLNodeId::new("a", 901u64), RestartPolicy::RestartSafe);
        regs.register(node.clone()).unwrap();
        let control = ControlPlane::new(regs);
        let id = L2CLNodeId::new("a", 901u64);

        control.action_for(&id, ControlAction::Stop).await.unwrap();
        assert!(!node.is_running().await);
        control.action_for(&id, ControlAction::Start).await.unwrap();
        assert!(node.is_running().await);

        let err = control
            .action_for(&id, ControlAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning(_)));
    }

    #[tokio::test]
    async fn test_discover_once_refuses_restart() {
        let regs = ComponentRegistries::new();
        let node = Toggle::new(L2ELNodeId::new("a", 901u64), RestartPolicy::DiscoverOnce);
        regs.register(node.clone()).unwrap();
        let control = ControlPlane::new(regs);
        let id: ComponentId = L2ELNodeId::new("a", 901u64).into();

        control.action(&id, ControlAction::Stop).await.unwrap();
        let err = control.action(&id, ControlAction::Start).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RestartUnsupported(_)));
        assert!(!node.is_running().await);
    }

    #[tokio::test]
    async fn test_unknown_and_passive_components() {
        let regs = ComponentRegistries::new();
        regs.register(Arc::new(Passive(L2BatcherId::new("b", 901u64).into())))
            .unwrap();
        let control = ControlPlane::new(regs);

        let err = control
            .action_for(&L2CLNodeId::new("ghost", 901u64), ControlAction::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownComponent(_)));

        let err = control
            .action_for(&L2BatcherId::new("b", 901u64), ControlAction::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotControllable(_)));
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("start".parse::<ControlAction>().unwrap(), ControlAction::Start);
        assert_eq!("STOP".parse::<ControlAction>().unwrap(), ControlAction::Stop);
        assert!("restart".parse::<ControlAction>().is_err());
        assert_eq!(ControlAction::Stop.to_string(), "stop");
    }
}
