//! Switches for sub-modules embedded in another component.
//!
//! Some controllable parts of a devnet are not processes of their own, for
//! example the sequencing loop inside a consensus node. An
//! [`EmbeddedSwitch`] exposes such a part to the control plane: the host
//! watches the switch and pauses or resumes the sub-module accordingly.

use crate::component::{Component, Endpoint, Lifecycle};
use crate::error::{OrchestratorError, Result};
use crate::option::{after_deploy, FnOption};
use crate::orchestrator::{LocalOrchestrator, Orchestrator};
use async_trait::async_trait;
use futures::FutureExt;
use mamut_core::ComponentId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Relation name linking a switch to its host.
pub const HOST_LINK: &str = "host";

struct Inner {
    id: ComponentId,
    host: ComponentId,
    state: watch::Sender<bool>,
    stopped_once: AtomicBool,
}

/// An on/off switch observed by a host component.
#[derive(Clone)]
pub struct EmbeddedSwitch {
    inner: Arc<Inner>,
}

impl EmbeddedSwitch {
    /// Creates a switch in the on state.
    pub fn new(id: impl Into<ComponentId>, host: impl Into<ComponentId>) -> Self {
        let (state, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                host: host.into(),
                state,
                stopped_once: AtomicBool::new(false),
            }),
        }
    }

    /// Receiver the host watches.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Current state.
    pub fn is_on(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// The host component.
    pub fn host(&self) -> &ComponentId {
        &self.inner.host
    }
}

#[async_trait]
impl Lifecycle for EmbeddedSwitch {
    async fn start(&self) -> Result<()> {
        if self.inner.state.send_replace(true) {
            return Err(OrchestratorError::AlreadyRunning(self.inner.id.clone()));
        }
        info!(id = %self.inner.id, host = %self.inner.host, "switch on");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.inner.state.send_replace(false) {
            info!(id = %self.inner.id, host = %self.inner.host, "switch off");
        }
        self.inner.stopped_once.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.is_on()
    }

    fn stopped_once(&self) -> bool {
        self.inner.stopped_once.load(Ordering::SeqCst)
    }
}

impl Component for EmbeddedSwitch {
    fn id(&self) -> ComponentId {
        self.inner.id.clone()
    }

    fn endpoints(&self) -> BTreeMap<String, Endpoint> {
        BTreeMap::new()
    }

    fn links(&self) -> Vec<(String, ComponentId)> {
        vec![(HOST_LINK.to_string(), self.inner.host.clone())]
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }
}

/// Option registering `switch` during `after_deploy`. The host must already
/// be registered.
pub fn with_embedded_switch(switch: EmbeddedSwitch) -> FnOption<LocalOrchestrator> {
    after_deploy(move |orch: &LocalOrchestrator| {
        let switch = switch.clone();
        async move {
            if !orch.registries().has(switch.host()) {
                return Err(OrchestratorError::missing_dependency(
                    switch.id().to_string(),
                    switch.host().to_string(),
                ));
            }
            orch.registries().register(Arc::new(switch))
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::in_process::{line_echo_service, with_in_process_service};
    use crate::config::StackConfig;
    use crate::control::ControlAction;
    use crate::option::{apply_option_lifecycle, hydrate_system, Combined};
    use mamut_core::id::{SequencerId, TestSequencerId};

    #[tokio::test]
    async fn test_switch_toggles_host_view() {
        let orch = LocalOrchestrator::new(StackConfig::default());
        let host = TestSequencerId::new("ts");
        let id = SequencerId::new("driver", 901u64);
        let switch = EmbeddedSwitch::new(id.clone(), host.clone());
        let mut watched = switch.subscribe();

        let opt = Combined::new()
            .with(with_in_process_service(host.clone(), "rpc", "tcp", line_echo_service("h")))
            .with(with_embedded_switch(switch.clone()));
        apply_option_lifecycle(&opt, &orch).await.unwrap();

        let control = orch.control_plane();
        control.action_for(&id, ControlAction::Stop).await.unwrap();
        watched.changed().await.unwrap();
        assert!(!*watched.borrow());

        control.action_for(&id, ControlAction::Start).await.unwrap();
        watched.changed().await.unwrap();
        assert!(*watched.borrow());

        let system = hydrate_system(&orch, &opt).unwrap();
        let frontend = system.node(&id).unwrap();
        assert_eq!(frontend.linked(HOST_LINK), vec![ComponentId::from(host)]);
        orch.close().await;
    }

    #[tokio::test]
    async fn test_switch_requires_host() {
        let orch = LocalOrchestrator::new(StackConfig::default());
        let switch = EmbeddedSwitch::new(
            SequencerId::new("driver", 901u64),
            TestSequencerId::new("absent"),
        );
        let err = apply_option_lifecycle(&with_embedded_switch(switch), &orch)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingDependency { .. }));
        orch.close().await;
    }

    #[tokio::test]
    async fn test_start_when_on_is_rejected() {
        let switch = EmbeddedSwitch::new(
            SequencerId::new("driver", 901u64),
            TestSequencerId::new("ts"),
        );
        assert!(switch.is_on());
        assert!(matches!(
            switch.start().await,
            Err(OrchestratorError::AlreadyRunning(_))
        ));
        switch.stop().await.unwrap();
        assert!(!switch.is_on());
        assert!(switch.stopped_once());
        switch.start().await.unwrap();
        assert!(switch.is_on());
    }
}
