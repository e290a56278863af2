//! Per-kind component registries.

use crate::component::Component;
use crate::error::{OrchestratorError, Result};
use mamut_core::{ComponentId, Kind, Registry};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registry holding the components of one kind.
pub type KindRegistry = Registry<ComponentId, Arc<dyn Component>>;

/// One [`Registry`] per component kind.
///
/// The outer map is only write-locked the first time a kind is seen; after
/// that every kind has its own lock, so work on unrelated kinds never
/// contends.
#[derive(Clone, Default)]
pub struct ComponentRegistries {
    kinds: Arc<RwLock<BTreeMap<Kind, Arc<KindRegistry>>>>,
}

impl ComponentRegistries {
    /// Creates an empty set of registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry for `kind`, creating it if needed.
    pub fn registry(&self, kind: &Kind) -> Arc<KindRegistry> {
        if let Some(existing) = self.kinds.read().get(kind) {
            return existing.clone();
        }
        self.kinds
            .write()
            .entry(kind.clone())
            .or_insert_with(|| Arc::new(Registry::new()))
            .clone()
    }

    /// Registers a component under its own ID. Duplicate IDs are an error.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<()> {
        let id = component.id();
        if !self.registry(id.kind()).set_if_missing(id.clone(), component) {
            return Err(OrchestratorError::Duplicate(id));
        }
        debug!(id = %id, "registered component");
        Ok(())
    }

    /// Looks up a component.
    pub fn get(&self, id: &ComponentId) -> Option<Arc<dyn Component>> {
        let registry = self.kinds.read().get(id.kind()).cloned()?;
        registry.get(id)
    }

    /// Returns true if a component is registered under `id`.
    pub fn has(&self, id: &ComponentId) -> bool {
        self.get(id).is_some()
    }

    /// Kinds with a registry, in order.
    pub fn kinds(&self) -> Vec<Kind> {
        self.kinds.read().keys().cloned().collect()
    }

    /// Every component, ordered by kind then ID.
    pub fn all(&self) -> Vec<Arc<dyn Component>> {
        let registries: Vec<Arc<KindRegistry>> = self.kinds.read().values().cloned().collect();
        registries.iter().flat_map(|r| r.values()).collect()
    }

    /// Every component ID, ordered by kind then ID.
    pub fn ids(&self) -> Vec<ComponentId> {
        let registries: Vec<Arc<KindRegistry>> = self.kinds.read().values().cloned().collect();
        registries.iter().flat_map(|r| r.keys()).collect()
    }
}

impl std::fmt::Debug for ComponentRegistries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistries")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Endpoint;
    use mamut_core::id::{L2CLNodeId, L2ELNodeId, SupervisorId};

    struct Stub(ComponentId);

    impl Component for Stub {
        fn id(&self) -> ComponentId {
            self.0.clone()
        }

        fn endpoints(&self) -> BTreeMap<String, Endpoint> {
            BTreeMap::new()
        }
    }

    fn stub(id: impl Into<ComponentId>) -> Arc<dyn Component> {
        Arc::new(Stub(id.into()))
    }

    #[test]
    fn test_register_and_lookup() {
        let regs = ComponentRegistries::new();
        regs.register(stub(L2CLNodeId::new("b", 901u64))).unwrap();
        regs.register(stub(L2CLNodeId::new("a", 901u64))).unwrap();
        regs.register(stub(SupervisorId::new("main"))).unwrap();

        let id: ComponentId = L2CLNodeId::new("a", 901u64).into();
        assert!(regs.has(&id));
        assert_eq!(regs.get(&id).unwrap().id(), id);
        assert!(!regs.has(&L2ELNodeId::new("a", 901u64).into()));

        assert_eq!(regs.kinds(), vec![Kind::L2_CL_NODE, Kind::SUPERVISOR]);
        let ids: Vec<String> = regs.ids().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, ["L2CLNode-a-901", "L2CLNode-b-901", "Supervisor-main"]);
        assert_eq!(regs.all().len(), 3);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let regs = ComponentRegistries::new();
        regs.register(stub(L2CLNodeId::new("a", 901u64))).unwrap();
        let err = regs.register(stub(L2CLNodeId::new("a", 901u64))).unwrap_err();
        assert!(matches!(err, OrchestratorError::Duplicate(_)));
        assert!(err.is_topology_error());
    }

    #[test]
    fn test_registry_is_shared_per_kind() {
        let regs = ComponentRegistries::new();
        let a = regs.registry(&Kind::L2_EL_NODE);
        let b = regs.registry(&Kind::L2_EL_NODE);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_registration_of_many_kinds() {
        let regs = ComponentRegistries::new();
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let regs = regs.clone();
                std::thread::spawn(move || {
                    regs.register(stub(L2CLNodeId::new("n", 900 + i))).unwrap();
                    regs.register(stub(L2ELNodeId::new("n", 900 + i))).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(regs.all().len(), 16);
        assert_eq!(regs.kinds().len(), 2);
    }
}
