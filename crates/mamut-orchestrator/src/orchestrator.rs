//! Orchestrators: the mutable builder state behind a devnet.
//!
//! An orchestrator owns the per-kind registries that options fill, plus
//! singletons shared by every component (derived keys, JWT material, the
//! clock, opaque payloads). It lives exactly as long as its [`Scope`].

use crate::clock::{Clock, SystemClock, TimeTravelClock};
use crate::config::StackConfig;
use crate::control::ControlPlane;
use crate::error::{OrchestratorError, Result};
use crate::jwt::JwtSecret;
use crate::keys::DevKeys;
use crate::registries::ComponentRegistries;
use crate::system::System;
use mamut_core::{ChainId, ComponentId, Registry, Scope};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Capabilities every orchestrator backend provides.
pub trait Orchestrator: Send + Sync + 'static {
    /// Scope owning every resource the orchestrator creates.
    fn scope(&self) -> &Scope;

    /// Per-kind component registries.
    fn registries(&self) -> &ComponentRegistries;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Access for checked downcasts to the concrete backend.
    fn as_any(&self) -> &dyn Any;

    /// Creates an empty view ready to be hydrated.
    fn new_system(&self) -> System {
        System::new()
    }

    /// Attaches a fresh front-end for every registered component, in kind
    /// then ID order.
    fn hydrate(&self, system: &System) -> Result<()> {
        for component in self.registries().all() {
            component.hydrate(system)?;
        }
        debug!(components = system.len(), backend = self.backend(), "hydrated system");
        Ok(())
    }

    /// Runtime start/stop of registered components.
    fn control_plane(&self) -> ControlPlane {
        ControlPlane::new(self.registries().clone())
    }
}

/// Payload key for `name`, optionally scoped to one chain.
pub fn payload_key(name: &str, chain: Option<ChainId>) -> String {
    match chain {
        Some(chain) => format!("{name}/{chain}"),
        None => name.to_string(),
    }
}

/// Orchestrator running every component as a local process or task.
pub struct LocalOrchestrator {
    config: StackConfig,
    scope: Scope,
    registries: ComponentRegistries,
    keys: OnceLock<DevKeys>,
    jwt: Mutex<Option<(JwtSecret, PathBuf)>>,
    time_travel: OnceLock<TimeTravelClock>,
    payloads: Registry<String, Value>,
    payload_files: Mutex<HashMap<String, PathBuf>>,
    datadirs: Mutex<HashMap<ComponentId, PathBuf>>,
}

impl LocalOrchestrator {
    /// Creates an orchestrator with a root scope named after the stack.
    pub fn new(config: StackConfig) -> Self {
        let scope = Scope::new(config.name.clone());
        Self::with_scope(config, scope)
    }

    /// Creates an orchestrator owned by an existing scope.
    pub fn with_scope(config: StackConfig, scope: Scope) -> Self {
        let orch = Self {
            config,
            scope,
            registries: ComponentRegistries::new(),
            keys: OnceLock::new(),
            jwt: Mutex::new(None),
            time_travel: OnceLock::new(),
            payloads: Registry::new(),
            payload_files: Mutex::new(HashMap::new()),
            datadirs: Mutex::new(HashMap::new()),
        };
        if orch.config.time_travel {
            orch.enable_time_travel();
        }
        orch
    }

    /// Stack configuration.
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Dev key derivation for the configured seed.
    pub fn keys(&self) -> &DevKeys {
        self.keys.get_or_init(|| DevKeys::new(&self.config.seed))
    }

    fn jwt_material(&self) -> Result<(JwtSecret, PathBuf)> {
        let mut jwt = self.jwt.lock();
        if let Some(material) = jwt.as_ref() {
            return Ok(material.clone());
        }
        let secret = JwtSecret::random();
        let path = self.scope.temp_dir()?.join("jwt.hex");
        secret.write_to(&path)?;
        info!(path = %path.display(), "generated jwt secret");
        *jwt = Some((secret.clone(), path.clone()));
        Ok((secret, path))
    }

    /// The shared engine secret, generated on first use.
    pub fn jwt_secret(&self) -> Result<JwtSecret> {
        Ok(self.jwt_material()?.0)
    }

    /// Path of the file holding the engine secret, written on first use.
    pub fn jwt_path(&self) -> Result<PathBuf> {
        Ok(self.jwt_material()?.1)
    }

    /// Installs the time-travel clock. Later calls return the same clock.
    pub fn enable_time_travel(&self) -> TimeTravelClock {
        self.time_travel
            .get_or_init(|| {
                info!("time travel enabled");
                TimeTravelClock::new()
            })
            .clone()
    }

    /// The time-travel clock, if enabled.
    pub fn time_travel(&self) -> Option<TimeTravelClock> {
        self.time_travel.get().cloned()
    }

    /// The clock components should read.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self.time_travel.get() {
            Some(clock) => Arc::new(clock.clone()),
            None => Arc::new(SystemClock),
        }
    }

    /// Stores an opaque payload. Each key may be set once.
    pub fn set_payload(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if !self.payloads.set_if_missing(key.clone(), value) {
            return Err(OrchestratorError::DuplicatePayload(key));
        }
        debug!(payload = %key, "stored payload");
        Ok(())
    }

    /// Returns a stored payload.
    pub fn payload(&self, key: &str) -> Result<Value> {
        self.payloads
            .get(&key.to_string())
            .ok_or_else(|| OrchestratorError::PayloadNotFound(key.to_string()))
    }

    /// Writes a payload to a JSON file and returns its path. The file is
    /// written once and reused.
    pub fn payload_file(&self, key: &str) -> Result<PathBuf> {
        let mut files = self.payload_files.lock();
        if let Some(path) = files.get(key) {
            return Ok(path.clone());
        }
        let value = self.payload(key)?;
        let file_name = format!("{}.json", key.replace(['/', '\\'], "-"));
        let path = self.scope.temp_dir()?.join(file_name);
        fs::write(&path, serde_json::to_vec_pretty(&value)?)?;
        files.insert(key.to_string(), path.clone());
        Ok(path)
    }

    /// Data directory of a component, created on first use.
    pub fn datadir(&self, id: &ComponentId) -> Result<PathBuf> {
        let mut dirs = self.datadirs.lock();
        if let Some(path) = dirs.get(id) {
            return Ok(path.clone());
        }
        let path = self.scope.temp_dir()?;
        debug!(id = %id, path = %path.display(), "allocated datadir");
        dirs.insert(id.clone(), path.clone());
        Ok(path)
    }

    /// URL of a registered component's stable endpoint.
    pub fn endpoint_url(&self, id: &ComponentId, endpoint: &str) -> Result<String> {
        let component = self
            .registries
            .get(id)
            .ok_or_else(|| OrchestratorError::missing_dependency(endpoint, id.to_string()))?;
        component
            .endpoints()
            .remove(endpoint)
            .map(|e| e.url)
            .ok_or_else(|| OrchestratorError::UnknownEndpoint {
                component: id.clone(),
                endpoint: endpoint.to_string(),
            })
    }

    /// Closes the scope, stopping every component and removing temp files.
    pub async fn close(&self) {
        self.scope.close().await;
    }
}

impl Orchestrator for LocalOrchestrator {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn registries(&self) -> &ComponentRegistries {
        &self.registries
    }

    fn backend(&self) -> &'static str {
        "local"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn new_system(&self) -> System {
        let secret = self.jwt.lock().as_ref().map(|(secret, _)| secret.clone());
        System::with_context(secret, self.clock())
    }
}

impl std::fmt::Debug for LocalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalOrchestrator")
            .field("name", &self.config.name)
            .field("registries", &self.registries)
            .finish_non_exhaustive()
    }
}
