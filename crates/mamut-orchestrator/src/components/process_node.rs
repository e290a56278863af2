//! Node binaries run as supervised child processes.
//!
//! A [`ProcessNode`] spawns its binary, learns its listening addresses from
//! the log lines the binary prints, and publishes each address behind a
//! stable [`Proxy`]. The proxies are created on the first start and live
//! until the orchestrator's scope closes; later starts only re-point them.

use crate::component::{Component, Endpoint, Lifecycle, RestartPolicy};
use crate::config::ProxySettings;
use crate::error::{OrchestratorError, Result};
use crate::option::{after_deploy, FnOption};
use crate::orchestrator::{LocalOrchestrator, Orchestrator};
use crate::template::{render, LaunchContext};
use async_trait::async_trait;
use futures::FutureExt;
use mamut_core::{ComponentId, Scope};
use mamut_supervisor::{
    upstream_from_url, Discovery, LogEntry, LogSchema, Marker, MarkerSet, Proxy, Stream,
    SubProcess, SupervisorError,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How to launch a node binary and find its endpoints.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, possibly containing placeholders.
    pub args: Vec<String>,
    /// Extra environment, values possibly containing placeholders.
    pub env: Vec<(String, String)>,
    /// Log format the binary emits.
    pub schema: LogSchema,
    /// Endpoint announcements to look for.
    pub markers: MarkerSet,
    /// Endpoints requiring JWT bearer auth.
    pub auth_endpoints: BTreeSet<String>,
    /// Restart capability.
    pub restart: RestartPolicy,
}

impl LaunchSpec {
    /// Creates a spec for `program` with no arguments or endpoints.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            schema: LogSchema::Plain,
            markers: MarkerSet::new(),
            auth_endpoints: BTreeSet::new(),
            restart: RestartPolicy::RestartSafe,
        }
    }

    /// Creates a spec whose program path is read from environment variable
    /// `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(path) if !path.is_empty() => Ok(Self::new(path)),
            _ => Err(OrchestratorError::Configuration(format!(
                "environment variable {var} must point at the binary"
            ))),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the log schema.
    pub fn schema(mut self, schema: LogSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Adds an endpoint announcement marker.
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers = self.markers.marker(marker);
        self
    }

    /// Marks an endpoint as requiring JWT bearer auth.
    pub fn auth_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.auth_endpoints.insert(endpoint.into());
        self
    }

    /// Sets the restart capability.
    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    fn resolve(&self, ctx: &LaunchContext<'_>) -> Result<Self> {
        let args = self
            .args
            .iter()
            .map(|a| render(a, ctx))
            .collect::<Result<Vec<_>>>()?;
        let env = self
            .env
            .iter()
            .map(|(k, v)| Ok((k.clone(), render(v, ctx)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            args,
            env,
            ..self.clone()
        })
    }
}

struct StableEndpoint {
    proxy: Proxy,
    scheme: String,
}

/// A node binary supervised as a child process.
pub struct ProcessNode {
    id: ComponentId,
    spec: LaunchSpec,
    process: SubProcess,
    markers: Arc<MarkerSet>,
    discovery: Arc<RwLock<Arc<Discovery>>>,
    endpoints: Mutex<BTreeMap<String, StableEndpoint>>,
    scope: Scope,
    proxy: ProxySettings,
    discovery_timeout: Duration,
    stopped_once: AtomicBool,
    start_lock: tokio::sync::Mutex<()>,
}

impl ProcessNode {
    /// Creates a node from a fully resolved spec. Nothing is spawned yet.
    pub fn new(id: ComponentId, spec: LaunchSpec, orch: &LocalOrchestrator) -> Self {
        let markers = Arc::new(spec.markers.clone());
        let discovery = Arc::new(RwLock::new(Arc::new(Discovery::new(markers.endpoints()))));

        let sink_markers = markers.clone();
        let sink_discovery = discovery.clone();
        let process = SubProcess::builder(id.to_string(), orch.scope())
            .schema(spec.schema)
            .stop_grace(orch.config().stop_grace())
            .sink(Arc::new(move |_stream: Stream, entry: &LogEntry| {
                let current = sink_discovery.read().clone();
                current.observe(sink_markers.as_ref(), entry);
            }))
            .build();

        Self {
            id,
            spec,
            process,
            markers,
            discovery,
            endpoints: Mutex::new(BTreeMap::new()),
            scope: orch.scope().clone(),
            proxy: orch.config().proxy.clone(),
            discovery_timeout: orch.config().discovery_timeout(),
            stopped_once: AtomicBool::new(false),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolves `spec` against `orch`, then creates and starts the node.
    ///
    /// Fails without spawning if `id` is already registered.
    pub async fn launch(
        orch: &LocalOrchestrator,
        id: ComponentId,
        spec: LaunchSpec,
    ) -> Result<Arc<Self>> {
        if orch.registries().has(&id) {
            return Err(OrchestratorError::Duplicate(id));
        }
        let resolved = spec.resolve(&LaunchContext::new(orch, &id))?;
        let node = Arc::new(Self::new(id, resolved, orch));
        node.start().await?;
        Ok(node)
    }

    /// The supervised process.
    pub fn process(&self) -> &SubProcess {
        &self.process
    }

    async fn stable_endpoint(&self, name: &str, scheme: &str) -> Result<Proxy> {
        if let Some(existing) = self.endpoints.lock().get(name) {
            return Ok(existing.proxy.clone());
        }
        let proxy = Proxy::start(&self.proxy.bind_addr(), self.proxy.proxy_config()).await?;
        let closing = proxy.clone();
        self.scope
            .cleanup(format!("proxy {}/{name}", self.id), move || async move {
                closing.close().await;
            })?;
        info!(id = %self.id, endpoint = name, addr = %proxy.addr(), "created stable endpoint");
        self.endpoints.lock().insert(
            name.to_string(),
            StableEndpoint {
                proxy: proxy.clone(),
                scheme: scheme.to_string(),
            },
        );
        Ok(proxy)
    }

    async fn publish(&self, discovery: &Discovery) -> Result<()> {
        let cancel = self.scope.cancel_token();
        let found = tokio::select! {
            found = discovery.wait_all(&cancel, self.discovery_timeout) => found?,
            _ = self.process.wait() => {
                let missing = discovery
                    .endpoints()
                    .into_iter()
                    .find(|e| discovery.get(e).is_none())
                    .unwrap_or_default();
                return Err(SupervisorError::ExitedEarly {
                    name: self.id.to_string(),
                    endpoint: missing,
                }
                .into());
            }
        };

        for (name, address) in found {
            let scheme = address
                .split_once("://")
                .map(|(scheme, _)| scheme)
                .unwrap_or("http");
            let proxy = self.stable_endpoint(&name, scheme).await?;
            proxy.set_upstream(upstream_from_url(&address)?);
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for ProcessNode {
    async fn start(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        if self.process.is_running().await {
            return Err(OrchestratorError::AlreadyRunning(self.id.clone()));
        }

        let discovery = Arc::new(Discovery::new(self.markers.endpoints()));
        *self.discovery.write() = discovery.clone();
        self.process
            .start(&self.spec.program, &self.spec.args, &self.spec.env)
            .await?;

        if let Err(err) = self.publish(&discovery).await {
            warn!(id = %self.id, error = %err, "start failed, killing process");
            if let Err(kill_err) = self.process.kill().await {
                warn!(id = %self.id, error = %kill_err, "failed to kill process");
            }
            return Err(err);
        }
        info!(id = %self.id, "component started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        let outcome = self.process.stop(true).await?;
        self.stopped_once.store(true, Ordering::SeqCst);
        info!(id = %self.id, forced = outcome.was_forced(), "component stopped");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.process.is_running().await
    }

    fn restart_policy(&self) -> RestartPolicy {
        self.spec.restart
    }

    fn stopped_once(&self) -> bool {
        self.stopped_once.load(Ordering::SeqCst)
    }
}

impl Component for ProcessNode {
    fn id(&self) -> ComponentId {
        self.id.clone()
    }

    fn endpoints(&self) -> BTreeMap<String, Endpoint> {
        self.endpoints
            .lock()
            .iter()
            .map(|(name, stable)| {
                let endpoint = Endpoint {
                    url: stable.proxy.url(&stable.scheme),
                    auth: self.spec.auth_endpoints.contains(name),
                };
                (name.clone(), endpoint)
            })
            .collect()
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }
}

/// Option launching a node binary during `after_deploy` and registering it
/// under `id`.
pub fn with_process_node(
    id: impl Into<ComponentId>,
    spec: LaunchSpec,
) -> FnOption<LocalOrchestrator> {
    let id = id.into();
    after_deploy(move |orch: &LocalOrchestrator| {
        let id = id.clone();
        let spec = spec.clone();
        async move {
            let node = ProcessNode::launch(orch, id.clone(), spec).await?;
            if let Err(err) = orch.registries().register(node.clone()) {
                if let Err(kill_err) = node.process().kill().await {
                    warn!(id = %id, error = %kill_err, "failed to kill unregistered node");
                }
                return Err(err);
            }
            Ok(())
        }
        .boxed()
    })
}
