//! Services running as tasks inside the orchestrator process.

use crate::component::{Component, Endpoint, Lifecycle};
use crate::error::{OrchestratorError, Result};
use crate::option::{after_deploy, FnOption};
use crate::orchestrator::{LocalOrchestrator, Orchestrator};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use mamut_core::{ComponentId, Scope};
use mamut_supervisor::Proxy;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Body of an in-process service.
///
/// Receives a freshly bound listener and must return once the token is
/// cancelled.
pub type ServiceFn =
    Arc<dyn Fn(TcpListener, CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A tokio service bound to an ephemeral port and fronted by a stable proxy.
///
/// Every start binds a new listener and re-points the proxy, so clients keep
/// using the same address across restarts.
pub struct InProcessService {
    id: ComponentId,
    endpoint: String,
    scheme: String,
    proxy: Proxy,
    service: ServiceFn,
    bind_host: String,
    scope: Scope,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl InProcessService {
    /// Creates the service and its stable endpoint. The service is not
    /// started.
    pub async fn new(
        orch: &LocalOrchestrator,
        id: ComponentId,
        endpoint: impl Into<String>,
        scheme: impl Into<String>,
        service: ServiceFn,
    ) -> Result<Arc<Self>> {
        let settings = &orch.config().proxy;
        let proxy = Proxy::start(&settings.bind_addr(), settings.proxy_config()).await?;
        let closing = proxy.clone();
        orch.scope()
            .cleanup(format!("proxy {id}"), move || async move {
                closing.close().await;
            })?;

        Ok(Arc::new(Self {
            id,
            endpoint: endpoint.into(),
            scheme: scheme.into(),
            proxy,
            service,
            bind_host: settings.bind_host.clone(),
            scope: orch.scope().clone(),
            running: tokio::sync::Mutex::new(None),
        }))
    }

    /// The stable URL clients should use.
    pub fn url(&self) -> String {
        self.proxy.url(&self.scheme)
    }
}

#[async_trait]
impl Lifecycle for InProcessService {
    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(OrchestratorError::AlreadyRunning(self.id.clone()));
        }

        let listener = TcpListener::bind(format!("{}:0", self.bind_host)).await?;
        let addr = listener.local_addr()?;
        let cancel = self.scope.cancel_token().child_token();
        let task = tokio::spawn((self.service)(listener, cancel.clone()));
        self.proxy.set_upstream(addr.to_string());

        info!(id = %self.id, upstream = %addr, url = %self.url(), "service started");
        *running = Some(Running { cancel, task });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(Running { cancel, task }) = self.running.lock().await.take() else {
            return Ok(());
        };
        cancel.cancel();
        if let Err(err) = task.await {
            warn!(id = %self.id, error = %err, "service task failed");
        }
        info!(id = %self.id, "service stopped");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

impl Component for InProcessService {
    fn id(&self) -> ComponentId {
        self.id.clone()
    }

    fn endpoints(&self) -> BTreeMap<String, Endpoint> {
        BTreeMap::from([(self.endpoint.clone(), Endpoint::new(self.url()))])
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }
}

/// Option creating, starting and registering an in-process service during
/// `after_deploy`.
pub fn with_in_process_service(
    id: impl Into<ComponentId>,
    endpoint: impl Into<String>,
    scheme: impl Into<String>,
    service: ServiceFn,
) -> FnOption<LocalOrchestrator> {
    let id = id.into();
    let endpoint = endpoint.into();
    let scheme = scheme.into();
    after_deploy(move |orch: &LocalOrchestrator| {
        let (id, endpoint, scheme, service) =
            (id.clone(), endpoint.clone(), scheme.clone(), service.clone());
        async move {
            if orch.registries().has(&id) {
                return Err(OrchestratorError::Duplicate(id));
            }
            let svc = InProcessService::new(orch, id, endpoint, scheme, service).await?;
            svc.start().await?;
            if let Err(err) = orch.registries().register(svc.clone()) {
                svc.stop().await?;
                return Err(err);
            }
            Ok(())
        }
        .boxed()
    })
}

/// A line-oriented service that answers every line with `<tag>:<line>`.
///
/// Connections are closed when the service is stopped.
pub fn line_echo_service(tag: impl Into<String>) -> ServiceFn {
    let tag: Arc<str> = Arc::from(tag.into());
    Arc::new(move |listener: TcpListener, cancel: CancellationToken| {
        let tag = tag.clone();
        async move {
            let tracker = TaskTracker::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((sock, peer)) = accepted else { continue };
                        debug!(peer = %peer, "echo connection");
                        let (tag, cancel) = (tag.clone(), cancel.clone());
                        tracker.spawn(async move {
                            let (read, mut write) = sock.into_split();
                            let mut lines = BufReader::new(read).lines();
                            loop {
                                let line = tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    line = lines.next_line() => line,
                                };
                                let Ok(Some(line)) = line else { break };
                                if write.write_all(format!("{tag}:{line}\n").as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                        });
                    }
                }
            }
            tracker.close();
            tracker.wait().await;
        }
        .boxed()
    })
}
