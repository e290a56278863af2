//! Hydrated, query-only views of a devnet.
//!
//! A [`System`] is what test code sees: one [`Frontend`] per component,
//! bound to the component's proxy-stable endpoints. Front-ends are looked
//! up with matchers and carry labels and links that are private to the view
//! they belong to.
//!
//! # Example
//!
//! ```ignore
//! use mamut_core::id::{Kind, L2CLNodeId};
//! use mamut_core::matcher::{with_label, MatcherExt};
//!
//! let system = orch.hydrate_system(&opt)?;
//! let seq = system.one(&Kind::L2_CL_NODE, &L2CLNodeId::new("sequencer", 901u64))?;
//! seq.set_label("role", "sequencer");
//!
//! let head: serde_json::Value = seq.rpc("rpc")?.call("optimism_syncStatus", json!([])).await?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::component::Endpoint;
use crate::error::{OrchestratorError, Result};
use crate::jwt::JwtSecret;
use crate::rpc::{RpcAuth, RpcClient};
use mamut_core::{ChainId, ComponentId, Id, Identifiable, Kind, Labeled, Matcher};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

struct RpcContext {
    http: OnceLock<reqwest::Client>,
    secret: Option<JwtSecret>,
    clock: Arc<dyn Clock>,
}

impl RpcContext {
    fn http(&self) -> reqwest::Client {
        self.http.get_or_init(reqwest::Client::new).clone()
    }
}

/// A query-only view of the devnet produced by one hydration.
#[derive(Clone)]
pub struct System {
    frontends: Arc<RwLock<BTreeMap<ComponentId, Frontend>>>,
    rpc: Arc<RpcContext>,
}

impl System {
    /// Creates an empty view using the host clock and no engine secret.
    pub fn new() -> Self {
        Self::with_context(None, Arc::new(SystemClock))
    }

    /// Creates an empty view whose authenticated endpoints sign requests
    /// with `secret` at times read from `clock`.
    pub fn with_context(secret: Option<JwtSecret>, clock: Arc<dyn Clock>) -> Self {
        Self {
            frontends: Arc::new(RwLock::new(BTreeMap::new())),
            rpc: Arc::new(RpcContext {
                http: OnceLock::new(),
                secret,
                clock,
            }),
        }
    }

    /// Creates a detached front-end bound to this view's RPC context.
    pub fn frontend(&self, id: ComponentId, endpoints: BTreeMap<String, Endpoint>) -> Frontend {
        Frontend {
            inner: Arc::new(FrontendInner {
                id,
                endpoints,
                labels: RwLock::new(BTreeMap::new()),
                links: RwLock::new(Vec::new()),
                clients: Mutex::new(HashMap::new()),
                rpc: self.rpc.clone(),
            }),
        }
    }

    /// Attaches a front-end. Each ID may be attached once per view.
    pub fn attach(&self, frontend: Frontend) -> Result<()> {
        let mut frontends = self.frontends.write();
        let id = frontend.id();
        if frontends.contains_key(&id) {
            return Err(OrchestratorError::Duplicate(id));
        }
        frontends.insert(id, frontend);
        Ok(())
    }

    /// Looks up a front-end by ID.
    pub fn get(&self, id: &ComponentId) -> Option<Frontend> {
        self.frontends.read().get(id).cloned()
    }

    /// Looks up a front-end by typed ID.
    pub fn node<I: Id>(&self, id: &I) -> Result<Frontend> {
        let erased = id.erase();
        self.get(&erased)
            .ok_or(OrchestratorError::UnknownComponent(erased))
    }

    /// Every front-end in ID order.
    pub fn all(&self) -> Vec<Frontend> {
        self.frontends.read().values().cloned().collect()
    }

    /// Number of attached front-ends.
    pub fn len(&self) -> usize {
        self.frontends.read().len()
    }

    /// Returns true if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.frontends.read().is_empty()
    }

    /// Front-ends of one kind, in ID order.
    pub fn kind(&self, kind: &Kind) -> Vec<Frontend> {
        self.frontends
            .read()
            .values()
            .filter(|f| f.id().kind() == kind)
            .cloned()
            .collect()
    }

    /// Front-ends of one kind selected by `matcher`.
    pub fn select<M: Matcher<Frontend> + ?Sized>(&self, kind: &Kind, matcher: &M) -> Vec<Frontend> {
        matcher.matches(&self.kind(kind))
    }

    /// The single front-end of one kind selected by `matcher`.
    pub fn one<M: Matcher<Frontend> + ?Sized>(&self, kind: &Kind, matcher: &M) -> Result<Frontend> {
        Ok(matcher.one(&self.kind(kind))?)
    }

    /// Chain-scoped view over the components of `chain`.
    pub fn network(&self, chain: impl Into<ChainId>) -> NetworkView {
        let chain = chain.into();
        let members = self
            .frontends
            .read()
            .values()
            .filter(|f| f.id().chain_id() == Some(chain))
            .cloned()
            .collect();
        NetworkView { chain, members }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.frontends.read().keys().map(|id| id.to_string()).collect();
        f.debug_struct("System").field("components", &ids).finish()
    }
}

/// The components of one chain.
#[derive(Debug, Clone)]
pub struct NetworkView {
    chain: ChainId,
    members: Vec<Frontend>,
}

impl NetworkView {
    /// The chain this view covers.
    pub fn chain_id(&self) -> ChainId {
        self.chain
    }

    /// Every member in ID order.
    pub fn all(&self) -> Vec<Frontend> {
        self.members.clone()
    }

    /// Members of one kind.
    pub fn kind(&self, kind: &Kind) -> Vec<Frontend> {
        self.members
            .iter()
            .filter(|f| f.id().kind() == kind)
            .cloned()
            .collect()
    }

    /// Members of one kind selected by `matcher`.
    pub fn select<M: Matcher<Frontend> + ?Sized>(&self, kind: &Kind, matcher: &M) -> Vec<Frontend> {
        matcher.matches(&self.kind(kind))
    }

    /// The single member of one kind selected by `matcher`.
    pub fn one<M: Matcher<Frontend> + ?Sized>(&self, kind: &Kind, matcher: &M) -> Result<Frontend> {
        Ok(matcher.one(&self.kind(kind))?)
    }
}

struct FrontendInner {
    id: ComponentId,
    endpoints: BTreeMap<String, Endpoint>,
    labels: RwLock<BTreeMap<String, String>>,
    links: RwLock<Vec<(String, ComponentId)>>,
    clients: Mutex<HashMap<String, RpcClient>>,
    rpc: Arc<RpcContext>,
}

/// A client-side handle on one component.
#[derive(Clone)]
pub struct Frontend {
    inner: Arc<FrontendInner>,
}

impl Frontend {
    /// The component's ID.
    pub fn id(&self) -> ComponentId {
        self.inner.id.clone()
    }

    /// Stable endpoints by name.
    pub fn endpoints(&self) -> &BTreeMap<String, Endpoint> {
        &self.inner.endpoints
    }

    /// URL of the named endpoint.
    pub fn endpoint_url(&self, name: &str) -> Result<&str> {
        self.inner
            .endpoints
            .get(name)
            .map(|e| e.url.as_str())
            .ok_or_else(|| OrchestratorError::UnknownEndpoint {
                component: self.id(),
                endpoint: name.to_string(),
            })
    }

    /// JSON-RPC client for the named endpoint, created on first use.
    pub fn rpc(&self, name: &str) -> Result<RpcClient> {
        if let Some(client) = self.inner.clients.lock().get(name) {
            return Ok(client.clone());
        }
        let endpoint = self.inner.endpoints.get(name).ok_or_else(|| {
            OrchestratorError::UnknownEndpoint {
                component: self.id(),
                endpoint: name.to_string(),
            }
        })?;

        let mut client = RpcClient::new(endpoint.url.clone(), self.inner.rpc.http());
        if endpoint.auth {
            let secret = self.inner.rpc.secret.clone().ok_or_else(|| {
                OrchestratorError::Jwt(format!("{} endpoint {name} needs a jwt secret", self.id()))
            })?;
            client = client.with_auth(RpcAuth {
                secret,
                clock: self.inner.rpc.clock.clone(),
            });
        }
        self.inner
            .clients
            .lock()
            .insert(name.to_string(), client.clone());
        Ok(client)
    }

    /// Sets a view-local label.
    pub fn set_label(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.labels.write().insert(key.into(), value.into());
    }

    /// Records a relation to another component.
    pub fn link(&self, rel: impl Into<String>, target: ComponentId) {
        self.inner.links.write().push((rel.into(), target));
    }

    /// Targets linked under `rel`, in link order.
    pub fn linked(&self, rel: &str) -> Vec<ComponentId> {
        self.inner
            .links
            .read()
            .iter()
            .filter(|(r, _)| r == rel)
            .map(|(_, target)| target.clone())
            .collect()
    }
}

impl Identifiable for Frontend {
    type Id = ComponentId;

    fn id(&self) -> ComponentId {
        self.inner.id.clone()
    }
}

impl Labeled for Frontend {
    fn label(&self, key: &str) -> Option<String> {
        self.inner.labels.read().get(key).cloned()
    }
}

impl fmt::Debug for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frontend")
            .field("id", &self.inner.id.to_string())
            .field("endpoints", &self.inner.endpoints)
            .finish()
    }
}
