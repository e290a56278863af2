//! Stack file.
//!
//! A stack file describes a devnet: orchestrator settings, payloads to load
//! before deployment, and the node binaries to launch.
//!
//! ```toml
//! [stack]
//! name = "devnet"
//! log_level = "info"
//!
//! [[payload]]
//! name = "rollup"
//! chain = 901
//! file = "rollup.json"
//!
//! [[component]]
//! kind = "L2CLNode"
//! name = "sequencer"
//! chain = 901
//! exec_env = "KONA_NODE_EXEC_PATH"
//! args = ["node", "--datadir", "{datadir}", "--rollup-config", "{payload:rollup/901}"]
//! log_schema = "rust_structured"
//! restart = "restart_safe"
//!
//! [[component.endpoint]]
//! name = "rpc"
//! message = "RPC server bound to address"
//! field = "addr"
//! scheme = "http"
//! ```

use anyhow::{bail, Context};
use futures::FutureExt;
use mamut_core::{ChainId, ComponentId, Kind};
use mamut_orchestrator::{
    before_deploy, payload_key, with_process_node, Combined, LaunchSpec, LocalOrchestrator,
    RestartPolicy, StackConfig,
};
use mamut_supervisor::{LogSchema, Marker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Parsed stack file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackFile {
    /// Orchestrator settings.
    pub stack: StackConfig,

    /// Payloads made available to `{payload:...}` placeholders.
    pub payload: Vec<PayloadEntry>,

    /// Node binaries, launched in file order.
    pub component: Vec<ComponentEntry>,
}

/// A JSON document loaded before deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadEntry {
    /// Payload name.
    pub name: String,

    /// Chain the payload belongs to, if any.
    #[serde(default)]
    pub chain: Option<u64>,

    /// JSON file, relative to the stack file.
    pub file: PathBuf,
}

impl PayloadEntry {
    /// Key the payload is stored under.
    pub fn key(&self) -> String {
        payload_key(&self.name, self.chain.map(ChainId))
    }
}

/// One launched node binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Component kind tag, e.g. `L2CLNode`.
    pub kind: String,

    /// Instance name.
    #[serde(default)]
    pub name: Option<String>,

    /// Chain the component serves.
    #[serde(default)]
    pub chain: Option<u64>,

    /// Binary path.
    #[serde(default)]
    pub exec: Option<String>,

    /// Environment variable holding the binary path.
    #[serde(default)]
    pub exec_env: Option<String>,

    /// Arguments, possibly with placeholders.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment, values possibly with placeholders.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Log format: `go_structured`, `rust_structured` or `plain`.
    #[serde(default = "default_log_schema")]
    pub log_schema: String,

    /// Whether the node survives a control-plane restart.
    #[serde(default)]
    pub restart: RestartPolicy,

    /// Endpoints announced in the logs.
    #[serde(default)]
    pub endpoint: Vec<EndpointEntry>,
}

fn default_log_schema() -> String {
    "plain".to_string()
}

/// How one endpoint is announced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// Endpoint name.
    pub name: String,

    /// Exact log message carrying the address.
    #[serde(default)]
    pub message: Option<String>,

    /// Field holding the address when matching by `message`.
    #[serde(default)]
    pub field: Option<String>,

    /// Message prefix followed by the address.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Scheme prepended to bare addresses.
    #[serde(default)]
    pub scheme: Option<String>,

    /// Whether callers must send an engine JWT.
    #[serde(default)]
    pub auth: bool,
}

impl EndpointEntry {
    fn marker(&self) -> anyhow::Result<Marker> {
        let marker = match (&self.message, &self.field, &self.prefix) {
            (Some(message), Some(field), None) => Marker::message(&self.name, message, field),
            (None, None, Some(prefix)) => Marker::prefix(&self.name, prefix),
            _ => bail!(
                "endpoint {:?} needs either message and field, or prefix",
                self.name
            ),
        };
        Ok(match &self.scheme {
            Some(scheme) => marker.scheme(scheme),
            None => marker,
        })
    }
}

impl ComponentEntry {
    /// The component's identifier.
    pub fn id(&self) -> anyhow::Result<ComponentId> {
        let kind = Kind::parse(self.kind.clone())?;
        Ok(match (&self.name, self.chain) {
            (Some(name), Some(chain)) => ComponentId::name_chain(kind, name, ChainId(chain)),
            (None, Some(chain)) => ComponentId::chain(kind, ChainId(chain)),
            (Some(name), None) => ComponentId::generic(kind, name),
            (None, None) => bail!("component of kind {} needs a name or a chain", self.kind),
        })
    }

    /// Builds the launch description.
    pub fn launch_spec(&self) -> anyhow::Result<LaunchSpec> {
        let mut spec = match (&self.exec, &self.exec_env) {
            (Some(exec), None) => LaunchSpec::new(exec),
            (None, Some(var)) => LaunchSpec::from_env(var)?,
            _ => bail!("component {} needs exactly one of exec or exec_env", self.kind),
        };

        let schema: LogSchema = self
            .log_schema
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        spec = spec
            .args(self.args.iter().cloned())
            .schema(schema)
            .restart(self.restart);
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        for endpoint in &self.endpoint {
            spec = spec.marker(endpoint.marker()?);
            if endpoint.auth {
                spec = spec.auth_endpoint(&endpoint.name);
            }
        }
        Ok(spec)
    }
}

impl StackFile {
    /// Parses a stack file from TOML text.
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Loads a stack file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Checks the file without launching anything.
    ///
    /// Binaries named through `exec_env` must be resolvable at validation
    /// time.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut payloads = BTreeSet::new();
        for payload in &self.payload {
            if !payloads.insert(payload.key()) {
                bail!("duplicate payload {}", payload.key());
            }
        }

        let mut ids = BTreeSet::new();
        for component in &self.component {
            let id = component.id()?;
            if !ids.insert(id.clone()) {
                bail!("duplicate component {id}");
            }
            if component.endpoint.is_empty() {
                bail!("component {id} declares no endpoints");
            }
            component
                .launch_spec()
                .with_context(|| format!("component {id}"))?;
        }
        Ok(())
    }

    /// Builds the option tree: payloads load during `before_deploy`, then
    /// components launch during `after_deploy` in file order.
    ///
    /// Relative payload paths are resolved against `base_dir`.
    pub fn options(&self, base_dir: &Path) -> anyhow::Result<Combined<LocalOrchestrator>> {
        let mut opts = Combined::new();

        for payload in &self.payload {
            let key = payload.key();
            let file = base_dir.join(&payload.file);
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading payload {}", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing payload {}", file.display()))?;
            opts.add(before_deploy(move |orch: &LocalOrchestrator| {
                let result = orch.set_payload(key.clone(), value.clone());
                async move { result }.boxed()
            }));
        }

        for component in &self.component {
            opts.add(with_process_node(component.id()?, component.launch_spec()?));
        }
        Ok(opts)
    }
}
