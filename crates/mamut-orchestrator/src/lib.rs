//! # Mamut Orchestrator - Devnet Assembly and Control
//!
//! The orchestrator brings up a devnet from a tree of composable options,
//! keeps every component in typed registries, hands test code query-only
//! [`System`] views of the result, and starts or stops components at run
//! time through a [`ControlPlane`].
//!
//! ## Overview
//!
//! - **Options**: [`StackOption`]s contribute hooks to four global phases;
//!   every option's hook for a phase runs before any option's hook for the
//!   next phase
//! - **Orchestrator**: [`LocalOrchestrator`] owns the scope, registries,
//!   payloads, data directories and lazily created shared state such as the
//!   engine JWT secret and dev keys
//! - **Components**: supervised processes, in-process services and embedded
//!   switches, all fronted by stable endpoints
//! - **Hydration**: each call produces an independent [`System`] of
//!   [`Frontend`]s
//!
//! ## Example
//!
//! ```ignore
//! use mamut_orchestrator::{
//!     apply_option_lifecycle, hydrate_system, Combined, ControlAction, LaunchSpec,
//!     LocalOrchestrator, Orchestrator, StackConfig, with_process_node,
//! };
//! use mamut_core::id::L2CLNodeId;
//!
//! let orch = LocalOrchestrator::new(StackConfig::from_file("devnet.toml")?);
//! let seq = L2CLNodeId::new("sequencer", 901u64);
//! let opt = Combined::new().with(with_process_node(
//!     seq.clone(),
//!     LaunchSpec::from_env("KONA_NODE_EXEC_PATH")?
//!         .args(["node", "--datadir", "{datadir}"]),
//! ));
//!
//! apply_option_lifecycle(&opt, &orch).await?;
//! let system = hydrate_system(&orch, &opt)?;
//! let rpc = system.node(&seq)?.rpc("rpc")?;
//!
//! orch.control_plane().action_for(&seq, ControlAction::Stop).await?;
//! orch.control_plane().action_for(&seq, ControlAction::Start).await?;
//! orch.close().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod clock;
pub mod component;
pub mod components;
pub mod config;
pub mod control;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod option;
pub mod orchestrator;
pub mod registries;
pub mod rpc;
pub mod system;
pub mod telemetry;
pub mod template;

// Re-export commonly used types at the crate root
pub use clock::{Clock, SystemClock, TimeTravelClock};
pub use component::{Component, Endpoint, Lifecycle, RestartPolicy};
pub use components::{
    line_echo_service, with_embedded_switch, with_in_process_service, with_process_node,
    EmbeddedSwitch, InProcessService, LaunchSpec, ProcessNode, ServiceFn,
};
pub use config::{ConfigError, ProxySettings, StackConfig, TimeoutConfig};
pub use control::{ControlAction, ControlPlane};
pub use error::{OrchestratorError, Result};
pub use jwt::JwtSecret;
pub use keys::{DevKey, DevKeys};
pub use option::{
    after_deploy, apply_option_lifecycle, before_deploy, combine, deploy, finally,
    hydrate_system, make_common, post_hydrate, pre_hydrate, Combined, Common, FnOption, Phase,
    StackOption,
};
pub use orchestrator::{payload_key, LocalOrchestrator, Orchestrator};
pub use registries::{ComponentRegistries, KindRegistry};
pub use rpc::{RpcAuth, RpcClient};
pub use system::{Frontend, NetworkView, System};
pub use telemetry::init_tracing;
pub use template::{render, LaunchContext, Resolver};
