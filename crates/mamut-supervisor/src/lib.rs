//! # Mamut Supervisor - Process Supervision and Stable Endpoints
//!
//! Supervisor runs the node binaries of a devnet as child processes, learns
//! where they listen by reading their logs, and fronts every endpoint with a
//! proxy whose address never changes across restarts.
//!
//! ## Overview
//!
//! The crate is organized around several core concepts:
//!
//! - **SubProcess**: One restartable child with log forwarding and
//!   scope-bound cleanup
//! - **Log pipes**: Parsers for the structured log formats node binaries emit
//! - **Discovery**: Single-slot channels filled from endpoint announcements
//! - **Proxy**: A fixed listener relaying to a swappable upstream
//!
//! ## Quick Start
//!
//! ```ignore
//! use mamut_core::Scope;
//! use mamut_supervisor::{
//!     discovery::{self, Discovery, Marker, MarkerSet},
//!     logpipe::LogSchema,
//!     process::SubProcess,
//!     proxy::{upstream_from_url, Proxy, ProxyConfig},
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scope = Scope::new("devnet");
//! let markers = Arc::new(
//!     MarkerSet::new().marker(Marker::message("rpc", "RPC server bound to address", "addr").scheme("http")),
//! );
//! let found = Arc::new(Discovery::new(markers.endpoints()));
//!
//! let node = SubProcess::builder("L2CLNode-kona-901", &scope)
//!     .schema(LogSchema::RustStructured)
//!     .sink(discovery::sink(markers, found.clone()))
//!     .build();
//! node.start("kona-node", &args, &[]).await?;
//!
//! let rpc = found.wait("rpc", &scope.cancel_token(), Duration::from_secs(30)).await?;
//! let proxy = Proxy::start("127.0.0.1:0", ProxyConfig::default()).await?;
//! proxy.set_upstream(upstream_from_url(&rpc)?);
//! println!("stable rpc endpoint: {}", proxy.url("http"));
//! ```
//!
//! ## Stop semantics
//!
//! | Call | Behaviour |
//! |---|---|
//! | `stop(true)` | SIGINT, wait up to the grace period, then SIGKILL |
//! | `stop(false)` | wait up to the grace period, then SIGKILL |
//! | `kill()` | SIGKILL immediately |
//!
//! None of these accept cancellation; all are bounded by internal timeouts.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod discovery;
pub mod error;
pub mod logpipe;
pub mod process;
pub mod proxy;
pub mod signal;

pub use discovery::{Discovery, DiscoveryHook, Marker, MarkerMatch, MarkerSet};
pub use error::{Result, SupervisorError};
pub use logpipe::{LineParser, LogEntry, LogLevel, LogSchema, Stream};
pub use process::{ExitInfo, LogSink, StopOutcome, SubProcess, SubProcessBuilder};
pub use proxy::{upstream_from_url, Proxy, ProxyConfig};
pub use signal::Signal;
