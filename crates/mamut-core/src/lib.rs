//! Mamut Core - identity, selection and ownership primitives for the stack
//! orchestrator.
//!
//! This crate provides the types every other mamut crate builds on:
//!
//! - [`id`]: Typed component identifiers (`Kind`, `ChainId`, the three ID
//!   shapes) and the type-erased [`ComponentId`]
//! - [`matcher`]: Composable, order-preserving selection over components
//! - [`registry`]: Concurrent keyed registries with insert-if-missing
//! - [`scope`]: Cancellation, reverse-order cleanup and scratch directories
//! - [`error`]: Error types shared by the above
//!
//! # Overview
//!
//! A devnet is a fleet of heterogeneous participants: execution and
//! consensus nodes, batchers, proposers, verifiers. Each participant is
//! addressed by an identifier whose text form is stable
//! (`L2CLNode-sequencer-901`) and whose Rust type records its role, so test
//! code cannot confuse an execution node with a consensus node.
//!
//! # Example
//!
//! ```
//! use mamut_core::id::{ComponentId, L2CLNodeId};
//! use mamut_core::registry::Registry;
//!
//! let registry: Registry<ComponentId, &str> = Registry::new();
//! let id = L2CLNodeId::new("sequencer", 901u64);
//!
//! assert!(registry.set_if_missing(id.clone().into(), "kona"));
//! assert!(!registry.set_if_missing(id.clone().into(), "op-node"));
//! assert_eq!(registry.get(&id.into()), Some("kona"));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod matcher;
pub mod registry;
pub mod scope;

// Re-export commonly used types at the crate root for convenience
pub use error::{CoreError, IdError, MatchError, Result};
pub use id::{ChainId, ChainIdOf, ComponentId, GenericId, Id, IdShape, Kind, KindTag, NameChainId};
pub use matcher::{Identifiable, Labeled, Matcher, MatcherExt};
pub use registry::Registry;
pub use scope::Scope;
