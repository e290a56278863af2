//! Concrete component kinds.
//!
//! - [`process_node`]: node binaries run as supervised child processes
//! - [`in_process`]: tokio services hosted by the orchestrator itself
//! - [`switch`]: on/off switches for sub-modules embedded in a host

pub mod in_process;
pub mod process_node;
pub mod switch;

pub use in_process::{line_echo_service, with_in_process_service, InProcessService, ServiceFn};
pub use process_node::{with_process_node, LaunchSpec, ProcessNode};
pub use switch::{with_embedded_switch, EmbeddedSwitch, HOST_LINK};
