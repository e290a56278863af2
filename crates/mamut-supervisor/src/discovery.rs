//! Endpoint discovery from child log output.
//!
//! Node binaries usually bind to ephemeral ports and announce the chosen
//! address in a log line. A [`DiscoveryHook`] recognises those announcements
//! and a [`Discovery`] collects them: one single-slot channel per expected
//! endpoint, filled at most once, awaited by the launcher with a
//! cancellation token and a deadline.
//!
//! # Example
//!
//! ```
//! use mamut_supervisor::discovery::{Discovery, DiscoveryHook, Marker, MarkerSet};
//! use mamut_supervisor::logpipe::LogEntry;
//!
//! let markers = MarkerSet::new()
//!     .marker(Marker::message("rpc", "RPC server bound to address", "addr").scheme("http"))
//!     .marker(Marker::prefix("metrics", "Starting metrics endpoint at "));
//!
//! let discovery = Discovery::new(markers.endpoints());
//! let entry = LogEntry::plain("RPC server bound to address").with_field("addr", "127.0.0.1:9545");
//! discovery.observe(&markers, &entry);
//!
//! assert_eq!(discovery.get("rpc").as_deref(), Some("http://127.0.0.1:9545"));
//! assert_eq!(discovery.get("metrics"), None);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SupervisorError};
use crate::logpipe::{LogEntry, Stream};

/// Recognises endpoint announcements in log entries.
pub trait DiscoveryHook: Send + Sync {
    /// Returns every `(endpoint, address)` pair announced by `entry`.
    fn inspect(&self, entry: &LogEntry) -> Vec<(String, String)>;
}

impl<F> DiscoveryHook for F
where
    F: Fn(&LogEntry) -> Vec<(String, String)> + Send + Sync,
{
    fn inspect(&self, entry: &LogEntry) -> Vec<(String, String)> {
        self(entry)
    }
}

/// How a marker recognises its log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMatch {
    /// The message equals `message`; the address is the value of `field`.
    Message {
        /// Exact message text.
        message: String,
        /// Field holding the address.
        field: String,
    },
    /// The message starts with `prefix`; the address is the remainder.
    Prefix {
        /// Message prefix.
        prefix: String,
    },
}

/// One endpoint announcement pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    endpoint: String,
    matcher: MarkerMatch,
    scheme: Option<String>,
}

impl Marker {
    /// Matches an exact message and reads the address from a field.
    pub fn message(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            matcher: MarkerMatch::Message {
                message: message.into(),
                field: field.into(),
            },
            scheme: None,
        }
    }

    /// Matches a message prefix and reads the address from the remainder.
    pub fn prefix(endpoint: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            matcher: MarkerMatch::Prefix {
                prefix: prefix.into(),
            },
            scheme: None,
        }
    }

    /// Prepends `scheme://` to discovered addresses that have no scheme.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Returns the endpoint name.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn extract(&self, entry: &LogEntry) -> Option<String> {
        let raw = match &self.matcher {
            MarkerMatch::Message { message, field } if entry.message == *message => {
                entry.field_str(field)?
            }
            MarkerMatch::Prefix { prefix } => entry.message.strip_prefix(prefix.as_str())?.to_string(),
            _ => return None,
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match &self.scheme {
            Some(scheme) if !raw.contains("://") => format!("{scheme}://{raw}"),
            _ => raw.to_string(),
        })
    }
}

/// The stock [`DiscoveryHook`]: a list of markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    /// Creates an empty marker set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a marker.
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Returns the distinct endpoint names, in first-seen order.
    pub fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for marker in &self.markers {
            if !names.iter().any(|n| n == &marker.endpoint) {
                names.push(marker.endpoint.clone());
            }
        }
        names
    }

    /// Returns true if the set has no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl DiscoveryHook for MarkerSet {
    fn inspect(&self, entry: &LogEntry) -> Vec<(String, String)> {
        self.markers
            .iter()
            .filter_map(|m| m.extract(entry).map(|addr| (m.endpoint.clone(), addr)))
            .collect()
    }
}

/// Collects discovered endpoint addresses.
///
/// Each expected endpoint has one slot. The first non-empty address offered
/// for an endpoint fills its slot; later offers are ignored.
#[derive(Debug)]
pub struct Discovery {
    slots: BTreeMap<String, watch::Sender<Option<String>>>,
}

impl Discovery {
    /// Creates slots for the given endpoint names.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = endpoints
            .into_iter()
            .map(|name| (name.into(), watch::channel(None).0))
            .collect();
        Self { slots }
    }

    /// Returns the expected endpoint names.
    pub fn endpoints(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Offers an address for `endpoint`.
    ///
    /// Returns true if this offer filled the slot.
    pub fn offer(&self, endpoint: &str, address: &str) -> bool {
        if address.is_empty() {
            debug!(endpoint, "ignoring empty endpoint announcement");
            return false;
        }
        let Some(slot) = self.slots.get(endpoint) else {
            debug!(endpoint, address, "ignoring announcement for unexpected endpoint");
            return false;
        };
        let filled = slot.send_if_modified(|value| {
            if value.is_some() {
                return false;
            }
            *value = Some(address.to_string());
            true
        });
        if filled {
            info!(endpoint, address, "discovered endpoint");
        }
        filled
    }

    /// Runs `hook` over `entry` and offers whatever it finds.
    pub fn observe(&self, hook: &dyn DiscoveryHook, entry: &LogEntry) {
        for (endpoint, address) in hook.inspect(entry) {
            self.offer(&endpoint, &address);
        }
    }

    /// Returns the address of `endpoint` if it has been discovered.
    pub fn get(&self, endpoint: &str) -> Option<String> {
        self.slots.get(endpoint).and_then(|slot| slot.borrow().clone())
    }

    /// Returns true once every expected endpoint has been discovered.
    pub fn is_complete(&self) -> bool {
        self.slots.values().all(|slot| slot.borrow().is_some())
    }

    /// Waits for `endpoint` to be discovered.
    ///
    /// Fails when `cancel` fires or `timeout` elapses first.
    pub async fn wait(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<String> {
        let slot = self
            .slots
            .get(endpoint)
            .ok_or_else(|| SupervisorError::unknown_endpoint(endpoint))?;
        let mut rx = slot.subscribe();

        tokio::select! {
            _ = cancel.cancelled() => Err(SupervisorError::DiscoveryCancelled {
                endpoint: endpoint.to_string(),
            }),
            res = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)) => match res {
                Ok(Ok(value)) => Ok(value.clone().unwrap_or_default()),
                // The sender lives in `self`, so it cannot close while borrowed.
                Ok(Err(_)) => Err(SupervisorError::DiscoveryCancelled {
                    endpoint: endpoint.to_string(),
                }),
                Err(_) => Err(SupervisorError::DiscoveryTimeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                }),
            },
        }
    }

    /// Waits for every expected endpoint, returning them keyed by name.
    pub async fn wait_all(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<BTreeMap<String, String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut found = BTreeMap::new();
        for endpoint in self.slots.keys() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let address = self.wait(endpoint, cancel, remaining).await?;
            found.insert(endpoint.clone(), address);
        }
        Ok(found)
    }
}

/// Connects a hook to a discovery, producing a log sink for a subprocess.
pub fn sink(
    hook: Arc<dyn DiscoveryHook>,
    discovery: Arc<Discovery>,
) -> crate::process::LogSink {
    Arc::new(move |_stream: Stream, entry: &LogEntry| discovery.observe(hook.as_ref(), entry))
}
