//! Stable TCP front for endpoints that move.
//!
//! A [`Proxy`] binds its listener once and keeps that address for its whole
//! lifetime. The process behind it may restart on a different port; the
//! launcher re-points the proxy with [`Proxy::set_upstream`] and peers that
//! captured the proxy address keep working after a reconnect.
//!
//! Each accepted connection dials the upstream current at accept time,
//! retrying with exponential backoff because the upstream may still be
//! starting. Bytes are then copied in both directions until either side
//! closes, at which point both sides are closed.
//!
//! # Example
//!
//! ```ignore
//! use mamut_supervisor::proxy::{Proxy, ProxyConfig};
//!
//! let proxy = Proxy::start("127.0.0.1:0", ProxyConfig::default()).await?;
//! let stable = proxy.url("http");
//!
//! proxy.set_upstream("127.0.0.1:8545");
//! // ... upstream restarts on another port ...
//! proxy.set_upstream("127.0.0.1:9545");
//!
//! assert_eq!(proxy.url("http"), stable);
//! proxy.close().await;
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};

/// Dial behaviour of a [`Proxy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Number of dial attempts per connection.
    pub dial_attempts: u32,
    /// Delay after the first failed attempt.
    #[serde(with = "millis")]
    pub dial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    #[serde(with = "millis")]
    pub max_dial_backoff: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            dial_attempts: 20,
            dial_backoff: Duration::from_millis(50),
            max_dial_backoff: Duration::from_secs(1),
        }
    }
}

impl ProxyConfig {
    /// Sets the number of dial attempts.
    pub fn with_dial_attempts(mut self, attempts: u32) -> Self {
        self.dial_attempts = attempts.max(1);
        self
    }

    /// Sets the initial and maximum backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.dial_backoff = initial;
        self.max_dial_backoff = max.max(initial);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// State shared with connection tasks.
struct Shared {
    upstream: RwLock<Option<String>>,
    config: ProxyConfig,
}

struct ProxyInner {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A TCP proxy with a fixed listen address and a swappable upstream.
///
/// Cloning yields another handle to the same proxy.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    /// Binds `bind` and starts accepting connections.
    ///
    /// Connections accepted before an upstream is set wait for one within
    /// their dial retry budget.
    pub async fn start(bind: &str, config: ProxyConfig) -> Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            upstream: RwLock::new(None),
            config,
        });
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            shutdown.clone(),
            tracker.clone(),
        ));

        info!(addr = %addr, "proxy listening");
        Ok(Self {
            inner: Arc::new(ProxyInner {
                addr,
                shared,
                shutdown,
                tracker,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the stable listen address.
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Returns the stable address as a URL with `scheme`.
    pub fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}", self.inner.addr)
    }

    /// Points new connections at `upstream` (`host:port`).
    pub fn set_upstream(&self, upstream: impl Into<String>) {
        let upstream = upstream.into();
        info!(addr = %self.inner.addr, upstream = %upstream, "proxy upstream set");
        *self.inner.shared.upstream.write() = Some(upstream);
    }

    /// Returns the current upstream.
    pub fn upstream(&self) -> Option<String> {
        self.inner.shared.upstream.read().clone()
    }

    /// Returns true once [`Proxy::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stops accepting and closes every open connection.
    ///
    /// Idempotent. Returns once every connection task has finished.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(addr = %self.inner.addr, "proxy closed");
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("addr", &self.inner.addr)
            .field("upstream", &self.upstream())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let conn_ids = AtomicU64::new(0);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((downstream, peer)) => {
                    let conn = conn_ids.fetch_add(1, Ordering::Relaxed);
                    debug!(conn, peer = %peer, "accepted connection");
                    tracker.spawn(serve(conn, downstream, Arc::clone(&shared), shutdown.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "proxy accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
}

async fn serve(conn: u64, downstream: TcpStream, shared: Arc<Shared>, shutdown: CancellationToken) {
    let upstream = match dial(&shared, &shutdown).await {
        Ok(stream) => stream,
        Err(e) => {
            if !e.is_cancelled() {
                warn!(conn, error = %e, "dropping proxied connection");
            }
            return;
        }
    };

    let (mut down_read, mut down_write) = downstream.into_split();
    let (mut up_read, mut up_write) = upstream.into_split();

    tokio::select! {
        res = tokio::io::copy(&mut down_read, &mut up_write) => {
            debug!(conn, result = ?res, "downstream closed");
        }
        res = tokio::io::copy(&mut up_read, &mut down_write) => {
            debug!(conn, result = ?res, "upstream closed");
        }
        _ = shutdown.cancelled() => {
            debug!(conn, "connection closed by proxy shutdown");
        }
    }
    // Dropping all four halves closes both sockets.
}

/// Dials the current upstream with bounded exponential backoff.
async fn dial(shared: &Shared, shutdown: &CancellationToken) -> Result<TcpStream> {
    let config = &shared.config;
    let attempts = config.dial_attempts.max(1);
    let mut backoff = config.dial_backoff;
    let mut last = String::from("<unset>");

    for attempt in 1..=attempts {
        let target = shared.upstream.read().clone();
        if let Some(target) = target {
            tokio::select! {
                _ = shutdown.cancelled() => return Err(SupervisorError::ProxyClosed),
                res = TcpStream::connect(target.as_str()) => match res {
                    Ok(stream) => return Ok(stream),
                    Err(e) => debug!(attempt, upstream = %target, error = %e, "dial failed"),
                },
            }
            last = target;
        } else {
            debug!(attempt, "no upstream set yet");
        }

        if attempt == attempts {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Err(SupervisorError::ProxyClosed),
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.max_dial_backoff);
    }

    Err(SupervisorError::DialExhausted {
        upstream: last,
        attempts,
    })
}

/// Extracts `host:port` from a URL such as `http://127.0.0.1:8545/`.
///
/// Text without a scheme is accepted as-is, minus any path.
pub fn upstream_from_url(url: &str) -> Result<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(authority.to_string())
        }
        _ => Err(SupervisorError::InvalidAddress(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn tagged_server(tag: &'static str) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = CancellationToken::new();
        let token = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    Ok((mut sock, _)) = listener.accept() => {
                        tokio::spawn(async move {
                            let mut buf = [0u8; 64];
                            if let Ok(n) = sock.read(&mut buf).await {
                                let reply = format!("{tag}:{}", String::from_utf8_lossy(&buf[..n]));
                                let _ = sock.write_all(reply.as_bytes()).await;
                            }
                        });
                    }
                }
            }
        });
        (addr, stop)
    }

    async fn roundtrip(addr: SocketAddr, msg: &str) -> std::io::Result<String> {
        let mut sock = TcpStream::connect(addr).await?;
        sock.write_all(msg.as_bytes()).await?;
        let mut out = String::new();
        sock.read_to_string(&mut out).await?;
        Ok(out)
    }

    fn fast_config() -> ProxyConfig {
        ProxyConfig::default()
            .with_dial_attempts(5)
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40))
    }

    #[test]
    fn test_upstream_from_url() {
        assert_eq!(upstream_from_url("http://127.0.0.1:8545").unwrap(), "127.0.0.1:8545");
        assert_eq!(upstream_from_url("ws://localhost:8546/ws?x=1").unwrap(), "localhost:8546");
        assert_eq!(upstream_from_url("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert_eq!(upstream_from_url("http://[::1]:80/").unwrap(), "[::1]:80");
        assert!(upstream_from_url("http://").is_err());
        assert!(upstream_from_url("http://host").is_err());
        assert!(upstream_from_url("http://host:port").is_err());
    }

    #[tokio::test]
    async fn test_relays_bytes() {
        let (upstream, stop) = tagged_server("a").await;
        let proxy = Proxy::start("127.0.0.1:0", fast_config()).await.unwrap();
        proxy.set_upstream(upstream.to_string());

        assert_eq!(roundtrip(proxy.addr(), "ping").await.unwrap(), "a:ping");
        proxy.close().await;
        stop.cancel();
    }

    #[tokio::test]
    async fn test_waits_for_late_upstream() {
        let proxy = Proxy::start("127.0.0.1:0", fast_config()).await.unwrap();
        let (upstream, stop) = tagged_server("late").await;

        let setter = proxy.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.set_upstream(upstream.to_string());
        });

        assert_eq!(roundtrip(proxy.addr(), "x").await.unwrap(), "late:x");
        proxy.close().await;
        stop.cancel();
    }

    #[tokio::test]
    async fn test_dial_exhaustion_fails_only_that_connection() {
        let proxy = Proxy::start("127.0.0.1:0", fast_config()).await.unwrap();
        // Nothing set: the connection is dropped after the retry budget.
        let out = roundtrip(proxy.addr(), "x").await.unwrap_or_default();
        assert!(out.is_empty());

        let (upstream, stop) = tagged_server("ok").await;
        proxy.set_upstream(upstream.to_string());
        assert_eq!(roundtrip(proxy.addr(), "y").await.unwrap(), "ok:y");
        proxy.close().await;
        stop.cancel();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let proxy = Proxy::start("127.0.0.1:0", fast_config()).await.unwrap();
        let addr = proxy.addr();
        proxy.close().await;
        proxy.close().await;
        assert!(proxy.is_closed());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn test_config_serde() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"dial_attempts": 3, "dial_backoff": 25}"#).unwrap();
        assert_eq!(config.dial_attempts, 3);
        assert_eq!(config.dial_backoff, Duration::from_millis(25));
        assert_eq!(config.max_dial_backoff, Duration::from_secs(1));
    }
}
