//! Run scopes: cancellation, ordered cleanup and scratch directories.
//!
//! Every long-lived resource the stack creates (processes, proxies, service
//! tasks, temp files) is owned by a [`Scope`]. Closing the scope cancels its
//! token and runs registered cleanups in reverse registration order, so
//! resources are torn down in the opposite order they were built.
//!
//! # Example
//!
//! ```
//! use mamut_core::scope::Scope;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> mamut_core::Result<()> {
//! let scope = Scope::new("devnet");
//! let dir = scope.temp_dir()?;
//! assert!(dir.exists());
//!
//! scope.cleanup("say goodbye", || async { println!("bye") })?;
//! scope.close().await;
//! assert!(scope.cancel_token().is_cancelled());
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct ScopeInner {
    name: String,
    cancel: CancellationToken,
    cleanups: Mutex<Vec<(String, CleanupFn)>>,
    temp: Mutex<Option<TempDir>>,
    next_dir: AtomicU64,
    closed: AtomicBool,
}

/// Owner of cancellation, cleanup and scratch space for a run.
///
/// Cloning a scope yields another handle to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Creates a root scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_token(name.into(), CancellationToken::new())
    }

    fn with_token(name: String, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                cancel,
                cleanups: Mutex::new(Vec::new()),
                temp: Mutex::new(None),
                next_dir: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a child scope.
    ///
    /// The child is cancelled when this scope is, and is closed as part of
    /// this scope's cleanup if it has not been closed earlier.
    pub fn child(&self, name: impl Into<String>) -> Result<Scope> {
        let name = format!("{}/{}", self.inner.name, name.into());
        let child = Self::with_token(name.clone(), self.inner.cancel.child_token());
        let handle = child.clone();
        self.cleanup(format!("close {name}"), move || async move {
            handle.close().await;
        })?;
        Ok(child)
    }

    /// Returns the scope name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns a handle to the scope's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Returns true once [`Scope::close`] has started.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Registers a cleanup to run when the scope closes.
    pub fn cleanup<F, Fut>(&self, label: impl Into<String>, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut cleanups = self.inner.cleanups.lock();
        if self.is_closed() {
            return Err(CoreError::ScopeClosed {
                scope: self.inner.name.clone(),
            });
        }
        cleanups.push((label.into(), Box::new(move || Box::pin(f()))));
        Ok(())
    }

    /// Creates a fresh, empty scratch directory removed when the scope closes.
    pub fn temp_dir(&self) -> Result<PathBuf> {
        let mut temp = self.inner.temp.lock();
        if self.is_closed() {
            return Err(CoreError::ScopeClosed {
                scope: self.inner.name.clone(),
            });
        }
        let root = match temp.as_ref() {
            Some(dir) => dir.path().to_path_buf(),
            None => {
                let prefix = format!("mamut-{}-", self.inner.name.replace('/', "-"));
                let dir = tempfile::Builder::new().prefix(&prefix).tempdir()?;
                let root = dir.path().to_path_buf();
                *temp = Some(dir);
                root
            }
        };
        let n = self.inner.next_dir.fetch_add(1, Ordering::Relaxed);
        let dir = root.join(format!("{n:03}"));
        std::fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Cancels the scope and runs every cleanup in reverse order.
    ///
    /// Idempotent; only the first call runs cleanups.
    pub async fn close(&self) {
        let cleanups = {
            let mut cleanups = self.inner.cleanups.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *cleanups)
        };

        self.inner.cancel.cancel();
        debug!(scope = %self.inner.name, count = cleanups.len(), "closing scope");

        for (label, cleanup) in cleanups.into_iter().rev() {
            debug!(scope = %self.inner.name, cleanup = %label, "running cleanup");
            cleanup().await;
        }

        if let Some(dir) = self.inner.temp.lock().take() {
            if let Err(e) = dir.close() {
                warn!(scope = %self.inner.name, error = %e, "failed to remove scope temp dir");
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let pending = self.cleanups.get_mut().len();
        if !*self.closed.get_mut() && pending > 0 {
            warn!(
                scope = %self.name,
                pending,
                "scope dropped without close; cleanups skipped"
            );
        }
        self.cancel.cancel();
    }
}
