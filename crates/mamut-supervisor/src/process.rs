//! Supervised child processes.
//!
//! A [`SubProcess`] runs at most one child at a time. Output lines are parsed
//! with the configured [`LineParser`], forwarded to `tracing` and handed to
//! every registered [`LogSink`] (which is how endpoint discovery sees them).
//!
//! The first successful start registers a cleanup on the owning
//! [`Scope`] that force-kills whatever is still running when the scope
//! closes, so no child outlives the run that created it.
//!
//! # Example
//!
//! ```ignore
//! use mamut_core::Scope;
//! use mamut_supervisor::process::SubProcess;
//!
//! let scope = Scope::new("devnet");
//! let node = SubProcess::new("L2ELNode-op-reth-901", &scope);
//! node.start("op-reth", &["node".into(), "--dev".into()], &[]).await?;
//!
//! // ... use the node ...
//!
//! node.stop(true).await?;
//! ```

use parking_lot::Mutex as SyncMutex;
use std::ffi::OsStr;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mamut_core::Scope;

use crate::error::{Result, SupervisorError};
use crate::logpipe::{self, LineParser, LogEntry, LogSchema, Stream};
use crate::signal::Signal;

/// Receives every parsed line of a child's output.
pub type LogSink = Arc<dyn Fn(Stream, &LogEntry) + Send + Sync>;

/// Default time a child gets to exit before it is force-killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Upper bound on how long stop waits for output readers to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the child exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the child was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Returns true if the child exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Result of stopping a [`SubProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No child was tracked.
    NotRunning,
    /// The child exited within the grace period.
    Exited(ExitInfo),
    /// The child ignored the stop request and was force-killed.
    Escalated(ExitInfo),
    /// The child was force-killed immediately.
    Killed(ExitInfo),
}

impl StopOutcome {
    /// Returns true if the child had to be force-killed.
    pub fn was_forced(&self) -> bool {
        matches!(self, Self::Escalated(_) | Self::Killed(_))
    }
}

struct Running {
    pid: u32,
    exit: watch::Receiver<Option<ExitInfo>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    fn exited(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    async fn wait_exit(&mut self) -> ExitInfo {
        match self.exit.wait_for(Option::is_some).await {
            Ok(info) => info.unwrap_or(UNKNOWN_EXIT),
            Err(_) => UNKNOWN_EXIT,
        }
    }

    async fn drain(&mut self) {
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if timeout(DRAIN_TIMEOUT, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

const UNKNOWN_EXIT: ExitInfo = ExitInfo {
    code: None,
    signal: None,
};

/// Pid and exit watch of the latest child, shared with the scope cleanup so
/// the child can be killed after every [`SubProcess`] handle is gone.
struct LiveChild {
    pid: u32,
    exit: watch::Receiver<Option<ExitInfo>>,
}

type LiveSlot = Arc<SyncMutex<Option<LiveChild>>>;

fn child_pid(program: &str, pid: Option<u32>) -> Result<u32> {
    pid.ok_or_else(|| {
        SupervisorError::spawn(
            program,
            std::io::Error::other("child exited before its pid was read"),
        )
    })
}

struct Inner {
    name: String,
    scope: Scope,
    parser: Arc<dyn LineParser>,
    sinks: SyncMutex<Vec<LogSink>>,
    stop_grace: Duration,
    running: Mutex<Option<Running>>,
    live: LiveSlot,
    cleanup_registered: AtomicBool,
}

/// A restartable, supervised child process.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct SubProcess {
    inner: Arc<Inner>,
}

impl SubProcess {
    /// Creates a supervisor owned by `scope`.
    ///
    /// `name` tags every forwarded log line; components pass their ID.
    pub fn new(name: impl Into<String>, scope: &Scope) -> Self {
        Self::builder(name, scope).build()
    }

    /// Starts building a supervisor with non-default settings.
    pub fn builder(name: impl Into<String>, scope: &Scope) -> SubProcessBuilder {
        SubProcessBuilder {
            name: name.into(),
            scope: scope.clone(),
            parser: Arc::new(LogSchema::Plain),
            sinks: Vec::new(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Returns the supervisor name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Adds a sink receiving every parsed output line from now on.
    pub fn on_log(&self, sink: LogSink) {
        self.inner.sinks.lock().push(sink);
    }

    /// Returns the pid of the tracked child, if it is still running.
    pub async fn pid(&self) -> Option<u32> {
        let running = self.inner.running.lock().await;
        running
            .as_ref()
            .filter(|r| r.exited().is_none())
            .map(|r| r.pid)
    }

    /// Returns true if a child is tracked and has not exited.
    pub async fn is_running(&self) -> bool {
        self.pid().await.is_some()
    }

    /// Spawns `program` with `args` and extra environment `env`.
    ///
    /// Fails with [`SupervisorError::AlreadyRunning`] if a previous child is
    /// still alive.
    pub async fn start<S: AsRef<OsStr>>(
        &self,
        program: S,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<()> {
        let program = program.as_ref();
        let mut running = self.inner.running.lock().await;
        if let Some(current) = running.as_mut() {
            if current.exited().is_none() {
                return Err(SupervisorError::AlreadyRunning {
                    name: self.inner.name.clone(),
                });
            }
            current.drain().await;
        }

        self.register_cleanup()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program_name = program.to_string_lossy().into_owned();
        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(program_name.clone(), e))?;
        let pid = child_pid(&program_name, child.id())?;

        let mut tasks = Vec::with_capacity(3);
        if let Some(stdout) = child.stdout.take() {
            tasks.push(self.spawn_reader(stdout, Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tasks.push(self.spawn_reader(stderr, Stream::Stderr));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let name = self.inner.name.clone();
        tasks.push(tokio::spawn(async move {
            let info = match child.wait().await {
                Ok(status) => ExitInfo::from(status),
                Err(e) => {
                    warn!(component = %name, error = %e, "failed to wait for process");
                    UNKNOWN_EXIT
                }
            };
            debug!(component = %name, status = %info, "process exited");
            exit_tx.send_replace(Some(info));
        }));

        info!(
            component = %self.inner.name,
            program = %program_name,
            pid,
            "started process"
        );

        *self.inner.live.lock() = Some(LiveChild {
            pid,
            exit: exit_rx.clone(),
        });
        *running = Some(Running {
            pid,
            exit: exit_rx,
            tasks,
        });
        Ok(())
    }

    /// Waits for the tracked child to exit on its own.
    ///
    /// Returns `None` when no child is tracked. The exit is recorded, so a
    /// later [`stop`](Self::stop) reports it as graceful.
    pub async fn wait(&self) -> Option<ExitInfo> {
        let mut exit = {
            let running = self.inner.running.lock().await;
            running.as_ref()?.exit.clone()
        };
        let info = match exit.wait_for(Option::is_some).await {
            Ok(info) => info.unwrap_or(UNKNOWN_EXIT),
            Err(_) => UNKNOWN_EXIT,
        };
        Some(info)
    }

    /// Stops the tracked child.
    ///
    /// With `interrupt`, sends SIGINT first. Waits up to the grace period for
    /// the child to exit, then escalates to SIGKILL. A no-op returning
    /// [`StopOutcome::NotRunning`] when nothing is tracked. Not cancellable.
    pub async fn stop(&self, interrupt: bool) -> Result<StopOutcome> {
        let mut guard = self.inner.running.lock().await;
        let Some(mut running) = guard.take() else {
            return Ok(StopOutcome::NotRunning);
        };

        if let Some(info) = running.exited() {
            running.drain().await;
            info!(component = %self.inner.name, status = %info, "process exited gracefully");
            return Ok(StopOutcome::Exited(info));
        }

        if interrupt {
            debug!(component = %self.inner.name, pid = running.pid, "sending SIGINT");
            if let Err(e) = Signal::Int.send(running.pid) {
                debug!(component = %self.inner.name, error = %e, "interrupt not delivered");
            }
        }

        let outcome = match timeout(self.inner.stop_grace, running.wait_exit()).await {
            Ok(info) => {
                info!(component = %self.inner.name, status = %info, "process exited gracefully");
                StopOutcome::Exited(info)
            }
            Err(_) => {
                warn!(
                    component = %self.inner.name,
                    pid = running.pid,
                    grace = ?self.inner.stop_grace,
                    "process did not exit in time, escalating to SIGKILL"
                );
                StopOutcome::Escalated(self.force_kill(&mut running).await)
            }
        };
        running.drain().await;
        Ok(outcome)
    }

    /// Force-kills the tracked child immediately. Not cancellable.
    pub async fn kill(&self) -> Result<StopOutcome> {
        let mut guard = self.inner.running.lock().await;
        let Some(mut running) = guard.take() else {
            return Ok(StopOutcome::NotRunning);
        };

        let outcome = match running.exited() {
            Some(info) => {
                info!(component = %self.inner.name, status = %info, "process exited gracefully");
                StopOutcome::Exited(info)
            }
            None => StopOutcome::Killed(self.force_kill(&mut running).await),
        };
        running.drain().await;
        Ok(outcome)
    }

    async fn force_kill(&self, running: &mut Running) -> ExitInfo {
        if let Err(e) = Signal::Kill.send(running.pid) {
            debug!(component = %self.inner.name, error = %e, "SIGKILL not delivered");
        }
        let info = match timeout(self.inner.stop_grace, running.wait_exit()).await {
            Ok(info) => info,
            Err(_) => {
                warn!(component = %self.inner.name, pid = running.pid, "process survived SIGKILL");
                UNKNOWN_EXIT
            }
        };
        warn!(component = %self.inner.name, pid = running.pid, "force-killed process");
        info
    }

    fn spawn_reader<R>(&self, reader: R, stream: Stream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let entry = inner.parser.parse(&line);
                        logpipe::forward(&entry, &inner.name, stream);
                        let sinks = inner.sinks.lock().clone();
                        for sink in sinks {
                            sink(stream, &entry);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(component = %inner.name, src = %stream, error = %e, "log stream error");
                        break;
                    }
                }
            }
        })
    }

    fn register_cleanup(&self) -> Result<()> {
        if self.inner.cleanup_registered.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let live = Arc::clone(&self.inner.live);
        let name = self.inner.name.clone();
        let grace = self.inner.stop_grace;
        let label = format!("kill {}", self.inner.name);
        let res = self.inner.scope.cleanup(label, move || async move {
            if let Some(inner) = weak.upgrade() {
                let process = SubProcess { inner };
                if let Err(e) = process.kill().await {
                    warn!(component = %name, error = %e, "cleanup failed to kill process");
                }
                return;
            }
            let taken = live.lock().take();
            if let Some(child) = taken {
                kill_orphan(&name, child, grace).await;
            }
        });
        if res.is_err() {
            self.inner.cleanup_registered.store(false, Ordering::Release);
        }
        res.map_err(Into::into)
    }
}

/// Kills a child whose supervisor handles were all dropped.
async fn kill_orphan(name: &str, mut child: LiveChild, grace: Duration) {
    let exited = child.exit.borrow().is_some();
    if exited {
        return;
    }
    if let Err(e) = Signal::Kill.send(child.pid) {
        debug!(component = %name, error = %e, "SIGKILL not delivered");
    }
    match timeout(grace, child.exit.wait_for(Option::is_some)).await {
        Ok(_) => warn!(component = %name, pid = child.pid, "force-killed unowned process"),
        Err(_) => warn!(component = %name, pid = child.pid, "process survived SIGKILL"),
    }
}

impl fmt::Debug for SubProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubProcess")
            .field("name", &self.inner.name)
            .field("stop_grace", &self.inner.stop_grace)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SubProcess`].
pub struct SubProcessBuilder {
    name: String,
    scope: Scope,
    parser: Arc<dyn LineParser>,
    sinks: Vec<LogSink>,
    stop_grace: Duration,
}

impl SubProcessBuilder {
    /// Sets the log line parser.
    pub fn parser(mut self, parser: Arc<dyn LineParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Sets one of the built-in log schemas.
    pub fn schema(self, schema: LogSchema) -> Self {
        self.parser(Arc::new(schema))
    }

    /// Adds a log sink.
    pub fn sink(mut self, sink: LogSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the time a child gets to exit before being force-killed.
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Builds the supervisor.
    pub fn build(self) -> SubProcess {
        SubProcess {
            inner: Arc::new(Inner {
                name: self.name,
                scope: self.scope,
                parser: self.parser,
                sinks: SyncMutex::new(self.sinks),
                stop_grace: self.stop_grace,
                running: Mutex::new(None),
                live: Arc::new(SyncMutex::new(None)),
                cleanup_registered: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_stop_without_process() {
        let scope = Scope::new("test");
        let proc = SubProcess::new("idle", &scope);
        assert_eq!(proc.stop(true).await.unwrap(), StopOutcome::NotRunning);
        assert_eq!(proc.kill().await.unwrap(), StopOutcome::NotRunning);
        assert!(proc.wait().await.is_none());
        scope.close().await;
    }

    #[test]
    fn test_missing_pid_is_spawn_error() {
        assert_eq!(child_pid("sleep", Some(42)).unwrap(), 42);
        let err = child_pid("sleep", None).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { ref program, .. } if program == "sleep"));
    }

    #[tokio::test]
    async fn test_already_running() {
        let scope = Scope::new("test");
        let proc = SubProcess::new("sleeper", &scope);
        proc.start("sleep", &["30".into()], &[]).await.unwrap();
        let err = proc.start("sleep", &["30".into()], &[]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));

        let outcome = proc.kill().await.unwrap();
        assert!(outcome.was_forced());
        scope.close().await;
    }

    #[tokio::test]
    async fn test_restart_after_exit() {
        let scope = Scope::new("test");
        let proc = SubProcess::new("echo", &scope);
        proc.start("sh", &sh("exit 3"), &[]).await.unwrap();
        let info = proc.wait().await.unwrap();
        assert_eq!(info.code, Some(3));

        proc.start("sh", &sh("exit 0"), &[]).await.unwrap();
        assert!(proc.wait().await.unwrap().success());
        assert!(matches!(proc.stop(false).await.unwrap(), StopOutcome::Exited(_)));
        scope.close().await;
    }

    #[tokio::test]
    async fn test_interrupt_stops_gracefully() {
        let scope = Scope::new("test");
        let proc = SubProcess::builder("trap", &scope)
            .stop_grace(Duration::from_secs(5))
            .build();
        proc.start("sleep", &["30".into()], &[]).await.unwrap();
        let outcome = proc.stop(true).await.unwrap();
        match outcome {
            StopOutcome::Exited(info) => assert_eq!(info.signal, Some(Signal::Int.number())),
            other => panic!("unexpected outcome {other:?}"),
        }
        scope.close().await;
    }

    #[tokio::test]
    async fn test_escalates_when_interrupt_ignored() {
        let scope = Scope::new("test");
        let proc = SubProcess::builder("stubborn", &scope)
            .stop_grace(Duration::from_millis(200))
            .build();
        proc.start("sh", &sh("trap '' INT; exec sleep 30"), &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let outcome = proc.stop(true).await.unwrap();
        assert!(matches!(outcome, StopOutcome::Escalated(_)));
        scope.close().await;
    }

    #[tokio::test]
    async fn test_sinks_receive_parsed_lines() {
        let scope = Scope::new("test");
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let proc = SubProcess::builder("json", &scope)
            .schema(LogSchema::GoStructured)
            .sink(Arc::new(move |stream, entry: &LogEntry| {
                captured.lock().push((stream, entry.message.clone()));
            }))
            .build();

        proc.start(
            "sh",
            &sh(r#"echo '{"lvl":"info","msg":"hello"}'; echo oops 1>&2"#),
            &[],
        )
        .await
        .unwrap();
        proc.wait().await.unwrap();
        proc.stop(false).await.unwrap();

        let seen = seen.lock().clone();
        assert!(seen.contains(&(Stream::Stdout, "hello".to_string())));
        assert!(seen.contains(&(Stream::Stderr, "oops".to_string())));
        scope.close().await;
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let scope = Scope::new("test");
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let proc = SubProcess::new("env", &scope);
        proc.on_log(Arc::new(move |_, entry: &LogEntry| {
            captured.lock().push(entry.message.clone());
        }));
        proc.start(
            "sh",
            &sh("echo $MAMUT_TEST_VALUE"),
            &[("MAMUT_TEST_VALUE".into(), "42".into())],
        )
        .await
        .unwrap();
        proc.wait().await.unwrap();
        proc.stop(false).await.unwrap();
        assert_eq!(*seen.lock(), vec!["42".to_string()]);
        scope.close().await;
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let scope = Scope::new("test");
        let proc = SubProcess::new("missing", &scope);
        let err = proc
            .start("/nonexistent/mamut-binary", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        scope.close().await;
    }

    #[tokio::test]
    async fn test_scope_close_kills_process() {
        let scope = Scope::new("test");
        let proc = SubProcess::new("leak", &scope);
        proc.start("sleep", &["30".into()], &[]).await.unwrap();
        assert!(proc.is_running().await);
        scope.close().await;
        assert!(!proc.is_running().await);
    }
}
