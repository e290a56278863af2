//! End-to-end subprocess lifecycle and discovery tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::CapturedLogs;
use mamut_core::Scope;
use mamut_supervisor::discovery::{self, Discovery, Marker, MarkerSet};
use mamut_supervisor::logpipe::LogSchema;
use mamut_supervisor::{StopOutcome, SubProcess, SupervisorError};
use nix::sys::signal::kill;
use nix::unistd::Pid;

#[tokio::test]
async fn test_kill_long_running_process_logs_force_kill() {
    let (logs, _guard) = CapturedLogs::install();
    let scope = Scope::new("lifecycle");

    let proc = SubProcess::new("sleeper", &scope);
    proc.start("sleep", &["1000".into()], &[]).await.unwrap();
    assert!(proc.is_running().await);

    let outcome = proc.kill().await.unwrap();
    assert!(matches!(outcome, StopOutcome::Killed(_)));
    assert!(logs.contains("force-killed process"));
    assert!(!logs.contains("process exited gracefully"));

    scope.close().await;
}

#[tokio::test]
async fn test_wait_then_stop_logs_graceful_exit() {
    let (logs, _guard) = CapturedLogs::install();
    let scope = Scope::new("lifecycle");

    let proc = SubProcess::new("echo", &scope);
    proc.start("echo", &["hello".into()], &[]).await.unwrap();

    let info = proc.wait().await.unwrap();
    assert!(info.success());

    let outcome = proc.stop(false).await.unwrap();
    assert!(matches!(outcome, StopOutcome::Exited(_)));
    assert!(logs.contains("process exited gracefully"));
    assert!(!logs.contains("force-killed"));
    // The child's own output is forwarded with its source stream.
    assert!(logs.contains("hello"));
    assert!(logs.contains("stdout"));

    scope.close().await;
}

#[tokio::test]
async fn test_scope_close_kills_child_without_handles() {
    let scope = Scope::new("unowned");

    let proc = SubProcess::new("detached", &scope);
    let script = "exec >/dev/null 2>&1; exec sleep 1000";
    proc.start("sh", &["-c".into(), script.into()], &[])
        .await
        .unwrap();
    let pid = Pid::from_raw(proc.pid().await.unwrap() as i32);
    drop(proc);

    // Let the readers see EOF so nothing else keeps the supervisor alive.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(kill(pid, None).is_ok());

    scope.close().await;

    let mut alive = true;
    for _ in 0..50 {
        if kill(pid, None).is_err() {
            alive = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!alive, "child outlived its scope");
}

#[tokio::test]
async fn test_discovers_endpoints_from_structured_logs() {
    let scope = Scope::new("discovery");
    let markers = Arc::new(
        MarkerSet::new()
            .marker(Marker::message("rpc", "RPC server bound to address", "addr").scheme("http"))
            .marker(Marker::prefix("metrics", "Starting metrics endpoint at ")),
    );
    let found = Arc::new(Discovery::new(markers.endpoints()));

    let proc = SubProcess::builder("L2CLNode-kona-901", &scope)
        .schema(LogSchema::RustStructured)
        .sink(discovery::sink(markers.clone(), found.clone()))
        .build();

    let script = r#"
        echo '{"level":"INFO","fields":{"message":"RPC server bound to address","addr":"127.0.0.1:9545"}}'
        echo 'Starting metrics endpoint at 127.0.0.1:7300' 1>&2
        exec sleep 1000
    "#;
    proc.start("sh", &["-c".into(), script.into()], &[])
        .await
        .unwrap();

    let cancel = scope.cancel_token();
    let all = found
        .wait_all(&cancel, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(all["rpc"], "http://127.0.0.1:9545");
    assert_eq!(all["metrics"], "127.0.0.1:7300");

    scope.close().await;
    assert!(!proc.is_running().await);
}

#[tokio::test]
async fn test_discovery_cancelled_by_scope() {
    let scope = Scope::new("cancel");
    let found = Arc::new(Discovery::new(["rpc"]));
    let cancel = scope.cancel_token();

    let waiter = {
        let found = found.clone();
        tokio::spawn(async move { found.wait("rpc", &cancel, Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    scope.close().await;

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::DiscoveryCancelled { .. }));
}
