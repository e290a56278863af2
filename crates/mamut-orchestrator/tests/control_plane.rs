//! End-to-end tests: option pipeline, hydration and the control plane over
//! in-process JSON-RPC services.

use futures::FutureExt;
use mamut_core::id::{L2CLNodeId, L2ELNodeId, SequencerId};
use mamut_core::{ChainId, Kind};
use mamut_orchestrator::{
    apply_option_lifecycle, hydrate_system, post_hydrate, with_embedded_switch,
    with_in_process_service, Combined, ControlAction, EmbeddedSwitch, FnOption,
    LocalOrchestrator, Orchestrator, OrchestratorError, ServiceFn, StackConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Answers every JSON-RPC request with `result = name`.
fn json_rpc_service(name: &'static str) -> ServiceFn {
    Arc::new(move |listener: TcpListener, cancel: CancellationToken| {
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((sock, _)) = accepted else { continue };
                        tokio::spawn(serve_one(sock, name));
                    }
                }
            }
        }
        .boxed()
    })
}

async fn serve_one(sock: TcpStream, name: &'static str) {
    let mut reader = BufReader::new(sock);
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).await.is_err() {
        return;
    }
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": name}).to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        reply.len(),
        reply
    );
    let _ = reader.get_mut().write_all(response.as_bytes()).await;
    let _ = reader.get_mut().shutdown().await;
}

fn noting(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> FnOption<LocalOrchestrator> {
    let (before, after) = (log.clone(), log.clone());
    FnOption::new()
        .on_before_deploy(move |_: &LocalOrchestrator| {
            before.lock().push(format!("{name}/before"));
            async { Ok(()) }.boxed()
        })
        .on_after_deploy(move |_: &LocalOrchestrator| {
            after.lock().push(format!("{name}/after"));
            async { Ok(()) }.boxed()
        })
}

fn fast_config() -> StackConfig {
    let mut config = StackConfig::default();
    config.proxy.dial_attempts = 2;
    config.proxy.dial_backoff_ms = 10;
    config.proxy.max_dial_backoff_ms = 20;
    config
}

#[tokio::test]
async fn control_plane_restart_keeps_rpc_address() {
    let orch = LocalOrchestrator::new(fast_config());
    let el = L2ELNodeId::new("sequencer", 901u64);
    let opt = with_in_process_service(el.clone(), "rpc", "http", json_rpc_service("el"));
    apply_option_lifecycle(&opt, &orch).await.unwrap();

    let system = hydrate_system(&orch, &opt).unwrap();
    let rpc = system.node(&el).unwrap().rpc("rpc").unwrap();
    let name: String = rpc.call("web3_clientVersion", json!([])).await.unwrap();
    assert_eq!(name, "el");

    let control = orch.control_plane();
    control.action_for(&el, ControlAction::Stop).await.unwrap();
    let err = rpc
        .call::<String>("web3_clientVersion", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Rpc { .. }));

    control.action_for(&el, ControlAction::Start).await.unwrap();
    let mut reply = None;
    for _ in 0..40 {
        if let Ok(name) = rpc.call::<String>("web3_clientVersion", json!([])).await {
            reply = Some(name);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(reply.as_deref(), Some("el"));

    let again = hydrate_system(&orch, &opt).unwrap();
    assert_eq!(
        again.node(&el).unwrap().endpoint_url("rpc").unwrap(),
        rpc.url()
    );
    orch.close().await;
}

#[tokio::test]
async fn pipeline_runs_phases_globally_and_hydrates_network() {
    let orch = LocalOrchestrator::new(fast_config());
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let el = L2ELNodeId::new("a", 901u64);
    let cl = L2CLNodeId::new("a", 901u64);
    let other = L2ELNodeId::new("b", 902u64);
    let driver = SequencerId::new("driver", 901u64);

    let seen = log.clone();
    let opt = Combined::new()
        .with(noting(&log, "first"))
        .with(with_in_process_service(el.clone(), "rpc", "http", json_rpc_service("el")))
        .with(with_in_process_service(cl.clone(), "rpc", "http", json_rpc_service("cl")))
        .with(with_in_process_service(other.clone(), "rpc", "http", json_rpc_service("other")))
        .with(with_embedded_switch(EmbeddedSwitch::new(driver.clone(), cl.clone())))
        .with(noting(&log, "last"))
        .with(post_hydrate(move |system| {
            seen.lock().push(format!("hydrated {}", system.len()));
            Ok(())
        }));

    apply_option_lifecycle(&opt, &orch).await.unwrap();
    assert_eq!(
        *log.lock(),
        vec!["first/before", "last/before", "first/after", "last/after"]
    );

    let system = hydrate_system(&orch, &opt).unwrap();
    assert_eq!(log.lock().last().map(String::as_str), Some("hydrated 4"));

    let net = system.network(ChainId(901));
    assert_eq!(net.chain_id(), ChainId(901));
    assert_eq!(net.all().len(), 3);
    assert_eq!(net.kind(&Kind::L2_EL_NODE).len(), 1);

    let cl_rpc = system.node(&cl).unwrap().rpc("rpc").unwrap();
    let name: String = cl_rpc.call("optimism_version", json!([])).await.unwrap();
    assert_eq!(name, "cl");

    let control = orch.control_plane();
    control.action_for(&driver, ControlAction::Stop).await.unwrap();
    control.action_for(&driver, ControlAction::Stop).await.unwrap();
    control.action_for(&driver, ControlAction::Start).await.unwrap();

    orch.close().await;
}

#[tokio::test]
async fn duplicate_component_aborts_pipeline() {
    let orch = LocalOrchestrator::new(fast_config());
    let el = L2ELNodeId::new("a", 901u64);
    let opt = Combined::new()
        .with(with_in_process_service(el.clone(), "rpc", "http", json_rpc_service("one")))
        .with(with_in_process_service(el.clone(), "rpc", "http", json_rpc_service("two")));

    let err = apply_option_lifecycle(&opt, &orch).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Duplicate(_)));
    assert_eq!(orch.registries().all().len(), 1);
    orch.close().await;
}
