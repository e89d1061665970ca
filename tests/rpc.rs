//! JSON-RPC surface over plain HTTP (TLS is covered by `net::tls`).

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use lb_agent::client::{AgentClient, ClientError};
use lb_agent::rpc::{build_router, RpcResponse};
use lb_agent::LoadBalancerAgent;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

async fn serve(fixture: &Fixture) -> Url {
    let agent = Arc::new(LoadBalancerAgent::new(fixture.config.clone()).await.unwrap());
    let router = build_router(agent, Duration::from_secs(5));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Url::parse(&format!("http://{}/", addr)).unwrap()
}

#[tokio::test]
async fn client_calls_typed_methods() {
    let fixture = Fixture::new(common::unused_port().await);
    common::start_stats_socket(&fixture.socket_path(), |_| {
        common::show_stat(&[("bck_http_plain", "http_plain--server1", "DOWN")])
    });
    let client = AgentClient::with_client(serve(&fixture).await, reqwest::Client::new());

    assert_eq!(client.ping().await.unwrap(), "ZATO_OK");
    assert_eq!(client.get_config_source_code().await.unwrap(), fixture.config_text());

    let config = client.get_config().await.unwrap();
    assert!(config.backend["bck_http_plain"].contains_key("server2"));

    let state = client.get_servers_state().await.unwrap();
    assert_eq!(state["DOWN"]["http_plain"], vec!["server1".to_string()]);

    let commands = client.call("get_known_commands", Value::Null).await.unwrap();
    assert_eq!(commands[6]["command"], "show stat");
}

#[tokio::test]
async fn agent_failures_carry_their_kind() {
    let fixture = Fixture::new(common::unused_port().await);
    let client = AgentClient::with_client(serve(&fixture).await, reqwest::Client::new());

    let err = client
        .call("rename_server", json!({"old_name": "absent", "new_name": "other"}))
        .await
        .unwrap_err();
    match err {
        ClientError::Rpc(rpc) => {
            assert_eq!(rpc.code, -32000);
            assert_eq!(rpc.kind(), Some("not_found"));
        }
        other => panic!("expected an RPC error, got {other:?}"),
    }

    let source = format!("{}\n{}\n", fixture.config_text(), common::REJECTED_MARKER);
    let err = client.validate_save_source_code(&source, false).await.unwrap_err();
    match err {
        ClientError::Rpc(rpc) => assert_eq!(rpc.kind(), Some("config_validation")),
        other => panic!("expected an RPC error, got {other:?}"),
    }
}

#[tokio::test]
async fn protocol_errors_use_standard_codes() {
    let fixture = Fixture::new(common::unused_port().await);
    let url = serve(&fixture).await;
    let http = reqwest::Client::new();

    let unknown: RpcResponse = http
        .post(url.clone())
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown.id, json!(1));
    assert_eq!(unknown.error.unwrap().code, -32601);

    let malformed: RpcResponse = http
        .post(url.join("RPC2").unwrap())
        .body("{not json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(malformed.error.unwrap().code, -32700);

    let bad_params: RpcResponse = http
        .post(url)
        .json(&json!({"jsonrpc": "2.0", "id": "x", "method": "rename_server", "params": {"old_name": "a"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bad_params.error.unwrap().code, -32602);
}
