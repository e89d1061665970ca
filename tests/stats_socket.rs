//! Stats socket client against a fake HAProxy control socket.

#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lb_agent::haproxy::{StatsSocketClient, StatsSocketError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

#[tokio::test]
async fn sends_command_with_extra_and_collects_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat.sock");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    common::start_stats_socket(&path, move |line| {
        recorder.lock().unwrap().push(line.to_string());
        "Name: HAProxy\nVersion: 1.4.18\n".to_string()
    });

    let client = StatsSocketClient::new(&path);
    let response = client
        .execute("show info", "", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(response, "Name: HAProxy\nVersion: 1.4.18\n");

    client
        .execute("disable server", "bck_http_plain/http_plain--server1", Duration::from_secs(1))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "show info".to_string(),
            "disable server bck_http_plain/http_plain--server1".to_string()
        ]
    );
}

#[tokio::test]
async fn returns_partial_response_at_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat.sock");
    let listener = UnixListener::bind(&path).unwrap();

    // Answers but never closes the connection.
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = socket.read(&mut buf).await;
        socket.write_all(b"partial").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = StatsSocketClient::new(&path);
    let started = Instant::now();
    let response = client
        .execute("show sess", "", Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(response, "partial");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn missing_socket_is_a_connect_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = StatsSocketClient::new(dir.path().join("absent.sock"));

    let err = client
        .execute("show stat", "", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, StatsSocketError::Connect { .. }));
    assert!(err.to_string().contains("absent.sock"));
}
