//! Shared fixtures for integration tests.
//!
//! Nothing here needs a real HAProxy: a shell script stands in for the
//! binary and a UNIX listener stands in for its stats socket.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lb_agent::config::{AgentConfig, TimeoutConfig};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};

/// Pid the fake HAProxy writes to its pid file.
pub const FAKE_PID: &str = "4242";

/// Config text containing this is rejected by the fake HAProxy's check mode.
pub const REJECTED_MARKER: &str = "syntax_error";

/// Config text containing this makes the fake check mode hang.
pub const SLOW_MARKER: &str = "slow_check";

/// Config text containing this makes the fake check mode write 200000
/// bytes to stderr before rejecting the config.
pub const NOISY_MARKER: &str = "noisy_check";

/// Config text containing this keeps the fake HAProxy in the foreground
/// after writing its pid, then writes 200000 bytes to stdout. It leaves
/// `<pid file>.out` behind only if every byte was written.
pub const FOREGROUND_MARKER: &str = "foreground_output";

const FAKE_HAPROXY: &str = r#"#!/bin/sh
echo "$@" >> "__LOG__"
mode=run
cfg=""
pid=""
while [ $# -gt 0 ]; do
    case "$1" in
        -c) mode=check ;;
        -f) shift; cfg="$1" ;;
        -p) shift; pid="$1" ;;
        -sf) shift ;;
    esac
    shift
done
if [ "$mode" = check ]; then
    if grep -q slow_check "$cfg"; then
        sleep 5
    fi
    if grep -q noisy_check "$cfg"; then
        head -c 200000 /dev/zero | tr '\0' w >&2
        exit 1
    fi
    if grep -q syntax_error "$cfg"; then
        echo "[ALERT] parsing [$cfg:1] : unknown keyword 'syntax_error' out of section." >&2
        exit 1
    fi
    echo "Configuration file is valid"
    exit 0
fi
echo __PID__ > "$pid"
if grep -q foreground_output "$cfg"; then
    sleep 1
    head -c 200000 /dev/zero | tr '\0' o || exit 1
    echo done > "$pid.out"
fi
exit 0
"#;

const ZATO_CONFIG: &str = r#"
# ##############################################################################

global
    log 127.0.0.1:514 local0 debug # ZATO global:log
    stats socket __SOCKET__ # ZATO global:stats_socket

# ##############################################################################

defaults
    log global
    option httpclose

    stats uri /zato-lb-stats # ZATO defaults:stats uri

    timeout connect 15000 # ZATO defaults:timeout connect
    timeout client 15000 # ZATO defaults:timeout client
    timeout server 15000 # ZATO defaults:timeout server

# ##############################################################################

backend bck_http_plain
    mode http
    balance roundrobin

# ZATO begin backend bck_http_plain

    server http_plain--server1 127.0.0.1:17010 check inter 2s rise 2 fall 2 # ZATO backend bck_http_plain:server--server1
    server http_plain--server2 127.0.0.1:17011 check inter 2s rise 2 fall 2 # ZATO backend bck_http_plain:server--server2

# ZATO end backend bck_http_plain

# ##############################################################################

frontend front_http_plain

    mode http
    default_backend bck_http_plain

    option httplog # ZATO frontend front_http_plain:option log-http-requests
    bind 127.0.0.1:__MONITOR_PORT__ # ZATO frontend front_http_plain:bind
    maxconn 200 # ZATO frontend front_http_plain:maxconn

    monitor-uri /zato-lb-alive # ZATO frontend front_http_plain:monitor-uri
"#;

/// A repo directory with a fake HAProxy and a `zato.config`.
pub struct Fixture {
    pub dir: TempDir,
    pub config: AgentConfig,
}

impl Fixture {
    /// Repo whose monitor frontend binds to `monitor_port`.
    pub fn new(monitor_port: u16) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let work_dir = root.join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let haproxy = root.join("haproxy");
        let script = FAKE_HAPROXY
            .replace("__LOG__", &root.join("haproxy.log").display().to_string())
            .replace("__PID__", FAKE_PID);
        std::fs::write(&haproxy, script).unwrap();
        std::fs::set_permissions(&haproxy, std::fs::Permissions::from_mode(0o755)).unwrap();

        let text = ZATO_CONFIG
            .replace("__SOCKET__", &root.join("haproxy-stat.sock").display().to_string())
            .replace("__MONITOR_PORT__", &monitor_port.to_string());
        std::fs::write(root.join("zato.config"), text).unwrap();

        let config = AgentConfig {
            haproxy_command: haproxy.display().to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            keyfile: root.join("server.key"),
            certfile: root.join("server.pem"),
            ca_certs: root.join("ca.pem"),
            work_dir,
            verify_fields: BTreeMap::new(),
            log_config: None,
            pid_file: root.join("haproxy.pid"),
            timeouts: TimeoutConfig {
                stats_ms: 1_000,
                start_ms: 2_000,
                validate_ms: 2_000,
                monitor_ms: 1_000,
                request_ms: 5_000,
            },
            metrics_address: None,
            repo_dir: root.to_path_buf(),
        };

        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("zato.config")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.root().join("haproxy-stat.sock")
    }

    pub fn config_text(&self) -> String {
        std::fs::read_to_string(self.config_path()).unwrap()
    }

    /// Every command line the fake HAProxy was invoked with.
    pub fn haproxy_invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("haproxy.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Serve a fake stats socket at `path`; each connection gets
/// `respond(command line)` and is then closed.
pub fn start_stats_socket<F>(path: &Path, respond: F) -> tokio::task::JoinHandle<()>
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = UnixListener::bind(path).unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let respond = respond.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.is_err() {
                            return;
                        }
                        let response = respond(line.trim_end());
                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    })
}

/// One `show stat` CSV row with `status` in the status column.
pub fn stat_row(proxy: &str, svname: &str, status: &str) -> String {
    format!("{},{},{}{},\n", proxy, svname, ",".repeat(15), status)
}

pub fn show_stat(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from("# pxname,svname,qcur,qmax,scur,smax,slim,stot,bin,bout,dreq,dresp,ereq,econ,eresp,wretr,wredis,status,\n");
    for (proxy, svname, status) in rows {
        out.push_str(&stat_row(proxy, svname, status));
    }
    out
}

/// Start a programmable HTTP backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            503 => "503 Service Unavailable",
                            _ => "500 Internal Server Error",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
