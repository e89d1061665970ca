//! JSON-RPC client for a running agent.
//!
//! Used by `lb-agent-cli` and by anything else that needs to drive the
//! agent remotely. Calls go out as `POST /` with a JSON-RPC 2.0 envelope.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{Certificate, Client, Identity};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::agent::ServersState;
use crate::lb_config::Config;
use crate::rpc::{RpcError, RpcRequest, RpcResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not read [{path}]: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("unexpected result shape: {0}")]
    Decode(#[from] serde_json::Error),
}

pub struct AgentClient {
    http: Client,
    url: Url,
    next_id: AtomicU64,
}

impl AgentClient {
    /// Client presenting `certfile`/`keyfile` and trusting only `ca_certs`.
    pub fn new(url: Url, certfile: &Path, keyfile: &Path, ca_certs: &Path) -> Result<Self, ClientError> {
        let mut pem = read(certfile)?;
        pem.extend_from_slice(b"\n");
        pem.extend(read(keyfile)?);
        let identity = Identity::from_pem(&pem)?;
        let ca = Certificate::from_pem(&read(ca_certs)?)?;

        let http = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .build()?;
        Ok(Self::with_client(url, http))
    }

    /// Client over an already configured HTTP client.
    pub fn with_client(url: Url, http: Client) -> Self {
        Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Invoke `method` and return its raw result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        tracing::debug!(id, method, url = %self.url, "Calling agent");

        let response = self.http.post(self.url.clone()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse = response.json().await?;
        Ok(envelope.into_result()?)
    }

    /// Invoke `method` and decode its result as `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let result = self.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn ping(&self) -> Result<String, ClientError> {
        self.call_as("ping", Value::Null).await
    }

    pub async fn is_haproxy_alive(&self) -> Result<String, ClientError> {
        self.call_as("is_haproxy_alive", Value::Null).await
    }

    pub async fn get_config(&self) -> Result<Config, ClientError> {
        self.call_as("get_config", Value::Null).await
    }

    pub async fn get_config_source_code(&self) -> Result<String, ClientError> {
        self.call_as("get_config_source_code", Value::Null).await
    }

    pub async fn get_servers_state(&self) -> Result<ServersState, ClientError> {
        self.call_as("get_servers_state", Value::Null).await
    }

    pub async fn validate_save_source_code(&self, source_code: &str, save: bool) -> Result<bool, ClientError> {
        self.call_as(
            "validate_save_source_code",
            json!({"source_code": source_code, "save": save}),
        )
        .await
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ClientError> {
    std::fs::read(path).map_err(|source| ClientError::Io {
        path: path.display().to_string(),
        source,
    })
}
