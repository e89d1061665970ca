//! Public RPC methods.
//!
//! Every method is declared in [`METHODS`]; nothing is registered at
//! runtime. Handlers decode their params, call the agent and encode the
//! result as JSON.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent::LoadBalancerAgent;
use crate::lb_config::Config;
use crate::observability::metrics;
use crate::rpc::protocol::{RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};

pub type Handler = fn(Arc<LoadBalancerAgent>, Value) -> BoxFuture<'static, Result<Value, RpcError>>;

/// Public method name → handler.
pub const METHODS: &[(&str, Handler)] = &[
    ("ping", ping as Handler),
    ("is_haproxy_alive", is_haproxy_alive as Handler),
    ("get_config", get_config as Handler),
    ("get_config_source_code", get_config_source_code as Handler),
    ("get_uptime_info", get_uptime_info as Handler),
    ("get_work_config", get_work_config as Handler),
    ("get_servers_state", get_servers_state as Handler),
    ("get_server_data_dict", get_server_data_dict as Handler),
    ("validate_save", validate_save as Handler),
    ("validate_save_source_code", validate_save_source_code as Handler),
    ("rename_server", rename_server as Handler),
    ("add_remove_server", add_remove_server as Handler),
    ("execute_command", execute_command as Handler),
    ("haproxy_version_info", haproxy_version_info as Handler),
    ("get_known_commands", get_known_commands as Handler),
];

pub fn lookup(method: &str) -> Option<Handler> {
    METHODS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, handler)| *handler)
}

/// Run one request against the agent.
pub async fn dispatch(agent: Arc<LoadBalancerAgent>, request: RpcRequest) -> RpcResponse {
    let call_id = Uuid::new_v4();
    let started = Instant::now();

    if request.jsonrpc != JSONRPC_VERSION {
        return RpcResponse::failure(
            request.id,
            RpcError::invalid_request(format!("unsupported jsonrpc version [{}]", request.jsonrpc)),
        );
    }

    let Some(handler) = lookup(&request.method) else {
        tracing::warn!(call_id = %call_id, method = %request.method, "Unknown RPC method");
        return RpcResponse::failure(request.id, RpcError::method_not_found(&request.method));
    };

    tracing::debug!(call_id = %call_id, method = %request.method, "RPC call");
    let outcome = handler(agent, request.params).await;
    metrics::record_rpc(&request.method, outcome.is_ok(), started);

    match outcome {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(error) => {
            tracing::error!(
                call_id = %call_id,
                method = %request.method,
                error = %error,
                "RPC call failed"
            );
            RpcResponse::failure(request.id, error)
        }
    }
}

/// Decode params; absent params decode like an empty object.
fn params<T: DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    let value = match value {
        Value::Null => json!({}),
        other => other,
    };
    serde_json::from_value(value).map_err(RpcError::invalid_params)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::internal)
}

#[derive(Debug, Deserialize)]
struct ServerDataParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateSaveParams {
    lb_config: Config,
    #[serde(default)]
    save: bool,
}

#[derive(Debug, Deserialize)]
struct ValidateSaveSourceParams {
    source_code: String,
    #[serde(default)]
    save: bool,
}

#[derive(Debug, Deserialize)]
struct RenameParams {
    old_name: String,
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct AddRemoveParams {
    action: String,
    server_name: String,
}

/// Command indexes arrive as numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandIndex {
    Number(u32),
    Text(String),
}

impl CommandIndex {
    fn value(&self) -> Result<u32, RpcError> {
        match self {
            CommandIndex::Number(n) => Ok(*n),
            CommandIndex::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| RpcError::invalid_params(format!("command index [{}] is not a number", s))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteCommandParams {
    command: CommandIndex,
    /// Milliseconds.
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    extra: String,
}

fn ping(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { Ok(json!(agent.ping())) }.boxed()
}

fn is_haproxy_alive(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { Ok(json!(agent.is_haproxy_alive().await?)) }.boxed()
}

fn get_config(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { encode(&*agent.get_config()) }.boxed()
}

fn get_config_source_code(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { Ok(json!(agent.get_config_source_code().await?)) }.boxed()
}

fn get_uptime_info(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { Ok(json!(agent.get_uptime_info())) }.boxed()
}

fn get_work_config(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { encode(&agent.get_work_config()) }.boxed()
}

fn get_servers_state(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { encode(&agent.get_servers_state().await?) }.boxed()
}

fn get_server_data_dict(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: ServerDataParams = self::params(params)?;
        encode(&agent.get_server_data_dict(p.name.as_deref()).await?)
    }
    .boxed()
}

fn validate_save(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: ValidateSaveParams = self::params(params)?;
        Ok(json!(agent.validate_save(&p.lb_config, p.save).await?))
    }
    .boxed()
}

fn validate_save_source_code(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: ValidateSaveSourceParams = self::params(params)?;
        Ok(json!(agent.validate_save_source_code(&p.source_code, p.save).await?))
    }
    .boxed()
}

fn rename_server(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: RenameParams = self::params(params)?;
        Ok(json!(agent.rename_server(&p.old_name, &p.new_name).await?))
    }
    .boxed()
}

fn add_remove_server(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: AddRemoveParams = self::params(params)?;
        Ok(json!(agent.add_remove_server(&p.action, &p.server_name).await?))
    }
    .boxed()
}

fn execute_command(agent: Arc<LoadBalancerAgent>, params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move {
        let p: ExecuteCommandParams = self::params(params)?;
        let index = p.command.value()?;
        let timeout = p.timeout.map(Duration::from_millis);
        Ok(json!(agent.execute_command(index, timeout, &p.extra).await?))
    }
    .boxed()
}

fn haproxy_version_info(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { encode(&agent.haproxy_version_info().await?) }.boxed()
}

fn get_known_commands(agent: Arc<LoadBalancerAgent>, _params: Value) -> BoxFuture<'static, Result<Value, RpcError>> {
    async move { encode(&agent.get_known_commands()) }.boxed()
}
