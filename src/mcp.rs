use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;

use crate::dispatch::Dispatcher;
use crate::error::{LogDrainError, Result};
use crate::tools;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    code: i32,
    message: String,
}

/// Serve both protocol front-ends over stdio, one JSON object per line.
/// Requests are processed fully in order; store I/O suspends the loop
/// without blocking the rest of the process.
pub async fn run_stdio(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                write_response(
                    &mut stdout,
                    RpcResponse {
                        jsonrpc: "2.0",
                        id: Value::Null,
                        result: None,
                        error: Some(RpcError {
                            code: -32700,
                            message: format!("parse error: {e}"),
                        }),
                    },
                )
                .await?;
                continue;
            }
        };

        // Notifications carry no id and expect no response.
        if req.id.is_null() && req.method.starts_with("notifications/") {
            continue;
        }

        let resp = process_request(&dispatcher, req).await;
        write_response(&mut stdout, resp).await?;
    }

    Ok(())
}

pub async fn process_request(dispatcher: &Dispatcher, req: RpcRequest) -> RpcResponse {
    let method = req.method.clone();
    match method.as_str() {
        "initialize" => handle_initialize(&req),
        "notifications/initialized" => ok_response(req.id, Value::Bool(true)),
        "tools/list" | "list_tools" => ok_response(req.id, json!({ "tools": tools::catalog() })),
        "tools/call" => handle_tool_call(dispatcher, req).await,
        // Front-end A: the method name is the tool name.
        _ => handle_method(dispatcher, req).await,
    }
}

fn handle_initialize(req: &RpcRequest) -> RpcResponse {
    ok_response(
        req.id.clone(),
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "log-drain-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

async fn handle_method(dispatcher: &Dispatcher, req: RpcRequest) -> RpcResponse {
    match dispatcher.dispatch(&req.method, &req.params).await {
        Ok(output) => match serde_json::to_value(&output) {
            Ok(value) => ok_response(req.id, value),
            Err(e) => rpc_failure(req.id, LogDrainError::InvalidPayload(e.to_string())),
        },
        Err(e) => rpc_failure(req.id, e),
    }
}

/// Discover/invoke call. Failures come back as an error-flagged result,
/// never as a protocol-level error.
async fn handle_tool_call(dispatcher: &Dispatcher, req: RpcRequest) -> RpcResponse {
    #[derive(Deserialize)]
    struct CallParams {
        name: String,
        #[serde(default)]
        arguments: Value,
    }

    let params: CallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return rpc_failure(req.id, LogDrainError::InvalidParams(format!("invalid params: {e}")))
        }
    };

    let result = match dispatcher.dispatch(&params.name, &params.arguments).await {
        Ok(output) => {
            let text = serde_json::to_string_pretty(&output).unwrap_or_else(|_| "[]".to_string());
            json!({ "content": [{ "type": "text", "text": text }] })
        }
        Err(err) => {
            let message = tool_error_message(&err);
            json!({
                "content": [{ "type": "text", "text": format!("Error: {message}") }],
                "isError": true
            })
        }
    };
    ok_response(req.id, result)
}

fn tool_error_message(err: &LogDrainError) -> String {
    match err {
        LogDrainError::ToolNotFound(name) => format!("unknown tool: {name}"),
        LogDrainError::InvalidParams(msg) => msg.clone(),
        other => {
            error!("tool call failed: {other}");
            "internal error".to_string()
        }
    }
}

fn rpc_failure(id: Value, err: LogDrainError) -> RpcResponse {
    let (code, message) = match &err {
        LogDrainError::ToolNotFound(name) => (-32601, format!("method not found: {name}")),
        LogDrainError::InvalidParams(msg) => (-32602, format!("invalid params: {msg}")),
        LogDrainError::InvalidPayload(msg) => (-32602, format!("invalid params: {msg}")),
        other => {
            error!("request failed: {other}");
            (-32603, "internal error".to_string())
        }
    };
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

fn ok_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

async fn write_response(stdout: &mut tokio::io::Stdout, resp: RpcResponse) -> Result<()> {
    let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
