//! JSON-RPC request handlers, split by domain.

mod admin;
mod catalog;

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use dexsync_core::DexError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract an optional bool parameter, supporting both snake_case and camelCase.
pub(crate) fn get_bool_param(params: &Value, snake: &str, camel: &str) -> Option<bool> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_bool())
}

/// Extract an optional dex number. Present but not a positive u32 is an error.
pub(crate) fn get_id_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> dexsync_core::Result<Option<u32>> {
    let Some(raw) = params.get(snake).or_else(|| params.get(camel)) else {
        return Ok(None);
    };
    raw.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .map(Some)
        .ok_or_else(|| DexError::InvalidParams {
            message: format!("{} must be a positive integer, got {}", snake, raw),
        })
}

/// Extract a required dex number or return an error.
pub(crate) fn require_id_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> dexsync_core::Result<u32> {
    get_id_param(params, snake, camel)?.ok_or_else(|| DexError::InvalidParams {
        message: format!("Missing required parameter: {}", snake),
    })
}

/// Serialize a core result type into a JSON value.
pub(crate) fn to_value<T: Serialize>(value: T) -> dexsync_core::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "seeding": state.api.is_seeding(),
        "cache": state.api.cache_health().status,
    }))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let result = dispatch_method(&state, method, &params).await;

    match result {
        Ok(value) => {
            let wrapped = wrap_response(method, value);
            (StatusCode::OK, Json(JsonRpcResponse::success(id, wrapped)))
        }
        Err(e) => {
            let code = e.to_rpc_error_code();
            // Lookups that miss are routine; everything else is worth an error line.
            if matches!(e, DexError::NotFound { .. }) {
                debug!("RPC {} returned not found: {}", method, e);
            } else {
                error!("RPC error for {}: {}", method, e);
            }
            let data = e.is_retryable().then(|| json!({"retryable": true}));
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string(), data)),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> dexsync_core::Result<Value> {
    match method {
        // Catalog
        "get_pokemon" => catalog::get_pokemon(state, params).await,
        "list_pokemon" => catalog::list_pokemon(state, params).await,
        "list_types" => catalog::list_types(state, params).await,
        "list_generations" => catalog::list_generations(state, params).await,
        "catalog_stats" => catalog::catalog_stats(state, params).await,

        // Seeding
        "seed" => admin::seed(state, params).await,
        "refresh_pokemon" => admin::refresh_pokemon(state, params).await,
        "delete_pokemon" => admin::delete_pokemon(state, params).await,
        "seed_status" => admin::seed_status(state, params).await,
        "clear_catalog" => admin::clear_catalog(state, params).await,

        // Cache
        "cache_stats" => admin::cache_stats(state, params).await,
        "cache_health" => admin::cache_health(state, params).await,
        "cache_clear" => admin::cache_clear(state, params).await,
        "cache_reset_counters" => admin::cache_reset_counters(state, params).await,
        "cache_cleanup" => admin::cache_cleanup(state, params).await,

        // Upstream
        "upstream_metrics" => admin::upstream_metrics(state, params).await,

        _ => {
            warn!("Method not found: {}", method);
            Err(DexError::Other(format!("Method not found: {}", method)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
