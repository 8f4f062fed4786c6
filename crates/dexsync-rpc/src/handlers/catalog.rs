//! Catalog read handlers.

use super::{require_id_param, to_value};
use crate::server::AppState;
use dexsync_core::{CatalogQuery, DexError};
use serde_json::Value;

pub async fn get_pokemon(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    let id = require_id_param(params, "id", "id")?;
    match state.api.get_pokemon(id).await? {
        Some(record) => to_value(record),
        None => Err(DexError::NotFound { id }),
    }
}

pub async fn list_pokemon(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    // Accept camelCase perPage alongside the canonical field names.
    let mut params = params.clone();
    if let Some(obj) = params.as_object_mut() {
        if let Some(per_page) = obj.remove("perPage") {
            obj.entry("per_page").or_insert(per_page);
        }
    }
    let query: CatalogQuery =
        serde_json::from_value(params).map_err(|e| DexError::InvalidParams {
            message: format!("Invalid listing parameters: {}", e),
        })?;
    to_value(state.api.list_pokemon(&query).await?)
}

pub async fn list_types(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.list_types().await?)
}

pub async fn list_generations(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.list_generations().await?)
}

pub async fn catalog_stats(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.catalog_stats().await?)
}
