//! Seeding, cache administration and upstream handlers.

use super::{get_bool_param, get_id_param, get_str_param, require_id_param, to_value};
use crate::server::AppState;
use dexsync_core::{BatchSelection, DexError, InvalidationScope, SeedOptions};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Build the batch selection from the request.
///
/// `start`/`end` select an ad-hoc range, `labels` or `label` pick configured
/// batches, and no selector at all means every configured batch.
fn parse_selection(params: &Value) -> dexsync_core::Result<BatchSelection> {
    let start = get_id_param(params, "start", "start")?;
    let end = get_id_param(params, "end", "end")?;

    match (start, end) {
        (Some(start), Some(end)) => {
            let label = get_str_param(params, "label", "label")
                .map(String::from)
                .unwrap_or_else(|| format!("range-{}-{}", start, end));
            return Ok(BatchSelection::Range { label, start, end });
        }
        (None, None) => {}
        _ => {
            return Err(DexError::InvalidParams {
                message: "start and end must be given together".to_string(),
            })
        }
    }

    if let Some(labels) = params.get("labels") {
        let labels: Vec<String> =
            serde_json::from_value(labels.clone()).map_err(|e| DexError::InvalidParams {
                message: format!("labels must be a list of strings: {}", e),
            })?;
        return Ok(BatchSelection::Labels(labels));
    }

    Ok(match get_str_param(params, "label", "label") {
        Some("all") | None => BatchSelection::All,
        Some(label) => BatchSelection::label(label),
    })
}

pub async fn seed(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    let selection = parse_selection(params)?;
    let options = SeedOptions {
        force_refresh: get_bool_param(params, "force_refresh", "forceRefresh").unwrap_or(false),
    };

    if !get_bool_param(params, "background", "background").unwrap_or(false) {
        return to_value(state.api.seed(&selection, options).await?);
    }

    // Unknown labels and a held lock are reported to this caller, not the log.
    state.api.plan().select(&selection)?;
    let permit = state.api.try_begin_seed()?;
    let api = state.api.clone();
    tokio::spawn(async move {
        match api.seed_with_permit(permit, &selection, options).await {
            Ok(summary) => info!(
                "Background seed finished: {} written, {} skipped, {} failed, {} timed out",
                summary.totals.succeeded,
                summary.totals.skipped,
                summary.totals.failed,
                summary.timed_out.len()
            ),
            Err(e) => warn!("Background seed failed: {}", e),
        }
    });
    Ok(json!({"started": true}))
}

pub async fn seed_status(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    Ok(json!({
        "seeding": state.api.is_seeding(),
        "batches": state.api.plan().batches,
        "last_run": state.api.last_seed_run(),
    }))
}

pub async fn refresh_pokemon(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    let id = require_id_param(params, "id", "id")?;
    to_value(state.api.refresh_pokemon(id).await?)
}

pub async fn delete_pokemon(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    let id = require_id_param(params, "id", "id")?;
    state.api.delete_pokemon(id).await?;
    Ok(json!({"deleted": id}))
}

pub async fn clear_catalog(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    let removed = state.api.clear_catalog().await?;
    Ok(json!({"removed": removed}))
}

pub async fn cache_stats(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.cache_stats())
}

pub async fn cache_health(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.cache_health())
}

pub async fn cache_clear(state: &AppState, params: &Value) -> dexsync_core::Result<Value> {
    let scope = get_str_param(params, "scope", "scope").unwrap_or("all");
    let target = get_str_param(params, "target", "target");
    let scope = InvalidationScope::parse(scope, target)?;
    let removed = state.api.cache_clear(&scope);
    Ok(json!({"removed": removed}))
}

pub async fn cache_cleanup(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    Ok(json!({"removed": state.api.cache_cleanup()}))
}

pub async fn cache_reset_counters(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    state.api.cache_reset_counters();
    Ok(json!({"reset": true}))
}

pub async fn upstream_metrics(state: &AppState, _params: &Value) -> dexsync_core::Result<Value> {
    to_value(state.api.upstream_metrics())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_defaults_to_all() {
        assert_eq!(parse_selection(&json!({})).unwrap(), BatchSelection::All);
        assert_eq!(
            parse_selection(&json!({"label": "all"})).unwrap(),
            BatchSelection::All
        );
    }

    #[test]
    fn test_selection_by_label_and_range() {
        assert_eq!(
            parse_selection(&json!({"label": "generation-2"})).unwrap(),
            BatchSelection::label("generation-2")
        );
        assert_eq!(
            parse_selection(&json!({"labels": ["generation-1", "generation-3"]})).unwrap(),
            BatchSelection::Labels(vec!["generation-1".into(), "generation-3".into()])
        );
        assert_eq!(
            parse_selection(&json!({"start": 1, "end": 10})).unwrap(),
            BatchSelection::Range {
                label: "range-1-10".into(),
                start: 1,
                end: 10
            }
        );
    }

    #[test]
    fn test_selection_rejects_half_ranges() {
        assert!(parse_selection(&json!({"start": 5})).is_err());
        assert!(parse_selection(&json!({"labels": "generation-1"})).is_err());
        assert!(parse_selection(&json!({"start": 0, "end": 3})).is_err());
    }
}
