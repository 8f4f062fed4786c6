//! Response wrapping for RPC clients.
//!
//! Bare lists are wrapped as `{success: true, <field>: [...]}` so every
//! method returns an object. Object results pass through unchanged.

use serde_json::{json, Value};

/// Wrap a handler result into the shape clients expect for `method`.
pub fn wrap_response(method: &str, result: Value) -> Value {
    match method {
        "list_types" => wrap_list("types", result),
        "list_generations" => wrap_list("generations", result),

        // Null when the upstream is a stub without counters
        "upstream_metrics" => {
            json!({
                "success": true,
                "available": !result.is_null(),
                "metrics": if result.is_null() { json!({}) } else { result }
            })
        }

        _ => result,
    }
}

fn wrap_list(field: &str, result: Value) -> Value {
    let items = if result.is_null() { json!([]) } else { result };
    let mut wrapped = serde_json::Map::new();
    wrapped.insert("success".to_string(), Value::Bool(true));
    wrapped.insert(field.to_string(), items);
    Value::Object(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_wrapping() {
        let wrapped = wrap_response("list_types", json!(["fire", "water"]));
        assert_eq!(wrapped["success"], true);
        assert_eq!(wrapped["types"], json!(["fire", "water"]));

        let wrapped = wrap_response("list_generations", Value::Null);
        assert_eq!(wrapped["generations"], json!([]));
    }

    #[test]
    fn test_upstream_metrics_wrapping() {
        let wrapped = wrap_response("upstream_metrics", Value::Null);
        assert_eq!(wrapped["available"], false);

        let wrapped = wrap_response("upstream_metrics", json!({"total_requests": 3}));
        assert_eq!(wrapped["available"], true);
        assert_eq!(wrapped["metrics"]["total_requests"], 3);
    }

    #[test]
    fn test_passthrough() {
        let page = json!({"items": [], "page": 1, "per_page": 20, "total": 0});
        assert_eq!(wrap_response("list_pokemon", page.clone()), page);
    }
}
