//! Cache key derivation.
//!
//! Entity lookups use `namespace:id`. Parameterized queries use
//! `namespace:<hash>` where the hash covers the parameter set sorted by name,
//! so argument order never changes the key.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known namespaces.
pub mod namespaces {
    /// Single-record detail lookups.
    pub const POKEMON: &str = "pokemon";
    /// Paginated, searched and filtered listings.
    pub const POKEMON_LIST: &str = "pokemon_list";
    /// Distinct type tags.
    pub const POKEMON_TYPES: &str = "pokemon_types";
    /// Raw records mirrored from the upstream provider.
    pub const UPSTREAM_POKEMON: &str = "pokeapi_pokemon";

    /// Namespaces derived from the catalog store.
    pub const CATALOG: [&str; 3] = [POKEMON, POKEMON_LIST, POKEMON_TYPES];
    /// Namespaces that go stale when the set of stored records changes.
    pub const LISTINGS: [&str; 2] = [POKEMON_LIST, POKEMON_TYPES];
}

/// Hex characters of the SHA-256 digest kept in a query key.
const HASH_LEN: usize = 16;

/// A parameter set for a cacheable query.
///
/// Backed by a `BTreeMap`, so iteration and serialization are always sorted
/// by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Add the parameter only when present. Absent and unset are the same key.
    pub fn with_opt<V: Into<Value>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON rendering: keys sorted at every level, no whitespace.
    pub fn canonical(&self) -> String {
        Value::Object(self.0.clone().into_iter().collect()).to_string()
    }

    /// Truncated hex SHA-256 of the canonical rendering.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.canonical().as_bytes());
        let mut hex = hex::encode(hash);
        hex.truncate(HASH_LEN);
        hex
    }
}

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    key: String,
}

impl CacheKey {
    /// Key for a single entity.
    pub fn entity(namespace: &str, id: impl fmt::Display) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: id.to_string(),
        }
    }

    /// Key for a parameterized query.
    pub fn query(namespace: &str, params: &QueryParams) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: params.digest(),
        }
    }

    /// Parse `namespace:key`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (namespace, key) = raw.split_once(':')?;
        if namespace.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entity_key() {
        let key = CacheKey::entity(namespaces::POKEMON, 25);
        assert_eq!(key.to_string(), "pokemon:25");
        assert_eq!(CacheKey::parse("pokemon:25"), Some(key));
        assert_eq!(CacheKey::parse("pokemon"), None);
        assert_eq!(CacheKey::parse(":25"), None);
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let a = QueryParams::new()
            .with("page", 2)
            .with("search", "char")
            .with("type", "fire");
        let b = QueryParams::new()
            .with("type", "fire")
            .with("page", 2)
            .with("search", "char");

        assert_eq!(a.canonical(), r#"{"page":2,"search":"char","type":"fire"}"#);
        assert_eq!(
            CacheKey::query(namespaces::POKEMON_LIST, &a),
            CacheKey::query(namespaces::POKEMON_LIST, &b)
        );
    }

    #[test]
    fn test_any_differing_value_changes_key() {
        let base = QueryParams::new().with("page", 1).with("per_page", 20);
        let variants = [
            base.clone().with("page", 2),
            base.clone().with("per_page", 21),
            base.clone().with("search", "a"),
            base.clone().with("type", "a"),
        ];
        let base_key = CacheKey::query(namespaces::POKEMON_LIST, &base);
        for variant in &variants {
            assert_ne!(CacheKey::query(namespaces::POKEMON_LIST, variant), base_key);
        }
    }

    #[test]
    fn test_no_collisions_in_sample() {
        let mut seen = HashSet::new();
        for page in 1..=40u32 {
            for per_page in [10u32, 20, 50, 100] {
                for search in [None, Some("bulba"), Some("char"), Some("pika")] {
                    let params = QueryParams::new()
                        .with("page", page)
                        .with("per_page", per_page)
                        .with_opt("search", search);
                    assert!(seen.insert(params.digest()), "collision for {:?}", params);
                }
            }
        }
        assert_eq!(seen.len(), 40 * 4 * 4);
    }

    #[test]
    fn test_digest_length() {
        assert_eq!(QueryParams::new().digest().len(), 16);
    }
}
