use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One Pokemon, flattened from the upstream payload.
///
/// Produced by an upstream source and never mutated afterwards. The store
/// owns it once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// National dex number. Positive and immutable.
    pub id: u32,
    pub name: String,
    /// Decimetres.
    pub height: u32,
    /// Hectograms.
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_experience: Option<u32>,
    /// Type tags in slot order.
    pub types: Vec<String>,
    /// Ability tags in upstream order.
    pub abilities: Vec<String>,
    /// Stat name to base value.
    pub stats: BTreeMap<String, u32>,
    /// Sprite slot to image URL.
    pub sprites: BTreeMap<String, String>,
}

/// A record as held by the catalog store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn id(&self) -> u32 {
        self.record.id
    }
}
