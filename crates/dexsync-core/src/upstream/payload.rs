//! PokeAPI wire types and normalization into [`NormalizedRecord`].

use crate::models::NormalizedRecord;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `{ "name": ..., "url": ... }` reference used throughout PokeAPI.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedResource {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeSlot {
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbilitySlot {
    pub ability: NamedResource,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatEntry {
    pub base_stat: u32,
    pub stat: NamedResource,
}

/// The subset of `GET /pokemon/{id}` this crate reads.
///
/// Fields without `#[serde(default)]` are required: a payload missing any of
/// them fails to deserialize.
#[derive(Debug, Clone, Deserialize)]
pub struct PokemonPayload {
    pub id: u32,
    pub name: String,
    pub height: u32,
    pub weight: u32,
    #[serde(default)]
    pub base_experience: Option<u32>,
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub abilities: Vec<AbilitySlot>,
    #[serde(default)]
    pub stats: Vec<StatEntry>,
    #[serde(default)]
    pub sprites: Map<String, Value>,
}

impl PokemonPayload {
    /// Flatten into the internal schema and check it is usable.
    ///
    /// Returns the reason when the record fails validation.
    pub fn normalize(self) -> Result<NormalizedRecord, String> {
        let mut types = self.types;
        // Stable sort keeps upstream order for slots that tie or are absent.
        types.sort_by_key(|t| t.slot.unwrap_or(u32::MAX));

        let record = NormalizedRecord {
            id: self.id,
            name: self.name.trim().to_string(),
            height: self.height,
            weight: self.weight,
            base_experience: self.base_experience,
            types: types.into_iter().map(|t| t.kind.name).collect(),
            abilities: self.abilities.into_iter().map(|a| a.ability.name).collect(),
            stats: self
                .stats
                .into_iter()
                .map(|s| (s.stat.name, s.base_stat))
                .collect(),
            sprites: top_level_sprites(&self.sprites),
        };

        validate(&record)?;
        Ok(record)
    }
}

/// Non-null string fields directly under `sprites`. Nested groups such as
/// `other` and `versions` are left out.
fn top_level_sprites(sprites: &Map<String, Value>) -> BTreeMap<String, String> {
    sprites
        .iter()
        .filter_map(|(slot, value)| value.as_str().map(|url| (slot.clone(), url.to_string())))
        .collect()
}

fn validate(record: &NormalizedRecord) -> Result<(), String> {
    if record.id == 0 {
        return Err("id must be positive".to_string());
    }
    if record.name.is_empty() {
        return Err("name is empty".to_string());
    }
    if record.types.is_empty() {
        return Err("record has no types".to_string());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A trimmed-down but structurally faithful `/pokemon/{id}` body.
    pub(crate) fn sample_payload(id: u32, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "height": 7,
            "weight": 69,
            "base_experience": 64,
            "types": [
                {"slot": 2, "type": {"name": "poison", "url": "https://pokeapi.co/api/v2/type/4/"}},
                {"slot": 1, "type": {"name": "grass", "url": "https://pokeapi.co/api/v2/type/12/"}}
            ],
            "abilities": [
                {"ability": {"name": "overgrow", "url": "https://pokeapi.co/api/v2/ability/65/"}, "is_hidden": false, "slot": 1},
                {"ability": {"name": "chlorophyll", "url": "https://pokeapi.co/api/v2/ability/34/"}, "is_hidden": true, "slot": 3}
            ],
            "stats": [
                {"base_stat": 45, "effort": 0, "stat": {"name": "hp", "url": "https://pokeapi.co/api/v2/stat/1/"}},
                {"base_stat": 49, "effort": 0, "stat": {"name": "attack", "url": "https://pokeapi.co/api/v2/stat/2/"}},
                {"base_stat": 65, "effort": 1, "stat": {"name": "special-attack", "url": "https://pokeapi.co/api/v2/stat/4/"}}
            ],
            "sprites": {
                "front_default": format!("https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/{}.png", id),
                "back_default": format!("https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/back/{}.png", id),
                "front_shiny": null,
                "other": {"official-artwork": {"front_default": "https://example.invalid/art.png"}}
            },
            "moves": [],
            "species": {"name": name, "url": "https://pokeapi.co/api/v2/pokemon-species/1/"}
        })
    }

    #[test]
    fn test_normalize_flattens_payload() {
        let payload: PokemonPayload =
            serde_json::from_value(sample_payload(1, "bulbasaur")).unwrap();
        let record = payload.normalize().unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.name, "bulbasaur");
        assert_eq!(record.height, 7);
        assert_eq!(record.weight, 69);
        assert_eq!(record.base_experience, Some(64));
        assert_eq!(record.types, vec!["grass", "poison"]);
        assert_eq!(record.abilities, vec!["overgrow", "chlorophyll"]);
        assert_eq!(record.stats.get("hp"), Some(&45));
        assert_eq!(record.stats.get("special-attack"), Some(&65));
        assert_eq!(record.sprites.len(), 2);
        assert!(record.sprites["front_default"].ends_with("/pokemon/1.png"));
        assert!(!record.sprites.contains_key("front_shiny"));
        assert!(!record.sprites.contains_key("other"));
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let mut body = sample_payload(1, "bulbasaur");
        body.as_object_mut().unwrap().remove("types");
        let err = serde_json::from_value::<PokemonPayload>(body).unwrap_err();
        assert!(err.to_string().contains("types"));
    }

    #[test]
    fn test_empty_types_fails_validation() {
        let mut body = sample_payload(1, "bulbasaur");
        body["types"] = json!([]);
        let payload: PokemonPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.normalize().unwrap_err(), "record has no types");
    }
}
