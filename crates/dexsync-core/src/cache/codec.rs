//! Value encoding for cache entries.
//!
//! JSON is tried first. Values JSON cannot represent (maps with non-string
//! keys, for instance) fall back to bincode. The first byte of the payload
//! records which format was used.

use crate::error::{DexError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const TAG_JSON: u8 = b'j';
const TAG_BINCODE: u8 = b'b';

/// Wire format of an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Bincode,
}

/// Encode a value, returning the tagged payload and the format used.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<(Vec<u8>, Format)> {
    let mut out = vec![TAG_JSON];
    match serde_json::to_writer(&mut out, value) {
        Ok(()) => return Ok((out, Format::Json)),
        Err(e) => tracing::debug!("JSON encoding failed, falling back to bincode: {}", e),
    }

    let body = bincode::serialize(value).map_err(|e| DexError::CacheSerialization {
        message: format!("value is not serializable: {}", e),
    })?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(TAG_BINCODE);
    out.extend_from_slice(&body);
    Ok((out, Format::Bincode))
}

/// Decode a payload produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (tag, body) = bytes.split_first().ok_or_else(|| DexError::CacheSerialization {
        message: "empty cache payload".to_string(),
    })?;

    match *tag {
        TAG_JSON => serde_json::from_slice(body).map_err(|e| DexError::CacheSerialization {
            message: format!("invalid JSON payload: {}", e),
        }),
        TAG_BINCODE => bincode::deserialize(body).map_err(|e| DexError::CacheSerialization {
            message: format!("invalid bincode payload: {}", e),
        }),
        other => Err(DexError::CacheSerialization {
            message: format!("unknown payload tag 0x{:02x}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_json_is_primary() {
        let (bytes, format) = encode(&vec!["fire", "flying"]).unwrap();
        assert_eq!(format, Format::Json);
        assert_eq!(&bytes[1..], br#"["fire","flying"]"#);
        let back: Vec<String> = decode(&bytes).unwrap();
        assert_eq!(back, vec!["fire", "flying"]);
    }

    #[test]
    fn test_non_string_map_keys_fall_back_to_bincode() {
        let matchups: HashMap<(u32, u32), f32> = HashMap::from([((1, 4), 2.0), ((4, 1), 0.5)]);

        let (bytes, format) = encode(&matchups).unwrap();
        assert_eq!(format, Format::Bincode);

        let back: HashMap<(u32, u32), f32> = decode(&bytes).unwrap();
        assert_eq!(back, matchups);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode::<u32>(&[]).is_err());
        assert!(decode::<u32>(b"zzz").is_err());
        assert!(decode::<u32>(b"j{not json").is_err());
    }
}
