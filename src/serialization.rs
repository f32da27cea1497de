//! Stable JSON-shaped encoding for metadata and link sets.
//!
//! `metadata` is typed as `serde_json::Map<String, Value>`, and a link set has no direct JSON
//! representation (`serde_json::Value` has no set variant), so links are encoded through an
//! intermediate `WireLink` array instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::StoreError;
use crate::link::{Direction, Link};

/// Encode a node's metadata map as its `metadata_blob` JSON object.
pub fn serialize_metadata(metadata: &Map<String, serde_json::Value>) -> String {
    serde_json::Value::Object(metadata.clone()).to_string()
}

/// Decode a `metadata_blob` back into a metadata map.
pub fn deserialize_metadata(blob: &str) -> Result<Map<String, serde_json::Value>, StoreError> {
    if blob.is_empty() {
        return Ok(Map::new());
    }
    let value: serde_json::Value = serde_json::from_str(blob)
        .map_err(|e| StoreError::Input(format!("invalid metadata_blob JSON: {e}")))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Input(format!(
            "metadata_blob must decode to a JSON object, got {other}"
        ))),
    }
}

#[derive(Serialize, Deserialize)]
struct WireLink {
    kind: String,
    tag: String,
    direction: String,
}

/// Encode a node's link set as its `links_blob` JSON array.
pub fn serialize_links(links: &HashSet<Link>) -> String {
    let wire: Vec<WireLink> = links
        .iter()
        .map(|l| WireLink {
            kind: l.kind.clone(),
            tag: l.tag.clone(),
            direction: l.direction.as_str().to_string(),
        })
        .collect();
    serde_json::to_string(&wire).expect("link wire form always serializes")
}

/// Decode a `links_blob` back into a link set.
///
/// An unrecognized `direction` value is a decode error, not silently dropped.
pub fn deserialize_links(blob: &str) -> Result<HashSet<Link>, StoreError> {
    if blob.is_empty() {
        return Ok(HashSet::new());
    }
    let wire: Vec<WireLink> = serde_json::from_str(blob)
        .map_err(|e| StoreError::Input(format!("invalid links_blob JSON: {e}")))?;
    wire.into_iter()
        .map(|w| {
            Direction::parse(&w.direction).map(|direction| Link {
                kind: w.kind,
                tag: w.tag,
                direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), serde_json::json!("unit-test"));
        metadata.insert("score".to_string(), serde_json::json!(0.5));
        let blob = serialize_metadata(&metadata);
        let decoded = deserialize_metadata(&blob).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn links_round_trip_as_a_set() {
        let mut links = HashSet::new();
        links.insert(Link::outgoing("hyperlink", "T"));
        links.insert(Link::bidir("mention", "alice"));
        let blob = serialize_links(&links);
        let decoded = deserialize_links(&blob).unwrap();
        assert_eq!(decoded, links);
    }

    #[test]
    fn empty_blobs_decode_to_empty_collections() {
        assert!(deserialize_metadata("").unwrap().is_empty());
        assert!(deserialize_links("").unwrap().is_empty());
    }

    #[test]
    fn unknown_direction_is_a_decode_error() {
        let blob = r#"[{"kind":"hyperlink","tag":"T","direction":"sideways"}]"#;
        assert!(deserialize_links(blob).is_err());
    }
}
