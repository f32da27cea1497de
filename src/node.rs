//! The node model: a stored text chunk carrying an embedding (once written) and a set of [`Link`]s.

use std::collections::HashSet;

use rand::RngCore;
use serde_json::Map;

use crate::link::Link;

/// A text node, as authored (before or independent of storage).
///
/// `id` is optional at authoring time: [`crate::store::GraphStore::add_nodes`] assigns a
/// 16-hex-character id to any node that doesn't already have one.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Map<String, serde_json::Value>,
    pub links: HashSet<Link>,
}

impl Node {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: Map::new(),
            links: HashSet::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_links(mut self, links: HashSet<Link>) -> Self {
        self.links = links;
        self
    }

    pub fn add_link(mut self, link: Link) -> Self {
        self.links.insert(link);
        self
    }
}

/// A fully hydrated node as read back from the backend: always has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, serde_json::Value>,
    pub links: HashSet<Link>,
}

/// Generate a 16-hex-character id, the Rust analogue of `secrets.token_hex(8)`.
pub fn generate_node_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_sixteen_hex_chars() {
        let id = generate_node_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_ids_are_not_trivially_repeated() {
        let a = generate_node_id();
        let b = generate_node_id();
        assert_ne!(a, b);
    }
}
