//! Hybrid vector-and-graph retrieval engine over a wide-column database backend.
//!
//! Stores text nodes that carry both a dense embedding and a set of typed directional links to
//! abstract tags, and retrieves them by vector similarity, bounded-depth graph traversal, or an
//! MMR-reranked interleaving of the two. The backend database and the embedding model are
//! pluggable collaborators ([`backend::GraphBackend`], [`backend::EmbeddingModel`]); this crate
//! implements the retrieval logic on top of them, not a driver for any specific database.

pub mod backend;
pub mod concurrency;
pub mod error;
pub mod link;
pub mod mmr;
pub mod node;
pub mod serialization;
pub mod store;

/// In-memory mock collaborators, used by this crate's own tests and by `graphstore-demo`.
/// Not cfg-gated, so it's usable from both tests and the demo binary.
pub mod testutil;

pub use backend::{AdjacentScorer, Consistency, EmbeddingModel, GraphBackend, NoopAdjacentScorer};
pub use error::{Result, StoreError};
pub use link::{Direction, Link};
pub use node::{Node, StoredNode};
pub use store::{GraphStore, GraphStoreConfig, SetupMode};
