//! The two external collaborators: the backend database driver and the embedding model.
//!
//! Both are deliberately out of scope here -- only their interfaces live in this crate. A real
//! implementation (a Cassandra/ScyllaDB driver, an HTTP call to an embedding service, ...) is a
//! consumer of this crate, not part of it: pluggable collaborators behind an `async_trait`.

use async_trait::async_trait;

use crate::error::StoreError;

/// A prepared statement identifier.
///
/// Stands in for the nine prepared statements a real session would build once at construction
/// time. A real `GraphBackend` implementation would have prepared each of these against a live
/// session; this crate treats them as an opaque dispatch key so the core stays driver-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    InsertPassage,
    InsertTarget,
    QueryById,
    QueryByEmbedding,
    QueryIdsAndLinkToTagsByEmbedding,
    QueryIdsAndLinkToTagsById,
    QueryIdsAndEmbeddingByEmbedding,
    QuerySourceTagsById,
    QueryTargetsEmbeddingsByKindTagEmbedding,
    QueryTargetsByKindAndTag,
}

/// Parameter bindings for a [`Statement`]. Only the fields relevant to a given statement are set;
/// the rest are `None`. This is the Rust analogue of positional `?` parameter binding against a
/// duck-typed row cursor.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub id: Option<String>,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub link_to_tags: Option<Vec<(String, String)>>,
    pub metadata_blob: Option<String>,
    pub links_blob: Option<String>,
    pub kind: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

impl QueryParams {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_embedding(embedding: Vec<f32>, limit: usize) -> Self {
        Self {
            embedding: Some(embedding),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn by_kind_and_tag(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            tag: Some(tag.into()),
            ..Default::default()
        }
    }

    pub fn by_kind_tag_and_embedding(
        kind: impl Into<String>,
        tag: impl Into<String>,
        embedding: Vec<f32>,
        limit: usize,
    ) -> Self {
        Self {
            kind: Some(kind.into()),
            tag: Some(tag.into()),
            embedding: Some(embedding),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn insert_passage(
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        link_to_tags: Vec<(String, String)>,
        metadata_blob: String,
        links_blob: String,
    ) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
            embedding: Some(embedding),
            link_to_tags: Some(link_to_tags),
            metadata_blob: Some(metadata_blob),
            links_blob: Some(links_blob),
            ..Default::default()
        }
    }

    pub fn insert_target(
        id: impl Into<String>,
        kind: impl Into<String>,
        tag: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(kind.into()),
            tag: Some(tag.into()),
            embedding: Some(embedding),
            ..Default::default()
        }
    }
}

/// A row returned by the backend. Only the columns a given statement projects are populated.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub content_id: Option<String>,
    pub text_content: Option<String>,
    pub text_embedding: Option<Vec<f32>>,
    pub link_to_tags: Option<Vec<(String, String)>>,
    pub metadata_blob: Option<String>,
    pub links_blob: Option<String>,
    pub target_content_id: Option<String>,
    pub target_text_embedding: Option<Vec<f32>>,
    pub kind: Option<String>,
    pub tag: Option<String>,
}

/// Read consistency for a single statement. The ANN queries run at the weakest useful level
/// (`One`) to minimize latency; everything else defaults to `Quorum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    One,
    Quorum,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::Quorum
    }
}

/// The columns/indexes to create at SYNC setup.
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    pub node_table: String,
    pub targets_table: String,
    pub embedding_dim: usize,
}

/// The backend database driver. Only its interface appears here, see module docs.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Create the passage/targets tables and their vector indexes if they don't already exist.
    async fn apply_schema(&self, schema: &SchemaSpec) -> Result<(), StoreError>;

    /// Execute one prepared statement and return its result rows.
    async fn execute(
        &self,
        statement: Statement,
        params: QueryParams,
        consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError>;
}

/// The embedding model. A pure function from text to a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    /// Batch variant; must preserve input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Extension hook for re-ranking `_get_adjacent`'s output by edge `kind`.
///
/// `_get_adjacent` expands a node's outgoing tags uniformly regardless of which `kind` of link
/// produced them; this is a known limitation, not an oversight to fix silently. The default
/// `NoopAdjacentScorer` changes nothing; a caller that cares about `kind`-aware ranking can
/// implement this trait and pass it to [`crate::store::GraphStore`].
pub trait AdjacentScorer: Send + Sync {
    /// Re-order (or filter) a source node's discovered `(kind, tag)` pairs before they're expanded.
    /// The default implementation returns the input unchanged.
    fn rank_tags(&self, tags: Vec<(String, String)>) -> Vec<(String, String)> {
        tags
    }
}

/// The default, no-op [`AdjacentScorer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdjacentScorer;

impl AdjacentScorer for NoopAdjacentScorer {}
