//! The graph store: schema manager, write path, and the three read paths.
//!
//! Every read and write runs inside a [`crate::concurrency::ConcurrentQueries`] scope, fanning out
//! backend calls with bounded concurrency and joining before returning. Shared per-call state
//! (`visited_ids`, `visited_tags`, `targets`) is guarded by a `std::sync::Mutex` taken only across
//! synchronous critical sections, never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Map;
use tracing::{debug, info};

use crate::backend::{
    AdjacentScorer, Consistency, EmbeddingModel, GraphBackend, NoopAdjacentScorer, QueryParams,
    Row, SchemaSpec, Statement,
};
use crate::concurrency::{ConcurrentQueries, DEFAULT_MAX_IN_FLIGHT};
use crate::error::{Result, StoreError};
use crate::mmr::MmrHelper;
use crate::node::{generate_node_id, Node, StoredNode};
use crate::serialization::{deserialize_links, deserialize_metadata, serialize_links, serialize_metadata};

type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Whether to create the schema on construction, or assume it already exists.
///
/// A closed two-variant enum: there is no third value to reject at construction time, so an
/// invalid setup mode is a compile error rather than a runtime check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    Sync,
    Off,
}

/// Tunables for a [`GraphStore`], with the spec's documented defaults.
#[derive(Debug, Clone)]
pub struct GraphStoreConfig {
    pub node_table: String,
    pub targets_table: String,
    /// In-flight backend call ceiling for every concurrent-query scope this store opens.
    pub max_in_flight: usize,
    pub k: usize,
    pub depth: usize,
    pub fetch_k: usize,
    pub adjacent_k: usize,
    pub lambda_mult: f32,
    pub score_threshold: f32,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            node_table: "passages".to_string(),
            targets_table: "targets".to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            k: 4,
            depth: 2,
            fetch_k: 100,
            adjacent_k: 10,
            lambda_mult: 0.5,
            score_threshold: f32::MIN,
        }
    }
}

/// The hybrid vector-and-graph store. One instance owns a fixed embedding dimension (probed at
/// construction) and a pair of backend collaborators.
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    embedding_model: Arc<dyn EmbeddingModel>,
    adjacent_scorer: Arc<dyn AdjacentScorer>,
    config: GraphStoreConfig,
    embedding_dim: usize,
}

impl GraphStore {
    /// Probes the embedding model for its dimension and, under [`SetupMode::Sync`], applies the
    /// schema before returning. `SetupMode::Off` assumes the schema already exists.
    pub async fn new(
        backend: Arc<dyn GraphBackend>,
        embedding_model: Arc<dyn EmbeddingModel>,
        config: GraphStoreConfig,
        setup_mode: SetupMode,
    ) -> Result<Self> {
        if config.node_table.trim().is_empty() || config.targets_table.trim().is_empty() {
            return Err(StoreError::Configuration(
                "node_table and targets_table must be non-empty".to_string(),
            ));
        }

        let probe = embedding_model.embed_query("").await?;
        let embedding_dim = probe.len();
        if embedding_dim == 0 {
            return Err(StoreError::Configuration(
                "embedding model returned a zero-length embedding".to_string(),
            ));
        }

        let store = Self {
            backend,
            embedding_model,
            adjacent_scorer: Arc::new(NoopAdjacentScorer),
            config,
            embedding_dim,
        };

        if setup_mode == SetupMode::Sync {
            let schema = SchemaSpec {
                node_table: store.config.node_table.clone(),
                targets_table: store.config.targets_table.clone(),
                embedding_dim,
            };
            info!(embedding_dim, "applying schema");
            store.backend.apply_schema(&schema).await?;
        }

        Ok(store)
    }

    /// Replace the default (no-op) `_get_adjacent` ranking hook.
    pub fn with_adjacent_scorer(mut self, scorer: Arc<dyn AdjacentScorer>) -> Self {
        self.adjacent_scorer = scorer;
        self
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    // ---- write path ---------------------------------------------------------------------

    /// Assign ids to any node lacking one, embed all texts in one batch call, and insert every
    /// passage plus its derived target rows inside one concurrent-query scope. Returns assigned
    /// ids in input order.
    pub async fn add_nodes(&self, nodes: Vec<Node>) -> Result<Vec<String>> {
        let ids: Vec<String> = nodes
            .iter()
            .map(|n| n.id.clone().unwrap_or_else(generate_node_id))
            .collect();
        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();

        debug!(count = nodes.len(), "embedding batch for add_nodes");
        let embeddings = self.embedding_model.embed_texts(&texts).await?;
        if embeddings.len() != nodes.len() {
            return Err(StoreError::Backend(format!(
                "embedding model returned {} vectors for {} texts",
                embeddings.len(),
                nodes.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != self.embedding_dim {
                return Err(StoreError::Shape {
                    expected: self.embedding_dim,
                    actual: embedding.len(),
                });
            }
        }

        let backend = self.backend.clone();
        let max_in_flight = self.config.max_in_flight;
        let ids_for_write = ids.clone();
        ConcurrentQueries::run(backend, max_in_flight, move |cq| async move {
            for ((id, node), embedding) in ids_for_write.iter().zip(nodes.iter()).zip(embeddings.iter()) {
                let mut link_to_tags = Vec::new();
                let mut link_from_tags = Vec::new();
                for link in &node.links {
                    if link.direction.emits_out() {
                        link_to_tags.push(link.tag_key());
                    }
                    if link.direction.accepts_in() {
                        link_from_tags.push(link.tag_key());
                    }
                }

                let metadata_blob = serialize_metadata(&node.metadata);
                let links_blob = serialize_links(&node.links);
                let params = QueryParams::insert_passage(
                    id.clone(),
                    node.text.clone(),
                    embedding.clone(),
                    link_to_tags,
                    metadata_blob,
                    links_blob,
                );
                cq.execute(Statement::InsertPassage, params, Consistency::Quorum, None)
                    .await;

                for (kind, tag) in link_from_tags {
                    let params =
                        QueryParams::insert_target(id.clone(), kind, tag, embedding.clone());
                    cq.execute(Statement::InsertTarget, params, Consistency::Quorum, None)
                        .await;
                }
            }
            Ok(())
        })
        .await?;

        info!(count = ids.len(), "add_nodes complete");
        Ok(ids)
    }

    // ---- read path: similarity_search ----------------------------------------------------

    /// Top-k rows by ANN distance to `query_embedding`, in rank order. A single non-fan-out
    /// backend call at `Consistency::One`; no concurrent-query scope is needed.
    pub async fn similarity_search(&self, query_embedding: Vec<f32>, k: usize) -> Result<Vec<StoredNode>> {
        let params = QueryParams::by_embedding(query_embedding, k);
        let rows = self
            .backend
            .execute(Statement::QueryByEmbedding, params, Consistency::One)
            .await?;
        rows.into_iter().map(row_to_node).collect()
    }

    // ---- read path: traversal_search -----------------------------------------------------

    /// Bounded-depth breadth-first traversal seeded by ANN similarity to `query_embedding`.
    pub async fn traversal_search(
        &self,
        query_embedding: Vec<f32>,
        k: usize,
        depth: usize,
    ) -> Result<Vec<StoredNode>> {
        let ctx = Arc::new(TraversalCtx {
            state: Mutex::new(TraversalState::default()),
            depth_limit: depth,
        });
        let ctx_for_run = ctx.clone();

        let backend = self.backend.clone();
        let max_in_flight = self.config.max_in_flight;
        ConcurrentQueries::run(backend, max_in_flight, move |cq| async move {
            let ctx = ctx_for_run;
            let seed_params = QueryParams::by_embedding(query_embedding, k);
            let seed_cq = cq.clone();
            let seed_ctx = ctx.clone();
            cq.execute(
                Statement::QueryIdsAndLinkToTagsByEmbedding,
                seed_params,
                Consistency::One,
                Some(Box::new(move |rows| visit_nodes(seed_ctx, seed_cq, 0, rows))),
            )
            .await;
            Ok(())
        })
        .await?;

        let ids = {
            let state = ctx.state.lock().expect("traversal state mutex poisoned");
            state.id_order.clone()
        };
        debug!(visited = ids.len(), "traversal_search visited ids");
        self.nodes_with_ids(ids).await
    }

    // ---- read path: mmr_traversal_search -------------------------------------------------

    /// Interleaves ANN seeding, MMR selection, and `_get_adjacent` graph expansion. Returns at
    /// most `self.config.k` distinct nodes, no duplicates.
    ///
    /// Known limitation: once a node is selected, this never re-expands it even if a later
    /// selection reveals a shorter path to it. There is no re-traversal from previously-selected
    /// nodes that become reachable more cheaply later.
    pub async fn mmr_traversal_search(&self, query_text: &str) -> Result<Vec<StoredNode>> {
        let cfg = &self.config;
        let query_embedding = self.embedding_model.embed_query(query_text).await?;
        let mut helper = MmrHelper::new(
            query_embedding.clone(),
            cfg.lambda_mult,
            cfg.k,
            cfg.score_threshold,
        );

        let seed_params = QueryParams::by_embedding(query_embedding.clone(), cfg.fetch_k);
        let rows = self
            .backend
            .execute(Statement::QueryIdsAndEmbeddingByEmbedding, seed_params, Consistency::One)
            .await?;

        let mut depths: HashMap<String, usize> = HashMap::new();
        let mut seed_candidates = Vec::new();
        for row in rows {
            if let (Some(id), Some(embedding)) = (row.content_id, row.text_embedding) {
                depths.insert(id.clone(), 0);
                seed_candidates.push((id, embedding));
            }
        }
        helper.add_candidates(seed_candidates);

        let visited_tags: Arc<Mutex<HashSet<(String, String)>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut selected_order = Vec::new();

        for _ in 0..cfg.k {
            let Some(selected_id) = helper.pop_best() else {
                break;
            };
            let current_depth = *depths.get(&selected_id).unwrap_or(&0);
            let next_depth = current_depth + 1;
            selected_order.push(selected_id.clone());

            if next_depth < cfg.depth {
                let adjacent = self
                    .get_adjacent(
                        vec![selected_id],
                        visited_tags.clone(),
                        query_embedding.clone(),
                        cfg.adjacent_k,
                    )
                    .await?;

                let mut new_candidates = Vec::with_capacity(adjacent.len());
                for (target_id, target_embedding) in adjacent {
                    let entry = depths.entry(target_id.clone()).or_insert(cfg.depth + 1);
                    if next_depth < *entry {
                        *entry = next_depth;
                    }
                    new_candidates.push((target_id, target_embedding));
                }
                helper.add_candidates(new_candidates);
            }
        }

        debug!(picked = selected_order.len(), "mmr_traversal_search complete");
        self.nodes_with_ids(selected_order).await
    }

    // ---- _get_adjacent --------------------------------------------------------------------

    /// Expand `source_ids`' outgoing tags into candidate `(target_id, target_embedding)` pairs,
    /// ANN-ranked per tag against `query_embedding`, deduped by first occurrence across tags.
    /// `visited_tags` is shared with the caller across repeated calls so a tag is only ever
    /// queried once per traversal.
    async fn get_adjacent(
        &self,
        source_ids: Vec<String>,
        visited_tags: Arc<Mutex<HashSet<(String, String)>>>,
        query_embedding: Vec<f32>,
        adjacent_k: usize,
    ) -> Result<Vec<(String, Vec<f32>)>> {
        let targets: Arc<Mutex<TargetAcc>> = Arc::new(Mutex::new(TargetAcc::default()));
        let targets_for_run = targets.clone();
        let adjacent_scorer = self.adjacent_scorer.clone();

        let backend = self.backend.clone();
        let max_in_flight = self.config.max_in_flight;
        ConcurrentQueries::run(backend, max_in_flight, move |cq| async move {
            for source_id in source_ids {
                let params = QueryParams::by_id(source_id);
                let cq2 = cq.clone();
                let visited_tags2 = visited_tags.clone();
                let query_embedding2 = query_embedding.clone();
                let targets2 = targets_for_run.clone();
                let scorer2 = adjacent_scorer.clone();
                cq.execute(
                    Statement::QuerySourceTagsById,
                    params,
                    Consistency::Quorum,
                    Some(Box::new(move |rows| {
                        add_sources(cq2, visited_tags2, query_embedding2, adjacent_k, targets2, scorer2, rows)
                    })),
                )
                .await;
            }
            Ok(())
        })
        .await?;

        let acc = Arc::try_unwrap(targets)
            .unwrap_or_else(|arc| Mutex::new(arc.lock().expect("targets mutex poisoned").clone()))
            .into_inner()
            .expect("targets mutex poisoned");
        Ok(acc
            .order
            .into_iter()
            .map(|id| {
                let embedding = acc.map.get(&id).cloned().unwrap_or_default();
                (id, embedding)
            })
            .collect())
    }

    // ---- _nodes_with_ids ------------------------------------------------------------------

    /// Fetch each unique id once via primary-key lookup, hydrate into [`StoredNode`]s, and return
    /// them in `ids`' order (duplicates preserved). Any id with no backing row is an
    /// [`StoreError::Integrity`] error.
    pub async fn nodes_with_ids(&self, ids: Vec<String>) -> Result<Vec<StoredNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut unique_ids = Vec::new();
        let mut seen = HashSet::new();
        for id in &ids {
            if seen.insert(id.clone()) {
                unique_ids.push(id.clone());
            }
        }

        let results: Arc<Mutex<HashMap<String, StoredNode>>> = Arc::new(Mutex::new(HashMap::new()));
        let results_for_run = results.clone();

        let backend = self.backend.clone();
        let max_in_flight = self.config.max_in_flight;
        ConcurrentQueries::run(backend, max_in_flight, move |cq| async move {
            for id in unique_ids {
                let params = QueryParams::by_id(id);
                let results2 = results_for_run.clone();
                cq.execute(
                    Statement::QueryById,
                    params,
                    Consistency::Quorum,
                    Some(Box::new(move |rows| hydrate_node(results2, rows))),
                )
                .await;
            }
            Ok(())
        })
        .await?;

        let results = Arc::try_unwrap(results)
            .unwrap_or_else(|arc| Mutex::new(arc.lock().expect("results mutex poisoned").clone()))
            .into_inner()
            .expect("results mutex poisoned");

        ids.into_iter()
            .map(|id| {
                results
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::Integrity(id.clone()))
            })
            .collect()
    }
}

fn row_to_node(row: Row) -> Result<StoredNode> {
    let id = row
        .content_id
        .ok_or_else(|| StoreError::Backend("row missing content_id".to_string()))?;
    let text = row.text_content.unwrap_or_default();
    let metadata = match row.metadata_blob {
        Some(blob) => deserialize_metadata(&blob)?,
        None => Map::new(),
    };
    let links = match row.links_blob {
        Some(blob) => deserialize_links(&blob)?,
        None => HashSet::new(),
    };
    Ok(StoredNode {
        id,
        text,
        metadata,
        links,
    })
}

fn hydrate_node(results: Arc<Mutex<HashMap<String, StoredNode>>>, rows: Vec<Row>) -> BoxFuture {
    Box::pin(async move {
        if let Some(row) = rows.into_iter().next() {
            let node = row_to_node(row)?;
            results
                .lock()
                .expect("results mutex poisoned")
                .insert(node.id.clone(), node);
        }
        Ok(())
    })
}

#[derive(Default)]
struct TraversalState {
    visited_ids: HashMap<String, usize>,
    id_order: Vec<String>,
    visited_tags: HashMap<(String, String), usize>,
}

struct TraversalCtx {
    state: Mutex<TraversalState>,
    depth_limit: usize,
}

fn visit_nodes(ctx: Arc<TraversalCtx>, cq: ConcurrentQueries, d: usize, rows: Vec<Row>) -> BoxFuture {
    Box::pin(async move {
        let depth_limit = ctx.depth_limit;
        let mut outgoing_tags: Vec<(String, String)> = Vec::new();

        {
            let mut state = ctx.state.lock().expect("traversal state mutex poisoned");
            for row in &rows {
                let id = match &row.content_id {
                    Some(id) => id.clone(),
                    None => continue,
                };
                let existing = *state.visited_ids.get(&id).unwrap_or(&depth_limit);
                if d <= existing {
                    if !state.visited_ids.contains_key(&id) {
                        state.id_order.push(id.clone());
                    }
                    state.visited_ids.insert(id.clone(), d);
                }

                if d < depth_limit {
                    if let Some(tags) = &row.link_to_tags {
                        for tag_key in tags {
                            let existing_tag_depth =
                                *state.visited_tags.get(tag_key).unwrap_or(&depth_limit);
                            if d <= existing_tag_depth {
                                state.visited_tags.insert(tag_key.clone(), d);
                                outgoing_tags.push(tag_key.clone());
                            }
                        }
                    }
                }
            }
        }

        for (kind, tag) in outgoing_tags {
            let params = QueryParams::by_kind_and_tag(kind, tag);
            let ctx2 = ctx.clone();
            let cq2 = cq.clone();
            cq.execute(
                Statement::QueryTargetsByKindAndTag,
                params,
                Consistency::Quorum,
                Some(Box::new(move |rows| visit_targets(ctx2, cq2, d, rows))),
            )
            .await;
        }
        Ok(())
    })
}

fn visit_targets(ctx: Arc<TraversalCtx>, cq: ConcurrentQueries, d: usize, rows: Vec<Row>) -> BoxFuture {
    Box::pin(async move {
        let depth_limit = ctx.depth_limit;
        let mut target_ids = Vec::new();

        {
            let state = ctx.state.lock().expect("traversal state mutex poisoned");
            for row in &rows {
                if let Some(id) = &row.target_content_id {
                    let existing = *state.visited_ids.get(id).unwrap_or(&depth_limit);
                    if d < existing {
                        target_ids.push(id.clone());
                    }
                }
            }
        }

        for id in target_ids {
            let params = QueryParams::by_id(id);
            let ctx2 = ctx.clone();
            let cq2 = cq.clone();
            cq.execute(
                Statement::QueryIdsAndLinkToTagsById,
                params,
                Consistency::Quorum,
                Some(Box::new(move |rows| visit_nodes(ctx2, cq2, d + 1, rows))),
            )
            .await;
        }
        Ok(())
    })
}

#[derive(Default, Clone)]
struct TargetAcc {
    order: Vec<String>,
    map: HashMap<String, Vec<f32>>,
}

#[allow(clippy::too_many_arguments)]
fn add_sources(
    cq: ConcurrentQueries,
    visited_tags: Arc<Mutex<HashSet<(String, String)>>>,
    query_embedding: Vec<f32>,
    adjacent_k: usize,
    targets: Arc<Mutex<TargetAcc>>,
    adjacent_scorer: Arc<dyn AdjacentScorer>,
    rows: Vec<Row>,
) -> BoxFuture {
    Box::pin(async move {
        let mut new_tags = Vec::new();
        for row in &rows {
            let Some(tags) = &row.link_to_tags else {
                continue;
            };
            let ranked = adjacent_scorer.rank_tags(tags.clone());
            let mut guard = visited_tags.lock().expect("visited_tags mutex poisoned");
            for tag_key in ranked {
                if guard.insert(tag_key.clone()) {
                    new_tags.push(tag_key);
                }
            }
        }

        for (kind, tag) in new_tags {
            let params =
                QueryParams::by_kind_tag_and_embedding(kind, tag, query_embedding.clone(), adjacent_k);
            let targets2 = targets.clone();
            cq.execute(
                Statement::QueryTargetsEmbeddingsByKindTagEmbedding,
                params,
                Consistency::One,
                Some(Box::new(move |rows| add_targets(targets2, rows))),
            )
            .await;
        }
        Ok(())
    })
}

fn add_targets(targets: Arc<Mutex<TargetAcc>>, rows: Vec<Row>) -> BoxFuture {
    Box::pin(async move {
        let mut guard = targets.lock().expect("targets mutex poisoned");
        for row in rows {
            if let (Some(id), Some(embedding)) = (row.target_content_id, row.target_text_embedding) {
                if !guard.map.contains_key(&id) {
                    guard.order.push(id.clone());
                    guard.map.insert(id, embedding);
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Link;
    use crate::testutil::{InMemoryBackend, StubEmbeddingModel};

    async fn store_with(dim: usize) -> (GraphStore, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let model = Arc::new(StubEmbeddingModel::new(dim));
        let store = GraphStore::new(
            backend.clone(),
            model,
            GraphStoreConfig::default(),
            SetupMode::Sync,
        )
        .await
        .unwrap();
        (store, backend)
    }

    #[tokio::test]
    async fn similarity_search_finds_the_matching_node() {
        let (store, _backend) = store_with(3).await;
        let ids = store
            .add_nodes(vec![
                Node::new("alpha"),
                Node::new("beta"),
                Node::new("gamma"),
            ])
            .await
            .unwrap();

        let model = StubEmbeddingModel::new(3);
        let query = model.deterministic_embedding("alpha");
        let hits = store.similarity_search(query, 1).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[0]);
        assert_eq!(hits[0].text, "alpha");
    }

    #[tokio::test]
    async fn traversal_depth_one_reaches_the_linked_node() {
        let (store, _backend) = store_with(3).await;
        let node_a = Node::new("A").add_link(Link::outgoing("hyperlink", "T"));
        let node_b = Node::new("B").add_link(Link::incoming("hyperlink", "T"));
        let ids = store.add_nodes(vec![node_a, node_b]).await.unwrap();

        let model = StubEmbeddingModel::new(3);
        let query = model.deterministic_embedding("A");
        let hits = store.traversal_search(query, 1, 1).await.unwrap();

        let hit_ids: HashSet<_> = hits.iter().map(|n| n.id.clone()).collect();
        assert_eq!(hit_ids, ids.into_iter().collect());
    }

    #[tokio::test]
    async fn traversal_depth_zero_returns_only_the_seed() {
        let (store, _backend) = store_with(3).await;
        let node_a = Node::new("A").add_link(Link::outgoing("hyperlink", "T"));
        let node_b = Node::new("B").add_link(Link::incoming("hyperlink", "T"));
        let ids = store.add_nodes(vec![node_a, node_b]).await.unwrap();

        let model = StubEmbeddingModel::new(3);
        let query = model.deterministic_embedding("A");
        let hits = store.traversal_search(query, 1, 0).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[0]);
    }

    #[tokio::test]
    async fn mmr_traversal_returns_distinct_ids_within_budget() {
        let (store, _backend) = store_with(3).await;
        store
            .add_nodes(vec![
                Node::new("alpha"),
                Node::new("beta"),
                Node::new("gamma"),
                Node::new("delta"),
            ])
            .await
            .unwrap();

        let hits = store.mmr_traversal_search("alpha").await.unwrap();
        let mut ids = hits.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        let before_dedup = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before_dedup);
        assert!(hits.len() <= GraphStoreConfig::default().k);
    }

    #[tokio::test]
    async fn nodes_with_ids_reports_missing_ids() {
        let (store, _backend) = store_with(3).await;
        let err = store
            .nodes_with_ids(vec!["does-not-exist".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn round_trips_metadata_and_links_through_similarity_search() {
        let (store, _backend) = store_with(3).await;
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), serde_json::json!("unit-test"));
        let node = Node::new("alpha")
            .with_metadata(metadata.clone())
            .add_link(Link::outgoing("hyperlink", "T"));
        store.add_nodes(vec![node]).await.unwrap();

        let model = StubEmbeddingModel::new(3);
        let query = model.deterministic_embedding("alpha");
        let hits = store.similarity_search(query, 1).await.unwrap();

        assert_eq!(hits[0].metadata, metadata);
        assert_eq!(hits[0].links.len(), 1);
    }

    #[tokio::test]
    async fn add_nodes_rejects_mismatched_embedding_dimension() {
        use async_trait::async_trait;

        struct InconsistentModel;

        #[async_trait]
        impl EmbeddingModel for InconsistentModel {
            async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
                // Probed once at construction, so this fixes embedding_dim() at 3.
                Ok(vec![1.0, 0.0, 0.0])
            }

            async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0, 0.0]).collect())
            }
        }

        let backend = Arc::new(InMemoryBackend::new());
        let store = GraphStore::new(
            backend,
            Arc::new(InconsistentModel),
            GraphStoreConfig::default(),
            SetupMode::Sync,
        )
        .await
        .unwrap();
        assert_eq!(store.embedding_dim(), 3);

        let err = store.add_nodes(vec![Node::new("oops")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Shape { expected: 3, actual: 5 }));
    }
}
