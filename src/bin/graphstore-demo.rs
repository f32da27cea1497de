//! Hybrid graph store demo binary.
//!
//! Wires a mock backend and mock embedding model, then exercises the engine end to end:
//! `add_nodes` followed by all three read paths against the in-memory mock backend, so the crate
//! is runnable without a live database.

use std::collections::HashSet;
use std::sync::Arc;

use hybrid_graph_store::link::Link;
use hybrid_graph_store::node::Node;
use hybrid_graph_store::store::{GraphStore, GraphStoreConfig, SetupMode};
use hybrid_graph_store::testutil::{InMemoryBackend, StubEmbeddingModel};

const EMBEDDING_DIM: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    println!("hybrid-graph-store demo");
    println!("  version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("mode: in-memory mock backend + deterministic stub embedding model");
    let backend = Arc::new(InMemoryBackend::new());
    let embedding_model = Arc::new(StubEmbeddingModel::new(EMBEDDING_DIM));

    let store = GraphStore::new(
        backend.clone(),
        embedding_model,
        GraphStoreConfig::default(),
        SetupMode::Sync,
    )
    .await?;
    println!("store initialized, embedding_dim = {}", store.embedding_dim());
    println!();

    let nodes = vec![
        Node::new("the quick brown fox jumps over the lazy dog")
            .add_link(Link::outgoing("hyperlink", "animal-facts")),
        Node::new("foxes are members of the canidae family")
            .add_link(Link::incoming("hyperlink", "animal-facts")),
        Node::new("the stock market closed higher today")
            .add_link(Link::bidir("hyperlink", "finance")),
        Node::new("interest rates affect equity valuations")
            .add_link(Link::bidir("hyperlink", "finance")),
    ];
    let ids = store.add_nodes(nodes).await?;
    println!("wrote {} nodes: {:?}", ids.len(), ids);
    println!();

    let model = StubEmbeddingModel::new(EMBEDDING_DIM);
    let query_embedding = model.deterministic_embedding("fox");

    let hits = store.similarity_search(query_embedding.clone(), 2).await?;
    println!("similarity_search(\"fox\", k=2):");
    for hit in &hits {
        println!("  {} -> {:?}", hit.id, hit.text);
    }
    println!();

    let hits = store.traversal_search(query_embedding, 1, 1).await?;
    let seen: HashSet<_> = hits.iter().map(|n| n.id.clone()).collect();
    println!("traversal_search(\"fox\", k=1, depth=1): {} node(s) reached", seen.len());
    for hit in &hits {
        println!("  {} -> {:?}", hit.id, hit.text);
    }
    println!();

    let hits = store.mmr_traversal_search("fox").await?;
    println!("mmr_traversal_search(\"fox\"): {} node(s) selected", hits.len());
    for hit in &hits {
        println!("  {} -> {:?}", hit.id, hit.text);
    }

    Ok(())
}
