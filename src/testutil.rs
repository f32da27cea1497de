//! In-memory stand-ins for [`GraphBackend`] and [`EmbeddingModel`], used by this crate's own tests
//! and by [`crate::bin::graphstore_demo`] (via `src/bin/graphstore-demo.rs`).
//!
//! A small, fully deterministic substitute for the real collaborator, good enough to exercise the
//! engine's own logic without a live database or model server.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{
    Consistency, EmbeddingModel, GraphBackend, QueryParams, Row, SchemaSpec, Statement,
};
use crate::error::StoreError;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn rank_ids(query: &[f32], candidates: &[(String, Vec<f32>)], limit: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &String)> = candidates
        .iter()
        .map(|(id, embedding)| (cosine(query, embedding), id))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored.into_iter().take(limit).map(|(_, id)| id.clone()).collect()
}

#[derive(Clone)]
struct PassageRecord {
    text: String,
    embedding: Vec<f32>,
    link_to_tags: Vec<(String, String)>,
    metadata_blob: String,
    links_blob: String,
}

/// A single-process, non-persistent [`GraphBackend`] backed by `HashMap`s, with ANN "ordering"
/// realized as an exact cosine-similarity sort -- correct, not approximate, because the candidate
/// sets in tests are small enough that the distinction doesn't matter.
#[derive(Default)]
pub struct InMemoryBackend {
    passages: Mutex<HashMap<String, PassageRecord>>,
    targets: Mutex<HashMap<(String, String), Vec<(String, Vec<f32>)>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passage_count(&self) -> usize {
        self.passages.lock().expect("passages mutex poisoned").len()
    }
}

#[async_trait]
impl GraphBackend for InMemoryBackend {
    async fn apply_schema(&self, _schema: &SchemaSpec) -> Result<(), StoreError> {
        Ok(())
    }

    async fn execute(
        &self,
        statement: Statement,
        params: QueryParams,
        _consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError> {
        match statement {
            Statement::InsertPassage => {
                let id = params
                    .id
                    .ok_or_else(|| StoreError::Backend("InsertPassage missing id".to_string()))?;
                let record = PassageRecord {
                    text: params.text.unwrap_or_default(),
                    embedding: params.embedding.unwrap_or_default(),
                    link_to_tags: params.link_to_tags.unwrap_or_default(),
                    metadata_blob: params.metadata_blob.unwrap_or_default(),
                    links_blob: params.links_blob.unwrap_or_default(),
                };
                self.passages
                    .lock()
                    .expect("passages mutex poisoned")
                    .insert(id, record);
                Ok(Vec::new())
            }

            Statement::InsertTarget => {
                let id = params
                    .id
                    .ok_or_else(|| StoreError::Backend("InsertTarget missing id".to_string()))?;
                let kind = params
                    .kind
                    .ok_or_else(|| StoreError::Backend("InsertTarget missing kind".to_string()))?;
                let tag = params
                    .tag
                    .ok_or_else(|| StoreError::Backend("InsertTarget missing tag".to_string()))?;
                let embedding = params.embedding.unwrap_or_default();
                let mut targets = self.targets.lock().expect("targets mutex poisoned");
                let bucket = targets.entry((kind, tag)).or_default();
                match bucket.iter_mut().find(|(existing_id, _)| existing_id == &id) {
                    Some(entry) => entry.1 = embedding,
                    None => bucket.push((id, embedding)),
                }
                Ok(Vec::new())
            }

            Statement::QueryById | Statement::QueryIdsAndLinkToTagsById | Statement::QuerySourceTagsById => {
                let id = params
                    .id
                    .ok_or_else(|| StoreError::Backend("query by id missing id".to_string()))?;
                let passages = self.passages.lock().expect("passages mutex poisoned");
                let Some(record) = passages.get(&id) else {
                    return Ok(Vec::new());
                };
                let row = if matches!(statement, Statement::QueryById) {
                    Row {
                        content_id: Some(id),
                        text_content: Some(record.text.clone()),
                        text_embedding: Some(record.embedding.clone()),
                        link_to_tags: Some(record.link_to_tags.clone()),
                        metadata_blob: Some(record.metadata_blob.clone()),
                        links_blob: Some(record.links_blob.clone()),
                        ..Default::default()
                    }
                } else {
                    Row {
                        content_id: Some(id),
                        link_to_tags: Some(record.link_to_tags.clone()),
                        ..Default::default()
                    }
                };
                Ok(vec![row])
            }

            Statement::QueryByEmbedding
            | Statement::QueryIdsAndLinkToTagsByEmbedding
            | Statement::QueryIdsAndEmbeddingByEmbedding => {
                let query = params
                    .embedding
                    .ok_or_else(|| StoreError::Backend("ANN query missing embedding".to_string()))?;
                let limit = params.limit.unwrap_or(usize::MAX);
                let passages = self.passages.lock().expect("passages mutex poisoned");
                let candidates: Vec<(String, Vec<f32>)> = passages
                    .iter()
                    .map(|(id, rec)| (id.clone(), rec.embedding.clone()))
                    .collect();
                let ranked = rank_ids(&query, &candidates, limit);

                let rows = ranked
                    .into_iter()
                    .map(|id| {
                        let record = &passages[&id];
                        match statement {
                            Statement::QueryByEmbedding => Row {
                                content_id: Some(id),
                                text_content: Some(record.text.clone()),
                                text_embedding: Some(record.embedding.clone()),
                                link_to_tags: Some(record.link_to_tags.clone()),
                                metadata_blob: Some(record.metadata_blob.clone()),
                                links_blob: Some(record.links_blob.clone()),
                                ..Default::default()
                            },
                            Statement::QueryIdsAndLinkToTagsByEmbedding => Row {
                                content_id: Some(id),
                                link_to_tags: Some(record.link_to_tags.clone()),
                                ..Default::default()
                            },
                            Statement::QueryIdsAndEmbeddingByEmbedding => Row {
                                content_id: Some(id),
                                text_embedding: Some(record.embedding.clone()),
                                ..Default::default()
                            },
                            _ => unreachable!(),
                        }
                    })
                    .collect();
                Ok(rows)
            }

            Statement::QueryTargetsByKindAndTag => {
                let kind = params
                    .kind
                    .ok_or_else(|| StoreError::Backend("QueryTargetsByKindAndTag missing kind".to_string()))?;
                let tag = params
                    .tag
                    .ok_or_else(|| StoreError::Backend("QueryTargetsByKindAndTag missing tag".to_string()))?;
                let targets = self.targets.lock().expect("targets mutex poisoned");
                let rows = targets
                    .get(&(kind, tag))
                    .map(|bucket| {
                        bucket
                            .iter()
                            .map(|(id, _)| Row {
                                target_content_id: Some(id.clone()),
                                ..Default::default()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(rows)
            }

            Statement::QueryTargetsEmbeddingsByKindTagEmbedding => {
                let kind = params.kind.ok_or_else(|| {
                    StoreError::Backend("QueryTargetsEmbeddingsByKindTagEmbedding missing kind".to_string())
                })?;
                let tag = params.tag.ok_or_else(|| {
                    StoreError::Backend("QueryTargetsEmbeddingsByKindTagEmbedding missing tag".to_string())
                })?;
                let query = params.embedding.ok_or_else(|| {
                    StoreError::Backend("QueryTargetsEmbeddingsByKindTagEmbedding missing embedding".to_string())
                })?;
                let limit = params.limit.unwrap_or(usize::MAX);
                let targets = self.targets.lock().expect("targets mutex poisoned");
                let Some(bucket) = targets.get(&(kind, tag)) else {
                    return Ok(Vec::new());
                };
                let ranked = rank_ids(&query, bucket, limit);
                let rows = ranked
                    .into_iter()
                    .map(|id| {
                        let (_, embedding) = bucket.iter().find(|(candidate, _)| candidate == &id).unwrap();
                        Row {
                            target_content_id: Some(id),
                            target_text_embedding: Some(embedding.clone()),
                            ..Default::default()
                        }
                    })
                    .collect();
                Ok(rows)
            }
        }
    }
}

/// A deterministic, hash-based [`EmbeddingModel`] -- no two distinct texts are guaranteed
/// orthogonal, but repeated calls with the same text always return the same vector, which is all
/// the tests and the demo binary need.
pub struct StubEmbeddingModel {
    dim: usize,
}

impl StubEmbeddingModel {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dim] += byte as f32 + 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingModel for StubEmbeddingModel {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts.iter().map(|t| self.deterministic_embedding(t)).collect())
    }
}
