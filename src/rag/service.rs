//! Retrieval service: owns the vector store and chunk registry, builds them
//! from documents and answers top-k queries against them.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;

use super::chunker::Chunker;
use super::embedding::{embedder_from_config, Embedder, Embedding};
use super::registry::ChunkRegistry;
use super::snapshot::{self, SnapshotMeta};
use super::tokenizer::tokenizer_from_config;
use super::types::{Chunk, ChunkRecord, Document, RetrievedChunk};
use super::vector_store::VectorStore;
use crate::core::config::RagConfig;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Uninitialized,
    Building,
    Ready,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceState::Uninitialized => "UNINITIALIZED",
            ServiceState::Building => "BUILDING",
            ServiceState::Ready => "READY",
            ServiceState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Documents chunked and embedded concurrently during a build
    pub workers: usize,
    pub skip_empty_documents: bool,
    /// Hits scoring below this are dropped after hydration
    pub min_score: Option<f32>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            skip_empty_documents: true,
            min_score: None,
        }
    }
}

impl From<&RagConfig> for ServiceSettings {
    fn from(config: &RagConfig) -> Self {
        Self {
            workers: config.ingest.workers,
            skip_empty_documents: config.ingest.skip_empty_documents,
            min_score: config.retrieval.min_score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub chunks_added: usize,
    pub embeddings_added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Ok,
    /// Nothing has been indexed yet
    NoIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    pub chunks: Vec<RetrievedChunk>,
}

impl QueryResponse {
    fn ok(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            status: QueryStatus::Ok,
            chunks,
        }
    }

    fn no_index() -> Self {
        Self {
            status: QueryStatus::NoIndex,
            chunks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub state: ServiceState,
    pub rows: usize,
    pub dimension: Option<usize>,
    pub max_tokens: Option<usize>,
    pub embedding_provider: String,
}

#[derive(Debug, Default)]
struct Index {
    store: VectorStore,
    registry: ChunkRegistry,
    max_tokens: Option<usize>,
}

impl Index {
    /// Commits one document's rows, or nothing if any row would be rejected.
    fn commit(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Embedding>) -> Result<usize, RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::Embedding(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let base = self.store.size();
        let expected = self
            .store
            .dimension()
            .or_else(|| embeddings.first().map(Embedding::dimension));
        for (offset, (chunk, embedding)) in chunks.iter().zip(&embeddings).enumerate() {
            self.store.check_dimension(embedding.dimension())?;
            if let Some(expected) = expected {
                if embedding.dimension() != expected {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: embedding.dimension(),
                    });
                }
            }
            self.registry.check_insertable(base + offset, &chunk.chunk_id)?;
        }

        let added = chunks.len();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let row = self.store.add(embedding.as_slice())?;
            self.registry.put(row, ChunkRecord::from(chunk))?;
        }
        Ok(added)
    }
}

enum Prepared {
    Embedded {
        chunks: Vec<Chunk>,
        embeddings: Vec<Embedding>,
    },
    Skipped,
}

/// Holds the service in `Building`. If dropped before `settle`, for example
/// when the caller's future is cancelled, the fallback state is restored.
struct BuildingGuard<'a> {
    service: &'a RetrievalService,
    fallback: ServiceState,
    armed: bool,
}

impl BuildingGuard<'_> {
    fn settle(mut self, state: ServiceState) {
        self.armed = false;
        self.service.set_state(state);
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(state = %self.fallback, "Index operation cancelled before completion");
            self.service.set_state(self.fallback);
        }
    }
}

pub struct RetrievalService {
    chunker: Chunker,
    embedder: Embedder,
    settings: ServiceSettings,
    state: Mutex<ServiceState>,
    index: RwLock<Index>,
}

impl RetrievalService {
    pub fn new(chunker: Chunker, embedder: Embedder, settings: ServiceSettings) -> Self {
        Self {
            chunker,
            embedder,
            settings,
            state: Mutex::new(ServiceState::Uninitialized),
            index: RwLock::new(Index::default()),
        }
    }

    /// Wires tokenizer, embedding provider and settings from configuration.
    pub fn from_config(config: &RagConfig) -> Result<Self, RagError> {
        let tokenizer = tokenizer_from_config(&config.tokenizer)?;
        let embedder = embedder_from_config(&config.embedding)?;
        Ok(Self::new(
            Chunker::new(tokenizer),
            embedder,
            ServiceSettings::from(config),
        ))
    }

    pub fn state(&self) -> ServiceState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ServiceState) {
        *self.lock_state() = state;
    }

    /// Moves to `Building`, or fails with `IndexBusy` if a build is already running.
    /// The guard falls back to the replaced state until told otherwise.
    fn enter_building(&self) -> Result<BuildingGuard<'_>, RagError> {
        let mut state = self.lock_state();
        if *state == ServiceState::Building {
            return Err(RagError::IndexBusy);
        }
        let previous = std::mem::replace(&mut *state, ServiceState::Building);
        Ok(BuildingGuard {
            service: self,
            fallback: previous,
            armed: true,
        })
    }

    /// Rebuilds the index from `documents`, replacing whatever was indexed before.
    ///
    /// Documents are chunked and embedded up to `workers` at a time, but rows
    /// are committed in input order on this task. A failing document aborts
    /// the build without writing any of its rows; earlier documents stay
    /// committed and queryable.
    pub async fn build(
        &self,
        documents: &[Document],
        max_tokens: usize,
    ) -> Result<BuildReport, RagError> {
        let mut guard = self.enter_building()?;
        let mut index = self.index.write().await;
        *index = Index {
            max_tokens: Some(max_tokens),
            ..Index::default()
        };
        guard.fallback = ServiceState::Failed;

        tracing::info!(
            documents = documents.len(),
            max_tokens,
            workers = self.settings.workers,
            provider = self.embedder.provider_name(),
            "Building retrieval index"
        );

        if documents.is_empty() {
            guard.settle(ServiceState::Failed);
            tracing::error!("Index build failed: no documents");
            return Err(RagError::EmptyInput {
                context: "no documents to index".to_string(),
            });
        }

        let mut report = BuildReport::default();
        let pending: Vec<_> = documents
            .iter()
            .map(|document| self.prepare(document, max_tokens))
            .collect();
        let mut prepared =
            std::pin::pin!(stream::iter(pending).buffered(self.settings.workers.max(1)));

        let mut position = 0;
        while let Some(result) = prepared.next().await {
            let document = &documents[position];
            position += 1;

            let outcome = result.and_then(|item| match item {
                Prepared::Skipped => Ok(None),
                Prepared::Embedded { chunks, embeddings } => {
                    index.commit(chunks, embeddings).map(Some)
                }
            });

            match outcome {
                Ok(Some(added)) => {
                    report.documents_indexed += 1;
                    report.chunks_added += added;
                    report.embeddings_added += added;
                    guard.fallback = ServiceState::Ready;
                    tracing::debug!(document = %document.id, chunks = added, "Document indexed");
                }
                Ok(None) => {
                    report.documents_skipped += 1;
                }
                Err(err) => {
                    let rows = index.store.size();
                    let state = if rows > 0 {
                        ServiceState::Ready
                    } else {
                        ServiceState::Failed
                    };
                    guard.settle(state);
                    tracing::error!(
                        document = %document.id,
                        error = %err,
                        committed_rows = rows,
                        state = %state,
                        "Index build aborted"
                    );
                    return Err(err.in_document(document.id.clone()));
                }
            }
        }

        if index.store.is_empty() {
            guard.settle(ServiceState::Failed);
            tracing::error!(
                skipped = report.documents_skipped,
                "Index build failed: documents produced no chunks"
            );
            return Err(RagError::EmptyInput {
                context: "documents produced no chunks".to_string(),
            });
        }

        guard.settle(ServiceState::Ready);
        tracing::info!(
            documents = report.documents_indexed,
            skipped = report.documents_skipped,
            rows = index.store.size(),
            dimension = ?index.store.dimension(),
            "Retrieval index ready"
        );
        Ok(report)
    }

    async fn prepare(&self, document: &Document, max_tokens: usize) -> Result<Prepared, RagError> {
        let chunks = match self.chunker.chunk(document, max_tokens) {
            Ok(chunks) => chunks,
            Err(RagError::EmptyInput { context }) if self.settings.skip_empty_documents => {
                tracing::warn!(document = %document.id, reason = %context, "Skipping empty document");
                return Ok(Prepared::Skipped);
            }
            Err(err) => return Err(err),
        };

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        Ok(Prepared::Embedded { chunks, embeddings })
    }

    /// Top-k chunks for `text`, best first.
    ///
    /// Rows the registry cannot resolve are skipped with a warning. Before
    /// anything is built or loaded the answer is empty with `NoIndex` status.
    /// Fails with `IndexBusy` while a build holds the index and `NotReady`
    /// after a failed build.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<QueryResponse, RagError> {
        let state = self.state();
        match state {
            ServiceState::Ready | ServiceState::Uninitialized => {}
            ServiceState::Building => return Err(RagError::IndexBusy),
            ServiceState::Failed => return Err(RagError::NotReady { state }),
        }

        if text.trim().is_empty() {
            return Err(RagError::EmptyInput {
                context: "query text is blank".to_string(),
            });
        }
        if state == ServiceState::Uninitialized {
            return Ok(QueryResponse::no_index());
        }

        let index = self.index.try_read().map_err(|_| RagError::IndexBusy)?;
        if index.store.is_empty() {
            return Ok(QueryResponse::no_index());
        }
        if top_k == 0 {
            return Ok(QueryResponse::ok(Vec::new()));
        }

        let query = self.embedder.embed(text).await?;
        let hits = index.store.search(query.as_slice(), top_k)?;

        let mut chunks = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(min_score) = self.settings.min_score {
                if hit.score < min_score {
                    continue;
                }
            }
            match index.registry.get(hit.row) {
                Ok(record) => chunks.push(RetrievedChunk {
                    chunk_id: record.chunk_id.clone(),
                    text: record.text.clone(),
                    score: hit.score,
                }),
                Err(err) => {
                    tracing::warn!(row = hit.row, error = %err, "Skipping search hit missing from chunk registry");
                }
            }
        }

        tracing::debug!(top_k, returned = chunks.len(), "Query answered");
        Ok(QueryResponse::ok(chunks))
    }

    pub async fn stats(&self) -> ServiceStats {
        let state = self.state();
        let index = self.index.read().await;
        ServiceStats {
            state,
            rows: index.store.size(),
            dimension: index.store.dimension(),
            max_tokens: index.max_tokens,
            embedding_provider: self.embedder.provider_name().to_string(),
        }
    }

    pub async fn save_snapshot(&self, dir: &Path) -> Result<snapshot::Manifest, RagError> {
        match self.state() {
            ServiceState::Ready => {}
            ServiceState::Building => return Err(RagError::IndexBusy),
            state => return Err(RagError::NotReady { state }),
        }

        let index = self.index.try_read().map_err(|_| RagError::IndexBusy)?;
        let meta = SnapshotMeta {
            max_tokens: index.max_tokens.unwrap_or_default(),
            embedding_provider: self.embedder.provider_name().to_string(),
        };
        snapshot::save(dir, &index.store, &index.registry, &meta).await
    }

    /// Replaces the index with a snapshot from `dir`. On failure the service
    /// keeps its previous index and state.
    pub async fn load_snapshot(&self, dir: &Path) -> Result<snapshot::Manifest, RagError> {
        let guard = self.enter_building()?;

        let loaded = match snapshot::load(dir).await {
            Ok(loaded) => loaded,
            Err(err) => {
                let previous = guard.fallback;
                guard.settle(previous);
                tracing::warn!(dir = %dir.display(), error = %err, "Index snapshot rejected");
                return Err(err);
            }
        };

        if loaded.manifest.embedding_provider != self.embedder.provider_name() {
            tracing::warn!(
                snapshot = %loaded.manifest.embedding_provider,
                current = self.embedder.provider_name(),
                "Snapshot was built with a different embedding provider"
            );
        }

        let mut index = self.index.write().await;
        *index = Index {
            store: loaded.store,
            registry: loaded.registry,
            max_tokens: Some(loaded.manifest.max_tokens),
        };
        guard.settle(ServiceState::Ready);
        Ok(loaded.manifest)
    }

    #[cfg(test)]
    pub(crate) async fn row_norms(&self) -> Vec<f32> {
        let index = self.index.read().await;
        (0..index.store.size())
            .filter_map(|row| index.store.row(row))
            .map(|v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn forget_row(&self, row: usize) -> Option<ChunkRecord> {
        self.index.write().await.registry.remove(row)
    }
}
