//! On-disk index snapshot: vector matrix, chunk registry and a manifest tying
//! the two together.
//!
//! ```text
//! <dir>/vectors.bin    DRAGVEC1 header + row-major f32 matrix
//! <dir>/registry.db    SQLite chunk registry keyed by row_index
//! <dir>/manifest.json  dimension, row count, checksum, build metadata
//! ```

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::registry::ChunkRegistry;
use super::sqlite;
use super::vector_store::VectorStore;
use crate::core::errors::RagError;

pub const FORMAT_VERSION: u32 = 1;

const VECTORS_FILE: &str = "vectors.bin";
const REGISTRY_FILE: &str = "registry.db";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub dimension: Option<usize>,
    pub row_count: usize,
    pub max_tokens: usize,
    pub embedding_provider: String,
    pub built_at: DateTime<Utc>,
    /// Hex SHA-256 of `vectors.bin`
    pub vectors_sha256: String,
}

/// A loaded snapshot, already checked for internal consistency.
#[derive(Debug)]
pub struct Snapshot {
    pub manifest: Manifest,
    pub store: VectorStore,
    pub registry: ChunkRegistry,
}

/// Build metadata recorded alongside the index.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub max_tokens: usize,
    pub embedding_provider: String,
}

pub fn exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Persists `store` and `registry` under `dir`. The manifest is written last,
/// so a snapshot without one is never picked up by `load`.
pub async fn save(
    dir: &Path,
    store: &VectorStore,
    registry: &ChunkRegistry,
    meta: &SnapshotMeta,
) -> Result<Manifest, RagError> {
    if store.size() != registry.count() {
        return Err(RagError::CorruptIndex(format!(
            "refusing to save: {} vectors but {} registry entries",
            store.size(),
            registry.count()
        )));
    }

    fs::create_dir_all(dir)?;

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        fs::remove_file(&manifest_path)?;
    }

    let vectors_path = dir.join(VECTORS_FILE);
    store.save(&vectors_path)?;
    sqlite::save_registry(registry, &dir.join(REGISTRY_FILE)).await?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        dimension: store.dimension(),
        row_count: store.size(),
        max_tokens: meta.max_tokens,
        embedding_provider: meta.embedding_provider.clone(),
        built_at: Utc::now(),
        vectors_sha256: sha256_hex(&fs::read(&vectors_path)?),
    };

    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|err| RagError::Storage(format!("failed to encode manifest: {err}")))?;
    let tmp_path = dir.join("manifest.json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, &manifest_path)?;

    tracing::info!(
        dir = %dir.display(),
        rows = manifest.row_count,
        dimension = ?manifest.dimension,
        "Index snapshot saved"
    );
    Ok(manifest)
}

pub async fn load(dir: &Path) -> Result<Snapshot, RagError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path).map_err(|err| {
        RagError::CorruptIndex(format!(
            "cannot read manifest {}: {err}",
            manifest_path.display()
        ))
    })?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .map_err(|err| RagError::CorruptIndex(format!("invalid manifest: {err}")))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(RagError::CorruptIndex(format!(
            "unsupported snapshot format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    let vectors_path = dir.join(VECTORS_FILE);
    let bytes = fs::read(&vectors_path).map_err(|err| {
        RagError::CorruptIndex(format!(
            "cannot read vectors {}: {err}",
            vectors_path.display()
        ))
    })?;

    let checksum = sha256_hex(&bytes);
    if checksum != manifest.vectors_sha256 {
        return Err(RagError::CorruptIndex(format!(
            "vectors.bin checksum {} does not match manifest {}",
            checksum, manifest.vectors_sha256
        )));
    }

    let store = VectorStore::from_bytes(&bytes)?;
    if store.size() != manifest.row_count {
        return Err(RagError::CorruptIndex(format!(
            "manifest declares {} rows but vectors.bin holds {}",
            manifest.row_count,
            store.size()
        )));
    }
    if store.size() > 0 && store.dimension() != manifest.dimension {
        return Err(RagError::CorruptIndex(format!(
            "manifest dimension {:?} disagrees with vectors.bin dimension {:?}",
            manifest.dimension,
            store.dimension()
        )));
    }

    let registry = sqlite::load_registry(&dir.join(REGISTRY_FILE)).await?;
    if registry.count() != store.size() {
        return Err(RagError::CorruptIndex(format!(
            "registry holds {} rows but the vector store holds {}",
            registry.count(),
            store.size()
        )));
    }

    tracing::info!(
        dir = %dir.display(),
        rows = store.size(),
        built_at = %manifest.built_at,
        "Index snapshot loaded"
    );

    Ok(Snapshot {
        manifest,
        store,
        registry,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
