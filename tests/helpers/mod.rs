#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use engram::embedding::EmbeddingProvider;
use engram::memory::store::MemoryStore;
use engram::storage::redb::RedbStore;
use engram::storage::sqlite::SqliteStore;

/// Deterministic embedding provider for tests.
///
/// Known texts map to fixed vectors; anything else gets a stable vector
/// derived from its bytes. Dimension is 8 to keep fixtures readable.
pub struct StubProvider {
    overrides: HashMap<String, Vec<f32>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Pin exact vectors for specific texts (queries and record contents).
    pub fn with_vectors(pairs: &[(&str, Vec<f32>)]) -> Self {
        Self {
            overrides: pairs
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
        }
    }
}

impl EmbeddingProvider for StubProvider {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if let Some(vector) = self.overrides.get(text) {
            return Ok(vector.clone());
        }
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += b as f32;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// Unit vector along dimension `dim` (mod 8). Distinct dims are orthogonal.
pub fn spike(dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    v[dim % 8] = 1.0;
    v
}

/// The two storage backends under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Redb,
}

pub const BACKENDS: [Backend; 2] = [Backend::Sqlite, Backend::Redb];

/// Build a facade over a fresh on-disk store of the given backend.
/// The returned `TempDir` must be kept alive for the store's lifetime.
pub fn make_store(
    backend: Backend,
    provider: Arc<dyn EmbeddingProvider>,
) -> (MemoryStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store: Box<dyn engram::storage::RecordStore> = match backend {
        Backend::Sqlite => Box::new(
            SqliteStore::open(dir.path().join("memory.db"), provider.clone()).unwrap(),
        ),
        Backend::Redb => Box::new(
            RedbStore::open(dir.path().join("memory.redb"), provider.clone()).unwrap(),
        ),
    };
    (MemoryStore::new(store, provider), dir)
}
