//! Exact nearest-neighbour vector index.
//!
//! Vectors live in a copy-on-write snapshot (`Arc<BTreeMap>`). Readers clone
//! the `Arc` and scan without holding the lock; writers build the next map
//! and swap it in, so a search sees either the whole update or none of it.
//!
//! The score is cosine similarity in [-1, 1].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use tars_core::VectorEntry;
use tokio::sync::RwLock;

/// Immutable view of the index at one point in time.
pub type IndexSnapshot = Arc<BTreeMap<String, Vec<f32>>>;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Rank every vector in `snapshot` against `query`.
///
/// Results are ordered by descending score, ties by ascending chunk id.
/// Scores below `min_score` are dropped before truncating to `top_k`.
pub fn rank(snapshot: &BTreeMap<String, Vec<f32>>, query: &[f32], top_k: usize, min_score: f32) -> Vec<(String, f32)> {
    if top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(&String, f32)> = snapshot
        .iter()
        .map(|(id, vector)| (id, cosine_similarity(vector, query)))
        .filter(|(_, score)| *score >= min_score)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    scored.truncate(top_k);
    scored.into_iter().map(|(id, score)| (id.clone(), score)).collect()
}

/// In-process vector index keyed by chunk id.
#[derive(Default)]
pub struct VectorIndex {
    entries: RwLock<IndexSnapshot>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from existing entries.
    pub fn from_entries(entries: impl IntoIterator<Item = VectorEntry>) -> Self {
        let map: BTreeMap<String, Vec<f32>> =
            entries.into_iter().map(|e| (e.chunk_id, e.vector)).collect();
        Self {
            entries: RwLock::new(Arc::new(map)),
        }
    }

    /// Insert or replace one vector.
    pub async fn upsert(&self, chunk_id: impl Into<String>, vector: Vec<f32>) {
        let mut guard = self.entries.write().await;
        Arc::make_mut(&mut guard).insert(chunk_id.into(), vector);
    }

    /// Insert or replace many vectors as one atomic update.
    pub async fn upsert_batch(&self, entries: Vec<VectorEntry>) {
        if entries.is_empty() {
            return;
        }
        let mut guard = self.entries.write().await;
        let mut next = BTreeMap::clone(&guard);
        for e in entries {
            next.insert(e.chunk_id, e.vector);
        }
        *guard = Arc::new(next);
    }

    /// Remove one vector. Missing ids are ignored; returns whether one was removed.
    pub async fn remove(&self, chunk_id: &str) -> bool {
        let mut guard = self.entries.write().await;
        if !guard.contains_key(chunk_id) {
            return false;
        }
        Arc::make_mut(&mut guard).remove(chunk_id).is_some()
    }

    /// Remove many vectors as one atomic update. Returns how many were present.
    pub async fn remove_batch(&self, chunk_ids: &[String]) -> usize {
        let mut guard = self.entries.write().await;
        let present = chunk_ids.iter().filter(|id| guard.contains_key(id.as_str())).count();
        if present == 0 {
            return 0;
        }
        let mut next = BTreeMap::clone(&guard);
        for id in chunk_ids {
            next.remove(id);
        }
        *guard = Arc::new(next);
        present
    }

    /// Replace the whole index contents at once.
    pub async fn replace_all(&self, entries: Vec<VectorEntry>) {
        let map: BTreeMap<String, Vec<f32>> =
            entries.into_iter().map(|e| (e.chunk_id, e.vector)).collect();
        *self.entries.write().await = Arc::new(map);
    }

    /// Current snapshot. Later writes do not affect it.
    pub async fn snapshot(&self) -> IndexSnapshot {
        Arc::clone(&*self.entries.read().await)
    }

    /// Top-k search over the current snapshot.
    pub async fn search(&self, query: &[f32], top_k: usize, min_score: f32) -> Vec<(String, f32)> {
        let snapshot = self.snapshot().await;
        rank(&snapshot, query, top_k, min_score)
    }

    pub async fn contains(&self, chunk_id: &str) -> bool {
        self.entries.read().await.contains_key(chunk_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
