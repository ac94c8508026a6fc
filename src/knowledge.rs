//! Knowledge base contract and an in-memory store.
//!
//! A knowledge base remembers how entities were resolved, keyed by their
//! [`Fingerprint`]. The engine asks it for candidates before running any rule
//! and, once an entity is fully resolved by rules, hands the result back.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::BoxError;
use crate::fingerprint::Fingerprint;
use crate::masked::{Mask, MaskedEntitySnapshot};

#[async_trait]
pub trait KnowledgeBase<M: Mask>: Send + Sync {
    /// Previously resolved entities sharing `fingerprint`, in store order.
    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<MaskedEntitySnapshot<M>>, BoxError>;

    async fn record_resolved(&self, snapshot: MaskedEntitySnapshot<M>) -> Result<(), BoxError>;
}

/// A knowledge base that knows nothing and forgets everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKnowledgeBase;

#[async_trait]
impl<M: Mask> KnowledgeBase<M> for NoKnowledgeBase {
    async fn find_by_fingerprint(&self, _: &Fingerprint) -> Result<Vec<MaskedEntitySnapshot<M>>, BoxError> {
        Ok(Vec::new())
    }

    async fn record_resolved(&self, _: MaskedEntitySnapshot<M>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Process-local knowledge base. Snapshots with identical mappings for the
/// same fingerprint are stored once.
#[derive(Debug)]
pub struct MemoryKnowledgeBase<M> {
    entries: RwLock<HashMap<Fingerprint, Vec<MaskedEntitySnapshot<M>>>>,
}

impl<M: Mask> MemoryKnowledgeBase<M> {
    pub fn new() -> Self {
        MemoryKnowledgeBase { entries: RwLock::new(HashMap::new()) }
    }

    /// Seed the store, e.g. from snapshots loaded off disk.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = MaskedEntitySnapshot<M>>) -> Self {
        let mut entries: HashMap<Fingerprint, Vec<MaskedEntitySnapshot<M>>> = HashMap::new();
        for snapshot in snapshots {
            let bucket = entries.entry(snapshot.fingerprint).or_default();
            if !bucket.iter().any(|s| s.mappings == snapshot.mappings) {
                bucket.push(snapshot);
            }
        }
        MemoryKnowledgeBase { entries: RwLock::new(entries) }
    }

    /// Number of stored snapshots across all fingerprints.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All stored snapshots, grouped by fingerprint.
    pub async fn snapshots(&self) -> Vec<MaskedEntitySnapshot<M>> {
        self.entries.read().await.values().flatten().cloned().collect()
    }
}

impl<M: Mask> Default for MemoryKnowledgeBase<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Mask> KnowledgeBase<M> for MemoryKnowledgeBase<M> {
    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<MaskedEntitySnapshot<M>>, BoxError> {
        Ok(self.entries.read().await.get(fingerprint).cloned().unwrap_or_default())
    }

    async fn record_resolved(&self, snapshot: MaskedEntitySnapshot<M>) -> Result<(), BoxError> {
        let mut entries = self.entries.write().await;
        let bucket = entries.entry(snapshot.fingerprint).or_default();
        if !bucket.iter().any(|s| s.mappings == snapshot.mappings) {
            bucket.push(snapshot);
        }
        Ok(())
    }
}
