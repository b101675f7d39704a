use crate::storage::kv::{Datastore, KvError, Transaction};
use im::OrdMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionedValue {
    value: Vec<u8>,
    version: u64,
}

#[derive(Debug, Default)]
struct Committed {
    entries: OrdMap<Vec<u8>, VersionedValue>,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct DatastoreMetrics {
    pub begun: AtomicU64,
    pub commits: AtomicU64,
    pub rollbacks: AtomicU64,
    pub conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
}

impl DatastoreMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            begun: self.begun.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// In-memory optimistic datastore.
///
/// Transactions read from a structural-sharing snapshot taken at begin and
/// buffer their writes. Commit fails with [`KvError::Conflict`] when any key
/// the transaction read or wrote was committed by someone else after that
/// snapshot. Range scans only register the keys they returned, so phantom
/// inserts into a scanned range are not detected.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    committed: Arc<RwLock<Committed>>,
    metrics: Arc<DatastoreMetrics>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.committed.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latest committed value, outside any transaction.
    pub fn get_committed(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.committed
            .read()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }
}

impl Datastore for MemoryDatastore {
    type Tx = MemoryTransaction;

    fn begin(&self, writable: bool) -> Result<MemoryTransaction, KvError> {
        let committed = self.committed.read();
        self.metrics.begun.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            metrics: Arc::clone(&self.metrics),
            snapshot: committed.entries.clone(),
            start_seq: committed.seq,
            writes: BTreeMap::new(),
            reads: BTreeSet::new(),
            writable,
            state: TxState::Open,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub struct MemoryTransaction {
    committed: Arc<RwLock<Committed>>,
    metrics: Arc<DatastoreMetrics>,
    snapshot: OrdMap<Vec<u8>, VersionedValue>,
    start_seq: u64,
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
    reads: BTreeSet<Vec<u8>>,
    writable: bool,
    state: TxState,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), KvError> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Committed | TxState::RolledBack => Err(KvError::Finished),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state != TxState::Open
    }
}

impl Transaction for MemoryTransaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.ensure_open()?;
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        self.reads.insert(key.to_vec());
        Ok(self.snapshot.get(key).map(|entry| entry.value.clone()))
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), KvError> {
        self.ensure_open()?;
        if !self.writable {
            return Err(KvError::ReadOnly);
        }
        self.writes.insert(key.to_vec(), value);
        Ok(())
    }

    fn scan(
        &mut self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        self.ensure_open()?;
        let range = (
            Bound::Included(start.to_vec()),
            Bound::Excluded(end.to_vec()),
        );
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .snapshot
            .range(range.clone())
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
            .collect();
        for (k, v) in self.writes.range(range) {
            merged.insert(k.clone(), v.clone());
        }
        let out: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().take(limit).collect();
        for (k, _) in &out {
            if !self.writes.contains_key(k) {
                self.reads.insert(k.clone());
            }
        }
        Ok(out)
    }

    fn commit(&mut self) -> Result<(), KvError> {
        self.ensure_open()?;
        if self.writes.is_empty() {
            self.state = TxState::Committed;
            self.metrics.commits.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let mut committed = self.committed.write();
        let changed_since_begin = |key: &Vec<u8>| {
            committed
                .entries
                .get(key)
                .is_some_and(|entry| entry.version > self.start_seq)
        };
        if self.reads.iter().any(changed_since_begin) || self.writes.keys().any(changed_since_begin)
        {
            drop(committed);
            self.state = TxState::RolledBack;
            self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
            self.metrics.rollbacks.fetch_add(1, Ordering::Relaxed);
            return Err(KvError::Conflict);
        }
        committed.seq += 1;
        let version = committed.seq;
        for (key, value) in std::mem::take(&mut self.writes) {
            committed
                .entries
                .insert(key, VersionedValue { value, version });
        }
        trace!(version, "memory transaction committed");
        self.state = TxState::Committed;
        self.metrics.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), KvError> {
        self.ensure_open()?;
        self.writes.clear();
        self.state = TxState::RolledBack;
        self.metrics.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
