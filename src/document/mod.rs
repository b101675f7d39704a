//! Per-record mutation pipeline.

pub mod index;
pub mod merge;
pub mod patch;
pub mod pipeline;

use crate::catalog::types::Value;
use crate::error::KvdocError;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::keys::Address;
use crate::storage::kv::Transaction;
use index::IndexEntry;
use patch::Patch;

/// Result of one document's pipeline run. Denial is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Yielded(Value),
    /// Succeeded, but the echo mode has nothing to return.
    Silent,
    Denied,
}

/// One record in flight, bound to the statement's transaction.
pub struct Document<'t, T: Transaction> {
    tx: &'t mut T,
    address: Address,
    key: EncodedKey,
    initial: Option<Value>,
    current: Value,
    staged_index: Vec<IndexEntry>,
    patch: Option<Patch>,
}

impl<'t, T: Transaction> Document<'t, T> {
    /// Reads the stored value at `address`; absence means the record does not
    /// exist yet.
    pub fn load(tx: &'t mut T, address: Address) -> Result<Self, KvdocError> {
        let key = address.encode();
        let initial = match tx.get(key.as_slice())? {
            Some(raw) => Some(rmp_serde::from_slice::<Value>(&raw)?),
            None => None,
        };
        let current = initial.clone().unwrap_or_else(Value::object);
        Ok(Self {
            tx,
            address,
            key,
            initial,
            current,
            staged_index: Vec::new(),
            patch: None,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn key(&self) -> &EncodedKey {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.initial.is_some()
    }

    /// Pre-state, `None` for a new record.
    pub fn initial(&self) -> Option<&Value> {
        self.initial.as_ref()
    }

    /// Post-state as built so far.
    pub fn current(&self) -> &Value {
        &self.current
    }
}
