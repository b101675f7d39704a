use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("transaction conflict: a key in the read or write set changed since begin")]
    Conflict,
    #[error("transaction already finished")]
    Finished,
    #[error("transaction is read-only")]
    ReadOnly,
    #[error("datastore failure: {0}")]
    Backend(String),
}

/// Byte-ordered transactional key-value capability consumed by the core.
///
/// Implementations provide at least snapshot isolation; commit is the
/// serialization point. After `commit` or `rollback` every call returns
/// [`KvError::Finished`]. A `commit` that fails may leave the transaction
/// open; callers that own it roll it back.
pub trait Transaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), KvError>;

    /// Entries with `start <= key < end`, ascending, at most `limit`.
    fn scan(
        &mut self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    fn commit(&mut self) -> Result<(), KvError>;

    fn rollback(&mut self) -> Result<(), KvError>;
}

pub trait Datastore {
    type Tx: Transaction;

    fn begin(&self, writable: bool) -> Result<Self::Tx, KvError>;
}
