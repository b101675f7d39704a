use crate::error::KvdocError;
use crate::storage::kv::{Datastore, KvError, Transaction};
use tracing::{debug, warn};

enum Handle<'a, T> {
    Owned { tx: T, finished: bool },
    Borrowed(&'a mut T),
}

/// Transaction used by one statement execution.
///
/// A borrowed transaction belongs to the caller and is never committed or
/// rolled back here. An owned transaction is finished exactly once: by
/// [`TransactionScope::commit`], by [`TransactionScope::rollback`], or by the
/// rollback in `Drop` when the scope is abandoned on an error path.
pub struct TransactionScope<'a, T: Transaction> {
    handle: Handle<'a, T>,
}

impl<'a, T: Transaction> TransactionScope<'a, T> {
    pub fn begin_or_adopt<D>(datastore: &D, existing: Option<&'a mut T>) -> Result<Self, KvdocError>
    where
        D: Datastore<Tx = T>,
    {
        let handle = match existing {
            Some(tx) => Handle::Borrowed(tx),
            None => Handle::Owned {
                tx: datastore.begin(true)?,
                finished: false,
            },
        };
        let scope = Self { handle };
        debug!(owned = scope.is_owned(), "transaction scope opened");
        Ok(scope)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.handle, Handle::Owned { .. })
    }

    pub fn tx(&mut self) -> &mut T {
        match &mut self.handle {
            Handle::Owned { tx, .. } => tx,
            Handle::Borrowed(tx) => tx,
        }
    }

    /// Commits an owned transaction; a borrowed one is left to its caller.
    ///
    /// A failed commit is followed by a rollback, which a substrate that
    /// already aborted the transaction answers with `Finished`.
    pub fn commit(mut self) -> Result<(), KvdocError> {
        match &mut self.handle {
            Handle::Owned { tx, finished } => {
                *finished = true;
                if let Err(err) = tx.commit() {
                    match tx.rollback() {
                        Ok(()) | Err(KvError::Finished) => {}
                        Err(rollback) => {
                            warn!(error = ?rollback, "rollback after failed commit failed")
                        }
                    }
                    return Err(err.into());
                }
                debug!("owned transaction committed");
                Ok(())
            }
            Handle::Borrowed(_) => Ok(()),
        }
    }

    /// Rolls back an owned transaction; a borrowed one is left to its caller.
    pub fn rollback(mut self) -> Result<(), KvdocError> {
        match &mut self.handle {
            Handle::Owned { tx, finished } => {
                *finished = true;
                tx.rollback()?;
                debug!("owned transaction rolled back");
                Ok(())
            }
            Handle::Borrowed(_) => Ok(()),
        }
    }
}

impl<T: Transaction> Drop for TransactionScope<'_, T> {
    fn drop(&mut self) {
        let Handle::Owned { tx, finished } = &mut self.handle else {
            return;
        };
        if *finished {
            return;
        }
        *finished = true;
        match tx.rollback() {
            Ok(()) => debug!("owned transaction rolled back on abandoned scope"),
            // Cannot return an error from Drop.
            Err(err) => warn!(error = ?err, "rollback of abandoned transaction failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TransactionScope;
    use crate::error::KvdocErrorCode;
    use crate::storage::kv::{Datastore, KvError, Transaction};
    use crate::storage::memory::MemoryDatastore;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Substrate whose commit fails and leaves the transaction open.
    #[derive(Default)]
    struct FailingCommit {
        rollbacks: Rc<Cell<usize>>,
    }

    struct FailingTx {
        rollbacks: Rc<Cell<usize>>,
    }

    impl Datastore for FailingCommit {
        type Tx = FailingTx;

        fn begin(&self, _writable: bool) -> Result<FailingTx, KvError> {
            Ok(FailingTx {
                rollbacks: Rc::clone(&self.rollbacks),
            })
        }
    }

    impl Transaction for FailingTx {
        fn get(&mut self, _key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
            Ok(None)
        }

        fn put(&mut self, _key: &[u8], _value: Vec<u8>) -> Result<(), KvError> {
            Ok(())
        }

        fn scan(
            &mut self,
            _start: &[u8],
            _end: &[u8],
            _limit: usize,
        ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
            Ok(Vec::new())
        }

        fn commit(&mut self) -> Result<(), KvError> {
            Err(KvError::Backend("disk full".into()))
        }

        fn rollback(&mut self) -> Result<(), KvError> {
            self.rollbacks.set(self.rollbacks.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn failed_commit_rolls_back_an_open_transaction_once() {
        let ds = FailingCommit::default();
        let scope = TransactionScope::begin_or_adopt(&ds, None).expect("scope");
        let err = scope.commit().expect_err("commit fails");
        assert_eq!(err.code(), KvdocErrorCode::Substrate);
        assert_eq!(ds.rollbacks.get(), 1);
    }

    #[test]
    fn conflicting_commit_is_not_rolled_back_twice() {
        let ds = MemoryDatastore::new();
        let mut other = ds.begin(true).expect("begin");
        let mut scope = TransactionScope::begin_or_adopt(&ds, None).expect("scope");
        scope.tx().put(b"k", b"mine".to_vec()).expect("put");
        other.put(b"k", b"theirs".to_vec()).expect("put");
        other.commit().expect("first writer");

        let err = scope.commit().expect_err("second writer");
        assert_eq!(err.code(), KvdocErrorCode::Substrate);
        let m = ds.metrics();
        assert_eq!((m.conflicts, m.rollbacks), (1, 1));
    }

    #[test]
    fn owned_scope_commits_exactly_once() {
        let ds = MemoryDatastore::new();
        let mut scope = TransactionScope::begin_or_adopt(&ds, None).expect("scope");
        assert!(scope.is_owned());
        scope.tx().put(b"k", b"v".to_vec()).expect("put");
        scope.commit().expect("commit");
        let m = ds.metrics();
        assert_eq!((m.commits, m.rollbacks), (1, 0));
        assert_eq!(ds.get_committed(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn abandoned_owned_scope_rolls_back_once() {
        let ds = MemoryDatastore::new();
        {
            let mut scope = TransactionScope::begin_or_adopt(&ds, None).expect("scope");
            scope.tx().put(b"k", b"v".to_vec()).expect("put");
        }
        let m = ds.metrics();
        assert_eq!((m.commits, m.rollbacks), (0, 1));
        assert!(ds.is_empty());
    }

    #[test]
    fn explicit_rollback_is_not_repeated_on_drop() {
        let ds = MemoryDatastore::new();
        let scope = TransactionScope::begin_or_adopt(&ds, None).expect("scope");
        scope.rollback().expect("rollback");
        assert_eq!(ds.metrics().rollbacks, 1);
    }

    #[test]
    fn borrowed_scope_never_finishes_the_callers_transaction() {
        let ds = MemoryDatastore::new();
        let mut tx = ds.begin(true).expect("begin");
        {
            let mut scope = TransactionScope::begin_or_adopt(&ds, Some(&mut tx)).expect("scope");
            assert!(!scope.is_owned());
            scope.tx().put(b"k", b"v".to_vec()).expect("put");
            scope.commit().expect("no-op commit");
        }
        {
            let _abandoned = TransactionScope::begin_or_adopt(&ds, Some(&mut tx)).expect("scope");
        }
        assert!(!tx.is_finished());
        assert!(ds.is_empty());
        tx.commit().expect("caller commits");
        assert_eq!(ds.get_committed(b"k"), Some(b"v".to_vec()));
        let m = ds.metrics();
        assert_eq!((m.commits, m.rollbacks), (1, 0));
    }
}
