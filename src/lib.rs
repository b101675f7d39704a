pub mod catalog;
pub mod commit;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod permission;
pub mod statement;
pub mod storage;

use crate::catalog::types::Value;
use crate::catalog::{Catalog, DdlOperation};
use crate::commit::executor::StatementExecutor;
use crate::config::KvdocConfig;
use crate::document::patch::Patch;
use crate::error::KvdocError;
use crate::identity::IdentityGenerator;
use crate::permission::CallerContext;
use crate::statement::CreateStatement;
use crate::storage::encoded_key::{EncodedKey, prefix_successor};
use crate::storage::keys::{Address, decode_patch_at, patch_prefix, record_prefix};
use crate::storage::kv::{Datastore, Transaction};
use crate::storage::memory::MemoryDatastore;
use parking_lot::RwLock;
use tracing::{info, warn};

/// Document store over a transactional key-value datastore.
pub struct Kvdoc<D: Datastore = MemoryDatastore> {
    config: KvdocConfig,
    datastore: D,
    catalog: RwLock<Catalog>,
    identity: IdentityGenerator,
}

impl Kvdoc<MemoryDatastore> {
    pub fn in_memory(config: KvdocConfig) -> Result<Self, KvdocError> {
        Self::open(config, MemoryDatastore::new())
    }
}

impl<D: Datastore> Kvdoc<D> {
    pub fn open(config: KvdocConfig, datastore: D) -> Result<Self, KvdocError> {
        config.validate()?;
        info!(
            max_key_bytes = config.max_key_bytes,
            max_value_bytes = config.max_value_bytes,
            max_targets_per_statement = config.max_targets_per_statement,
            change_tracking = config.change_tracking,
            enforce_permissions = config.enforce_permissions,
            "kvdoc opened"
        );
        Ok(Self {
            config,
            datastore,
            catalog: RwLock::new(Catalog::default()),
            identity: IdentityGenerator,
        })
    }

    pub fn config(&self) -> &KvdocConfig {
        &self.config
    }

    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    /// Snapshot of the current table definitions.
    pub fn catalog(&self) -> Catalog {
        self.catalog.read().clone()
    }

    pub fn apply_ddl(&self, op: DdlOperation) -> Result<(), KvdocError> {
        self.catalog.write().apply_ddl(op)
    }

    /// Begins a writable transaction the caller owns.
    pub fn begin(&self) -> Result<D::Tx, KvdocError> {
        Ok(self.datastore.begin(true)?)
    }

    /// Runs `stmt` in its own transaction.
    pub fn create(
        &self,
        stmt: &CreateStatement,
        caller: &CallerContext,
    ) -> Result<Vec<Value>, KvdocError> {
        self.execute(stmt, caller, None)
    }

    /// Runs `stmt` inside `tx`; committing or rolling back stays with the caller.
    pub fn create_in(
        &self,
        stmt: &CreateStatement,
        caller: &CallerContext,
        tx: &mut D::Tx,
    ) -> Result<Vec<Value>, KvdocError> {
        self.execute(stmt, caller, Some(tx))
    }

    fn execute(
        &self,
        stmt: &CreateStatement,
        caller: &CallerContext,
        tx: Option<&mut D::Tx>,
    ) -> Result<Vec<Value>, KvdocError> {
        let catalog = self.catalog.read();
        let executor = StatementExecutor::new(&catalog, &self.config, self.identity);
        executor
            .execute(&self.datastore, stmt, caller, tx)
            .inspect_err(|err| warn!(error = ?err, code = err.code_str(), "create failed"))
    }

    /// Latest committed state of one record.
    pub fn get(&self, address: &Address) -> Result<Option<Value>, KvdocError> {
        self.read(|tx| {
            tx.get(address.encode().as_slice())?
                .map(|raw| rmp_serde::from_slice(&raw).map_err(KvdocError::from))
                .transpose()
        })
    }

    /// Committed records of one table in key order.
    pub fn scan_table(
        &self,
        tenant: &str,
        namespace: &str,
        database: &str,
        table: &str,
    ) -> Result<Vec<(Address, Value)>, KvdocError> {
        let prefix = record_prefix(tenant, namespace, database, table);
        self.read(|tx| {
            tx.scan(prefix.as_slice(), &range_end(&prefix), usize::MAX)?
                .into_iter()
                .map(|(key, raw)| -> Result<(Address, Value), KvdocError> {
                    Ok((Address::decode(&key)?, rmp_serde::from_slice(&raw)?))
                })
                .collect()
        })
    }

    /// Change records of one record, oldest first, with their timestamps.
    pub fn patches(&self, address: &Address) -> Result<Vec<(u64, Patch)>, KvdocError> {
        let prefix = patch_prefix(address);
        self.read(|tx| {
            tx.scan(prefix.as_slice(), &range_end(&prefix), usize::MAX)?
                .into_iter()
                .map(|(key, raw)| -> Result<(u64, Patch), KvdocError> {
                    Ok((decode_patch_at(address, &key)?, rmp_serde::from_slice(&raw)?))
                })
                .collect()
        })
    }

    fn read<R>(
        &self,
        f: impl FnOnce(&mut D::Tx) -> Result<R, KvdocError>,
    ) -> Result<R, KvdocError> {
        let mut tx = self.datastore.begin(false)?;
        let result = f(&mut tx);
        if let Err(err) = tx.rollback() {
            warn!(error = ?err, "read transaction rollback failed");
        }
        result
    }
}

/// Exclusive upper bound of a prefix scan.
fn range_end(prefix: &EncodedKey) -> Vec<u8> {
    match prefix_successor(prefix) {
        Some(end) => end.to_vec(),
        None => vec![u8::MAX; prefix.len() + 1],
    }
}
