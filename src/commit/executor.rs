use crate::catalog::Catalog;
use crate::catalog::types::{RecordId, Value};
use crate::commit::scope::TransactionScope;
use crate::config::KvdocConfig;
use crate::document::pipeline::{StageContext, run};
use crate::document::{Document, Outcome};
use crate::error::KvdocError;
use crate::identity::IdentityGenerator;
use crate::permission::CallerContext;
use crate::statement::{CreateStatement, Target};
use crate::storage::keys::Address;
use crate::storage::kv::{Datastore, Transaction};
use tracing::{debug, info, info_span};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub yielded: usize,
    pub silent: usize,
    pub denied: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Yielded(_) => self.yielded += 1,
            Outcome::Silent => self.silent += 1,
            Outcome::Denied => self.denied += 1,
        }
    }
}

/// Runs CREATE statements: resolves targets into addresses and drives one
/// pipeline run per address inside a single transaction.
pub struct StatementExecutor<'e> {
    catalog: &'e Catalog,
    config: &'e KvdocConfig,
    identity: IdentityGenerator,
}

impl<'e> StatementExecutor<'e> {
    pub fn new(catalog: &'e Catalog, config: &'e KvdocConfig, identity: IdentityGenerator) -> Self {
        Self {
            catalog,
            config,
            identity,
        }
    }

    /// Yields one value per document that produced output, in target order.
    ///
    /// With `existing` the caller's transaction is used and left open. Without
    /// it a transaction is begun here, committed on success and rolled back on
    /// the first error.
    pub fn execute<D: Datastore>(
        &self,
        datastore: &D,
        stmt: &CreateStatement,
        caller: &CallerContext,
        existing: Option<&mut D::Tx>,
    ) -> Result<Vec<Value>, KvdocError> {
        let span = info_span!(
            "create",
            tenant = %stmt.tenant,
            ns = %stmt.namespace,
            db = %stmt.database,
            targets = stmt.what.len()
        );
        let _entered = span.enter();

        self.validate(stmt)?;
        let mut scope = TransactionScope::begin_or_adopt(datastore, existing)?;
        let mut output = Vec::new();
        let mut counts = OutcomeCounts::default();

        for target in &stmt.what {
            match target {
                Target::SingleRecord { table, id } => {
                    let address = self.address(stmt, table, id.clone())?;
                    let outcome = self.process(scope.tx(), stmt, caller, address)?;
                    collect(outcome, &mut output, &mut counts);
                }
                Target::WholeTable { table } => {
                    let id = self.identity.new_identity(&stmt.tenant);
                    let address = self.address(stmt, table, id)?;
                    let outcome = self.process(scope.tx(), stmt, caller, address)?;
                    collect(outcome, &mut output, &mut counts);
                }
                Target::Batch { table, ids } => {
                    for id in ids {
                        let address = self.address(stmt, table, id.clone())?;
                        let outcome = self.process(scope.tx(), stmt, caller, address)?;
                        collect(outcome, &mut output, &mut counts);
                    }
                }
                Target::Expression(_) => debug!("non-addressable target skipped"),
            }
        }

        scope.commit()?;
        info!(
            yielded = counts.yielded,
            silent = counts.silent,
            denied = counts.denied,
            "create statement executed"
        );
        Ok(output)
    }

    fn validate(&self, stmt: &CreateStatement) -> Result<(), KvdocError> {
        for (what, name) in [
            ("tenant", &stmt.tenant),
            ("namespace", &stmt.namespace),
            ("database", &stmt.database),
        ] {
            if name.is_empty() {
                return Err(KvdocError::Validation(format!("{what} name is empty")));
            }
        }
        if stmt.what.iter().any(|t| t.table().is_some_and(str::is_empty)) {
            return Err(KvdocError::Validation("table name is empty".into()));
        }
        let resolved: usize = stmt.what.iter().map(Target::resolved_len).sum();
        if resolved > self.config.max_targets_per_statement {
            return Err(KvdocError::Validation(format!(
                "statement resolves to {resolved} records, limit is {}",
                self.config.max_targets_per_statement
            )));
        }
        Ok(())
    }

    fn address(
        &self,
        stmt: &CreateStatement,
        table: &str,
        id: RecordId,
    ) -> Result<Address, KvdocError> {
        let address = Address::new(
            stmt.tenant.as_str(),
            stmt.namespace.as_str(),
            stmt.database.as_str(),
            table,
            id,
        );
        let len = address.encode().len();
        if len > self.config.max_key_bytes {
            return Err(KvdocError::Validation(format!(
                "record key for {} is {len} bytes, limit is {}",
                address.thing(),
                self.config.max_key_bytes
            )));
        }
        Ok(address)
    }

    fn process<T: Transaction>(
        &self,
        tx: &mut T,
        stmt: &CreateStatement,
        caller: &CallerContext,
        address: Address,
    ) -> Result<Outcome, KvdocError> {
        let table = self.catalog.table(
            address.tenant(),
            address.namespace(),
            address.database(),
            address.table(),
        );
        let ctx = StageContext {
            data: &stmt.data,
            echo: stmt.echo,
            caller,
            table,
            config: self.config,
        };
        let doc = Document::load(tx, address)?;
        run(doc, &ctx)
    }
}

fn collect(outcome: Outcome, output: &mut Vec<Value>, counts: &mut OutcomeCounts) {
    counts.record(&outcome);
    if let Outcome::Yielded(value) = outcome {
        output.push(value);
    }
}
