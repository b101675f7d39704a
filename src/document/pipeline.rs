//! Stage functions of the CREATE pipeline.
//!
//! Stages run strictly in order: merge, authorize, index, identify,
//! persist-change, yield. Nothing is written before persist-change, so a
//! failing index or identify stage leaves the transaction untouched.

use super::index::{check_unique, compute_entries};
use super::merge::apply_data;
use super::patch::Patch;
use super::{Document, Outcome};
use crate::catalog::schema::TableDef;
use crate::catalog::types::Value;
use crate::config::KvdocConfig;
use crate::error::KvdocError;
use crate::permission::{Authority, CallerContext, Rule};
use crate::statement::{Data, Echo};
use crate::storage::keys::{Address, patch_key};
use crate::storage::kv::Transaction;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// CREATE rule of a table the catalog does not define.
static UNDEFINED_TABLE_RULE: Rule = Rule::None;

/// Inputs shared by every document of one statement.
pub struct StageContext<'c> {
    pub data: &'c Data,
    pub echo: Echo,
    pub caller: &'c CallerContext,
    pub table: Option<&'c TableDef>,
    pub config: &'c KvdocConfig,
}

pub fn run<T: Transaction>(
    doc: Document<'_, T>,
    ctx: &StageContext<'_>,
) -> Result<Outcome, KvdocError> {
    let doc = merge(doc, ctx.data)?;
    let Some(doc) = authorize(doc, ctx) else {
        return Ok(Outcome::Denied);
    };
    let doc = index(doc, ctx.table, ctx.config)?;
    let doc = identify(doc)?;
    let doc = persist_change(doc, ctx.config)?;
    Ok(yield_output(doc, ctx.echo))
}

pub fn merge<'t, T: Transaction>(
    mut doc: Document<'t, T>,
    data: &Data,
) -> Result<Document<'t, T>, KvdocError> {
    apply_data(&mut doc.current, data)?;
    trace!(thing = %doc.address.thing(), "merged");
    Ok(doc)
}

/// `None` when the caller may not create this document. Table rules see the
/// candidate as it will be stored, `id` and `table` included.
pub fn authorize<'t, T: Transaction>(
    doc: Document<'t, T>,
    ctx: &StageContext<'_>,
) -> Option<Document<'t, T>> {
    if !ctx.config.enforce_permissions {
        return Some(doc);
    }
    let allowed = match ctx.caller.authority(
        doc.address.tenant(),
        doc.address.namespace(),
        doc.address.database(),
    ) {
        Authority::Full => true,
        Authority::Outside => false,
        Authority::Rules => {
            let rule = ctx
                .table
                .map_or(&UNDEFINED_TABLE_RULE, |table| &table.permissions.create);
            rule.allows(ctx.caller, &candidate(&doc))
        }
    };
    if allowed {
        Some(doc)
    } else {
        debug!(
            thing = %doc.address.thing(),
            caller = %ctx.caller.caller_id,
            "create denied"
        );
        None
    }
}

pub fn index<'t, T: Transaction>(
    mut doc: Document<'t, T>,
    table: Option<&TableDef>,
    config: &KvdocConfig,
) -> Result<Document<'t, T>, KvdocError> {
    let entries = compute_entries(&doc.address, table, &candidate(&doc));
    for entry in &entries {
        if entry.key.len() > config.max_key_bytes {
            return Err(KvdocError::Validation(format!(
                "index key for '{}' is {} bytes, limit is {}",
                entry.index,
                entry.key.len(),
                config.max_key_bytes
            )));
        }
    }
    check_unique(&mut *doc.tx, &doc.address, &entries)?;
    trace!(thing = %doc.address.thing(), entries = entries.len(), "index entries staged");
    doc.staged_index = entries;
    Ok(doc)
}

/// Stamps `id` and `table` into the post-state. Both fields are reserved and
/// overwrite whatever the payload supplied.
pub fn identify<'t, T: Transaction>(
    mut doc: Document<'t, T>,
) -> Result<Document<'t, T>, KvdocError> {
    if doc.exists() {
        return Err(KvdocError::Conflict {
            address: doc.address.thing(),
        });
    }
    stamp_identity(&mut doc.current, &doc.address);
    Ok(doc)
}

/// Post-state as identify will store it. Rules and index entries are computed
/// from this, never from the raw payload.
fn candidate<T: Transaction>(doc: &Document<'_, T>) -> Value {
    let mut candidate = doc.current.clone();
    stamp_identity(&mut candidate, &doc.address);
    candidate
}

fn stamp_identity(doc: &mut Value, address: &Address) {
    if let Value::Object(fields) = doc {
        fields.insert("id".into(), address.id().to_value());
        fields.insert("table".into(), Value::from(address.table()));
    }
}

pub fn persist_change<'t, T: Transaction>(
    mut doc: Document<'t, T>,
    config: &KvdocConfig,
) -> Result<Document<'t, T>, KvdocError> {
    let encoded = rmp_serde::to_vec(&doc.current)?;
    if encoded.len() > config.max_value_bytes {
        return Err(KvdocError::Validation(format!(
            "record {} encodes to {} bytes, limit is {}",
            doc.address.thing(),
            encoded.len(),
            config.max_value_bytes
        )));
    }
    let before = doc.initial.clone().unwrap_or_else(Value::object);
    let patch = Patch::diff(&before, &doc.current);
    let change = if config.change_tracking {
        let key = patch_key(&doc.address, now_micros());
        if key.len() > config.max_key_bytes {
            return Err(KvdocError::Validation(format!(
                "patch key for {} is {} bytes, limit is {}",
                doc.address.thing(),
                key.len(),
                config.max_key_bytes
            )));
        }
        Some((key, rmp_serde::to_vec(&patch)?))
    } else {
        None
    };
    let owner = rmp_serde::to_vec(doc.address.id())?;

    doc.tx.put(doc.key.as_slice(), encoded)?;
    for entry in &doc.staged_index {
        doc.tx.put(entry.key.as_slice(), owner.clone())?;
    }
    if let Some((key, bytes)) = change {
        doc.tx.put(key.as_slice(), bytes)?;
    }
    debug!(
        thing = %doc.address.thing(),
        index_entries = doc.staged_index.len(),
        patch_ops = patch.ops.len(),
        "record persisted"
    );
    doc.patch = Some(patch);
    Ok(doc)
}

pub fn yield_output<T: Transaction>(doc: Document<'_, T>, echo: Echo) -> Outcome {
    match echo {
        Echo::None => Outcome::Silent,
        Echo::Before => match doc.initial {
            Some(before) => Outcome::Yielded(before),
            None => Outcome::Silent,
        },
        Echo::After => Outcome::Yielded(doc.current),
        Echo::Diff => Outcome::Yielded(doc.patch.unwrap_or_default().to_value()),
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
