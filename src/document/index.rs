use crate::catalog::schema::{IndexDef, TableDef};
use crate::catalog::types::{RecordId, Value};
use crate::error::KvdocError;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::keys::{Address, index_key};
use crate::storage::kv::Transaction;

/// Index entry waiting to be written with its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: String,
    pub unique: bool,
    pub key: EncodedKey,
}

/// Values of `def.fields` in `doc`, or `None` when any is missing or null.
fn indexed_values(def: &IndexDef, doc: &Value) -> Option<Vec<Value>> {
    def.fields
        .iter()
        .map(|field| doc.get_path(field).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// Entries `doc` contributes to the indexes of `table`.
pub fn compute_entries(address: &Address, table: Option<&TableDef>, doc: &Value) -> Vec<IndexEntry> {
    let Some(table) = table else {
        return Vec::new();
    };
    table
        .indexes
        .iter()
        .filter_map(|def| {
            let values = indexed_values(def, doc)?;
            Some(IndexEntry {
                index: def.name.clone(),
                unique: def.unique,
                key: index_key(address, &def.name, &values, def.unique),
            })
        })
        .collect()
}

/// Fails when a unique entry is already owned by a different record, as seen
/// from `tx`.
pub fn check_unique<T: Transaction>(
    tx: &mut T,
    address: &Address,
    entries: &[IndexEntry],
) -> Result<(), KvdocError> {
    for entry in entries.iter().filter(|entry| entry.unique) {
        let Some(raw) = tx.get(entry.key.as_slice())? else {
            continue;
        };
        let owner: RecordId = rmp_serde::from_slice(&raw)?;
        if &owner != address.id() {
            return Err(KvdocError::Index {
                table: address.table().to_string(),
                index: entry.index.clone(),
                key: format!("{:?}", entry.key),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_unique, compute_entries};
    use crate::catalog::schema::{IndexDef, TableDef, TablePermissions};
    use crate::catalog::types::{RecordId, Value};
    use crate::error::KvdocErrorCode;
    use crate::storage::keys::Address;
    use crate::storage::kv::{Datastore, Transaction};
    use crate::storage::memory::MemoryDatastore;
    use serde_json::json;

    fn person_table() -> TableDef {
        TableDef {
            tenant: "acme".into(),
            namespace: "app".into(),
            database: "main".into(),
            table_name: "person".into(),
            permissions: TablePermissions::full(),
            indexes: vec![
                IndexDef {
                    name: "by_email".into(),
                    fields: vec!["email".into()],
                    unique: true,
                },
                IndexDef {
                    name: "by_city".into(),
                    fields: vec!["address.city".into()],
                    unique: false,
                },
            ],
        }
    }

    fn addr(id: &str) -> Address {
        Address::new("acme", "app", "main", "person", RecordId::text(id))
    }

    #[test]
    fn missing_and_null_fields_are_not_indexed() {
        let table = person_table();
        let doc = Value::from(json!({"email": null, "address": {"city": "Oslo"}}));
        let entries = compute_entries(&addr("a"), Some(&table), &doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, "by_city");
        assert!(compute_entries(&addr("a"), None, &doc).is_empty());
    }

    #[test]
    fn unique_entry_owned_by_another_record_is_a_violation() {
        let ds = MemoryDatastore::new();
        let table = person_table();
        let doc = Value::from(json!({"email": "ann@example.com"}));
        let entries = compute_entries(&addr("a"), Some(&table), &doc);

        let mut tx = ds.begin(true).expect("begin");
        let owner = rmp_serde::to_vec(&RecordId::text("a")).expect("encode");
        tx.put(entries[0].key.as_slice(), owner).expect("put");

        check_unique(&mut tx, &addr("a"), &entries).expect("own entry is fine");
        let theirs = compute_entries(&addr("b"), Some(&table), &doc);
        let err = check_unique(&mut tx, &addr("b"), &theirs).expect_err("taken");
        assert_eq!(err.code(), KvdocErrorCode::IndexViolation);
    }
}
