//! Hierarchical key layout.
//!
//! ```text
//! record  = '/' text(tenant) text(ns) text(db) text(table) '*' id
//! index   = '/' text(tenant) text(ns) text(db) text(table) '+' text(index) value* [id]
//! patch   = '/' text(tenant) text(ns) text(db) text(table) '~' id u64be(at)
//! ```
//!
//! Text fields are null-terminated with interior nulls escaped as `00 FF`.
//! UTF-8 never produces `FF`, so a terminator can never be mistaken for an
//! escape and no field encoding is a prefix of a sibling's. This layout is a
//! durable storage format.

use crate::catalog::types::{RecordId, Value};
use crate::error::KvdocError;
use crate::storage::encoded_key::{EncodedKey, KeyReader, TAG_INTEGER, TAG_TEXT};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

const KEY_PREFIX: u8 = b'/';
const KIND_RECORD: u8 = b'*';
const KIND_INDEX: u8 = b'+';
const KIND_PATCH: u8 = b'~';

/// Storage location of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    tenant: String,
    namespace: String,
    database: String,
    table: String,
    id: RecordId,
}

impl Address {
    pub fn new(
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        id: RecordId,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            database: database.into(),
            table: table.into(),
            id,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn encode(&self) -> EncodedKey {
        let mut key = table_prefix(&self.tenant, &self.namespace, &self.database, &self.table);
        key.push_byte(KIND_RECORD);
        push_id(&mut key, &self.id);
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KvdocError> {
        let mut reader = KeyReader::new(bytes);
        reader.expect_byte(KEY_PREFIX, "key prefix")?;
        let tenant = reader.read_text()?;
        let namespace = reader.read_text()?;
        let database = reader.read_text()?;
        let table = reader.read_text()?;
        reader.expect_byte(KIND_RECORD, "record")?;
        let id = read_id(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(KvdocError::malformed_key("trailing bytes after record id"));
        }
        Ok(Self {
            tenant,
            namespace,
            database,
            table,
            id,
        })
    }

    /// `table:id`, as shown to callers.
    pub fn thing(&self) -> String {
        format!("{}:{}", self.table, self.id)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Addresses order by their encoded key, the order the substrate sees.
impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encode().cmp(&other.encode())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}:{}",
            self.tenant, self.namespace, self.database, self.table, self.id
        )
    }
}

pub fn table_prefix(tenant: &str, namespace: &str, database: &str, table: &str) -> EncodedKey {
    let mut key = EncodedKey::default();
    key.push_byte(KEY_PREFIX);
    key.push_text(tenant);
    key.push_text(namespace);
    key.push_text(database);
    key.push_text(table);
    key
}

/// Prefix shared by every record key of one table.
pub fn record_prefix(tenant: &str, namespace: &str, database: &str, table: &str) -> EncodedKey {
    let mut key = table_prefix(tenant, namespace, database, table);
    key.push_byte(KIND_RECORD);
    key
}

pub fn index_prefix(address: &Address, index_name: &str) -> EncodedKey {
    let mut key = table_prefix(
        &address.tenant,
        &address.namespace,
        &address.database,
        &address.table,
    );
    key.push_byte(KIND_INDEX);
    key.push_text(index_name);
    key
}

/// Unique entries are keyed by the indexed values alone; non-unique entries
/// append the record id so each record owns its own entry.
pub fn index_key(address: &Address, index_name: &str, values: &[Value], unique: bool) -> EncodedKey {
    let mut key = index_prefix(address, index_name);
    for value in values {
        key.push_value(value);
    }
    if !unique {
        push_id(&mut key, &address.id);
    }
    key
}

pub fn patch_prefix(address: &Address) -> EncodedKey {
    let mut key = table_prefix(
        &address.tenant,
        &address.namespace,
        &address.database,
        &address.table,
    );
    key.push_byte(KIND_PATCH);
    push_id(&mut key, &address.id);
    key
}

pub fn patch_key(address: &Address, at_micros: u64) -> EncodedKey {
    let mut key = patch_prefix(address);
    key.push_u64(at_micros);
    key
}

/// Reads the timestamp suffix of a patch key belonging to `address`.
pub fn decode_patch_at(address: &Address, bytes: &[u8]) -> Result<u64, KvdocError> {
    let prefix = patch_prefix(address);
    let suffix = bytes
        .strip_prefix(prefix.as_slice())
        .ok_or_else(|| KvdocError::malformed_key(format!("not a patch key of {address}")))?;
    let mut reader = KeyReader::new(suffix);
    let at = reader.read_u64()?;
    if !reader.is_exhausted() {
        return Err(KvdocError::malformed_key("trailing bytes after patch timestamp"));
    }
    Ok(at)
}

fn push_id(key: &mut EncodedKey, id: &RecordId) {
    key.push_value(&id.to_value());
}

fn read_id(reader: &mut KeyReader<'_>) -> Result<RecordId, KvdocError> {
    match reader.read_byte()? {
        TAG_INTEGER => Ok(RecordId::Integer(reader.read_i64()?)),
        TAG_TEXT => Ok(RecordId::Text(reader.read_text()?.into())),
        other => Err(KvdocError::malformed_key(format!(
            "unknown record id tag 0x{other:02x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, decode_patch_at, index_key, patch_key, record_prefix};
    use crate::catalog::types::{RecordId, Value};
    use crate::error::KvdocErrorCode;
    use crate::storage::encoded_key::prefix_successor;

    fn addr(table: &str, id: RecordId) -> Address {
        Address::new("acme", "app", "main", table, id)
    }

    #[test]
    fn record_key_roundtrips() {
        let a = addr("person", RecordId::text("tobie"));
        assert_eq!(Address::decode(a.encode().as_slice()).expect("decode"), a);
        let b = addr("person", RecordId::Integer(-7));
        assert_eq!(Address::decode(b.encode().as_slice()).expect("decode"), b);
    }

    #[test]
    fn table_and_id_boundaries_do_not_alias() {
        let a = addr("ab", RecordId::text("c"));
        let b = addr("a", RecordId::text("bc"));
        assert_ne!(a.encode(), b.encode());
        assert!(b < a);
    }

    #[test]
    fn table_records_form_one_contiguous_range() {
        let start = record_prefix("acme", "app", "main", "person");
        let end = prefix_successor(&start).expect("successor");
        for id in [RecordId::Integer(i64::MIN), RecordId::text("zzz"), RecordId::text("")] {
            let key = addr("person", id).encode();
            assert!(key >= start && key < end);
        }
        let other = addr("persona", RecordId::Integer(0)).encode();
        assert!(other >= end);
    }

    #[test]
    fn decode_rejects_inconsistent_layouts() {
        let good = addr("person", RecordId::text("x")).encode().to_vec();

        let mut trailing = good.clone();
        trailing.push(0x01);
        let mut bad_tag = good.clone();
        let tag_at = good.len() - 3;
        bad_tag[tag_at] = 0x42;

        for bytes in [
            Vec::new(),
            b"xyz".to_vec(),
            good[..good.len() - 1].to_vec(),
            trailing,
            bad_tag,
        ] {
            let err = Address::decode(&bytes).expect_err("malformed");
            assert_eq!(err.code(), KvdocErrorCode::MalformedKey);
        }
    }

    #[test]
    fn unique_index_keys_omit_the_record_id() {
        let a = addr("person", RecordId::text("a"));
        let b = addr("person", RecordId::text("b"));
        let email = [Value::from("ann@example.com")];
        assert_eq!(
            index_key(&a, "by_email", &email, true),
            index_key(&b, "by_email", &email, true)
        );
        assert_ne!(
            index_key(&a, "by_email", &email, false),
            index_key(&b, "by_email", &email, false)
        );
    }

    #[test]
    fn patch_keys_sort_by_time_and_decode() {
        let a = addr("person", RecordId::text("a"));
        let early = patch_key(&a, 10);
        let late = patch_key(&a, 11);
        assert!(early < late);
        assert_eq!(decode_patch_at(&a, late.as_slice()).expect("decode"), 11);
        let other = addr("person", RecordId::text("b"));
        assert!(decode_patch_at(&other, late.as_slice()).is_err());
    }
}
