use crate::permission::Rule;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TablePermissions {
    /// Applied to scope and anonymous callers; higher levels bypass it.
    #[serde(default)]
    pub create: Rule,
}

impl TablePermissions {
    pub fn full() -> Self {
        Self { create: Rule::Full }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    /// Dotted field paths, in key order.
    pub fields: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDef {
    pub tenant: String,
    pub namespace: String,
    pub database: String,
    pub table_name: String,
    #[serde(default)]
    pub permissions: TablePermissions,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}
