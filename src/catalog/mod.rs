pub mod schema;
pub mod types;

use crate::catalog::schema::{IndexDef, TableDef, TablePermissions};
use crate::error::{KvdocError, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `(tenant, namespace, database, table)`.
pub type TableRef = (String, String, String, String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DdlOperation {
    DefineTable {
        tenant: String,
        namespace: String,
        database: String,
        table_name: String,
        permissions: TablePermissions,
        if_not_exists: bool,
    },
    DefineIndex {
        tenant: String,
        namespace: String,
        database: String,
        table_name: String,
        index_name: String,
        fields: Vec<String>,
        unique: bool,
        if_not_exists: bool,
    },
    AlterTablePermissions {
        tenant: String,
        namespace: String,
        database: String,
        table_name: String,
        permissions: TablePermissions,
    },
    RemoveIndex {
        tenant: String,
        namespace: String,
        database: String,
        table_name: String,
        index_name: String,
    },
}

/// Table definitions consulted by the document pipeline.
///
/// Tables are schemaless: a CREATE against an undefined table behaves like a
/// table with default permissions and no indexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub tables: HashMap<TableRef, TableDef>,
}

pub fn table_key(tenant: &str, namespace: &str, database: &str, table_name: &str) -> TableRef {
    (
        tenant.to_string(),
        namespace.to_string(),
        database.to_string(),
        table_name.to_string(),
    )
}

impl Catalog {
    pub fn table(
        &self,
        tenant: &str,
        namespace: &str,
        database: &str,
        table_name: &str,
    ) -> Option<&TableDef> {
        self.tables.get(&table_key(tenant, namespace, database, table_name))
    }

    pub fn apply_ddl(&mut self, op: DdlOperation) -> Result<(), KvdocError> {
        match op {
            DdlOperation::DefineTable {
                tenant,
                namespace,
                database,
                table_name,
                permissions,
                if_not_exists,
            } => {
                let key = table_key(&tenant, &namespace, &database, &table_name);
                if self.tables.contains_key(&key) {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(KvdocError::AlreadyExists {
                        resource_type: ResourceType::Table,
                        resource_id: format!("{tenant}/{namespace}.{database}.{table_name}"),
                    });
                }
                validate_name("table", &table_name)?;
                self.tables.insert(
                    key,
                    TableDef {
                        tenant,
                        namespace,
                        database,
                        table_name,
                        permissions,
                        indexes: Vec::new(),
                    },
                );
                Ok(())
            }
            DdlOperation::DefineIndex {
                tenant,
                namespace,
                database,
                table_name,
                index_name,
                fields,
                unique,
                if_not_exists,
            } => {
                validate_name("index", &index_name)?;
                if fields.is_empty() {
                    return Err(KvdocError::Validation(format!(
                        "index {index_name} must cover at least one field"
                    )));
                }
                let key = table_key(&tenant, &namespace, &database, &table_name);
                let table = self.tables.entry(key).or_insert_with(|| TableDef {
                    tenant: tenant.clone(),
                    namespace: namespace.clone(),
                    database: database.clone(),
                    table_name: table_name.clone(),
                    permissions: TablePermissions::default(),
                    indexes: Vec::new(),
                });
                if table.index(&index_name).is_some() {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(KvdocError::AlreadyExists {
                        resource_type: ResourceType::Index,
                        resource_id: format!("{table_name}.{index_name}"),
                    });
                }
                table.indexes.push(IndexDef {
                    name: index_name,
                    fields,
                    unique,
                });
                Ok(())
            }
            DdlOperation::AlterTablePermissions {
                tenant,
                namespace,
                database,
                table_name,
                permissions,
            } => {
                let table = self
                    .tables
                    .get_mut(&table_key(&tenant, &namespace, &database, &table_name))
                    .ok_or_else(|| KvdocError::NotFound {
                        resource_type: ResourceType::Table,
                        resource_id: format!("{tenant}/{namespace}.{database}.{table_name}"),
                    })?;
                table.permissions = permissions;
                Ok(())
            }
            DdlOperation::RemoveIndex {
                tenant,
                namespace,
                database,
                table_name,
                index_name,
            } => {
                let table = self
                    .tables
                    .get_mut(&table_key(&tenant, &namespace, &database, &table_name))
                    .ok_or_else(|| KvdocError::NotFound {
                        resource_type: ResourceType::Table,
                        resource_id: format!("{tenant}/{namespace}.{database}.{table_name}"),
                    })?;
                let before = table.indexes.len();
                table.indexes.retain(|idx| idx.name != index_name);
                if table.indexes.len() == before {
                    return Err(KvdocError::NotFound {
                        resource_type: ResourceType::Index,
                        resource_id: format!("{table_name}.{index_name}"),
                    });
                }
                Ok(())
            }
        }
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), KvdocError> {
    if name.is_empty() {
        return Err(KvdocError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Catalog, DdlOperation};
    use crate::catalog::schema::TablePermissions;
    use crate::error::KvdocErrorCode;

    fn define_index(name: &str, if_not_exists: bool) -> DdlOperation {
        DdlOperation::DefineIndex {
            tenant: "acme".into(),
            namespace: "app".into(),
            database: "main".into(),
            table_name: "person".into(),
            index_name: name.into(),
            fields: vec!["email".into()],
            unique: true,
            if_not_exists,
        }
    }

    #[test]
    fn define_index_creates_implicit_table() {
        let mut catalog = Catalog::default();
        catalog.apply_ddl(define_index("by_email", false)).expect("index");
        let table = catalog.table("acme", "app", "main", "person").expect("table");
        assert_eq!(table.permissions, TablePermissions::default());
        assert!(table.index("by_email").is_some_and(|idx| idx.unique));
    }

    #[test]
    fn duplicate_index_is_rejected_unless_if_not_exists() {
        let mut catalog = Catalog::default();
        catalog.apply_ddl(define_index("by_email", false)).expect("index");
        let err = catalog
            .apply_ddl(define_index("by_email", false))
            .expect_err("duplicate");
        assert_eq!(err.code(), KvdocErrorCode::IndexAlreadyExists);
        catalog
            .apply_ddl(define_index("by_email", true))
            .expect("if not exists");
    }

    #[test]
    fn redefining_table_requires_alter() {
        let mut catalog = Catalog::default();
        let define = |if_not_exists| DdlOperation::DefineTable {
            tenant: "acme".into(),
            namespace: "app".into(),
            database: "main".into(),
            table_name: "person".into(),
            permissions: TablePermissions::default(),
            if_not_exists,
        };
        catalog.apply_ddl(define(false)).expect("define");
        let err = catalog.apply_ddl(define(false)).expect_err("redefine");
        assert_eq!(err.code(), KvdocErrorCode::TableAlreadyExists);
        catalog.apply_ddl(define(true)).expect("if not exists");

        catalog
            .apply_ddl(DdlOperation::AlterTablePermissions {
                tenant: "acme".into(),
            namespace: "app".into(),
                database: "main".into(),
                table_name: "person".into(),
                permissions: TablePermissions::full(),
            })
            .expect("alter");
        assert_eq!(
            catalog.table("acme", "app", "main", "person").map(|t| &t.permissions),
            Some(&TablePermissions::full())
        );
    }

    #[test]
    fn tenants_keep_separate_definitions_of_one_table_name() {
        let mut catalog = Catalog::default();
        catalog.apply_ddl(define_index("by_email", false)).expect("acme index");
        catalog
            .apply_ddl(DdlOperation::DefineTable {
                tenant: "globex".into(),
                namespace: "app".into(),
                database: "main".into(),
                table_name: "person".into(),
                permissions: TablePermissions::full(),
                if_not_exists: false,
            })
            .expect("globex table");

        let acme = catalog.table("acme", "app", "main", "person").expect("acme");
        let globex = catalog.table("globex", "app", "main", "person").expect("globex");
        assert_eq!(acme.permissions, TablePermissions::default());
        assert_eq!(globex.permissions, TablePermissions::full());
        assert!(globex.indexes.is_empty());
        assert_eq!(catalog.tables.len(), 2);
    }

    #[test]
    fn remove_missing_index_reports_not_found() {
        let mut catalog = Catalog::default();
        catalog.apply_ddl(define_index("by_email", false)).expect("index");
        let err = catalog
            .apply_ddl(DdlOperation::RemoveIndex {
                tenant: "acme".into(),
            namespace: "app".into(),
                database: "main".into(),
                table_name: "person".into(),
                index_name: "by_name".into(),
            })
            .expect_err("missing");
        assert_eq!(err.code(), KvdocErrorCode::IndexNotFound);
    }
}
