//! Parsed CREATE statements and the request builders adapters use to make them.

use crate::catalog::types::{RecordId, Value};
use serde::{Deserialize, Serialize};

/// What a statement writes into each document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Data {
    #[default]
    Empty,
    /// `SET a = 1, b.c = 2`; paths are dotted.
    Set(Vec<(String, Value)>),
    /// `CONTENT {..}`; replaces the whole document.
    Content(Value),
    /// `MERGE {..}`; deep merge, null removes a field.
    Merge(Value),
}

/// Which snapshot a document yields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Echo {
    None,
    Before,
    #[default]
    After,
    /// The patch operations as an array of `{op, path, value}` objects.
    Diff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    SingleRecord { table: String, id: RecordId },
    /// Resolves to one freshly generated id per invocation.
    WholeTable { table: String },
    Batch { table: String, ids: Vec<RecordId> },
    /// A parsed target that names no record. Skipped by the executor.
    Expression(Value),
}

impl Target {
    pub fn table(&self) -> Option<&str> {
        match self {
            Target::SingleRecord { table, .. }
            | Target::WholeTable { table }
            | Target::Batch { table, .. } => Some(table),
            Target::Expression(_) => None,
        }
    }

    /// Addresses this target resolves to.
    pub fn resolved_len(&self) -> usize {
        match self {
            Target::SingleRecord { .. } | Target::WholeTable { .. } => 1,
            Target::Batch { ids, .. } => ids.len(),
            Target::Expression(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStatement {
    pub tenant: String,
    pub namespace: String,
    pub database: String,
    pub what: Vec<Target>,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub echo: Echo,
}

impl CreateStatement {
    pub fn new(
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            database: database.into(),
            what: Vec::new(),
            data: Data::Empty,
            echo: Echo::default(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.what.push(target);
        self
    }

    pub fn data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    pub fn echo(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        let assignment = (path.into(), value.into());
        match &mut self.data {
            Data::Set(assignments) => assignments.push(assignment),
            other => *other = Data::Set(vec![assignment]),
        }
        self
    }
}

/// RPC-style `create(class, thing, data)`.
///
/// With no thing the whole table is targeted; a list of ids becomes a batch and
/// a single id one record. The resulting statement echoes the post-state.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    class: String,
    ids: Option<Vec<RecordId>>,
    single: bool,
    content: Option<Value>,
}

impl CreateRequest {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ids: None,
            single: false,
            content: None,
        }
    }

    pub fn thing(mut self, id: impl Into<RecordId>) -> Self {
        self.ids = Some(vec![id.into()]);
        self.single = true;
        self
    }

    pub fn batch(mut self, ids: impl IntoIterator<Item = RecordId>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self.single = false;
        self
    }

    pub fn content(mut self, content: impl Into<Value>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn into_statement(
        self,
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> CreateStatement {
        let target = match self.ids {
            None => Target::WholeTable { table: self.class },
            Some(mut ids) if self.single && ids.len() == 1 => Target::SingleRecord {
                table: self.class,
                id: ids.remove(0),
            },
            Some(ids) => Target::Batch {
                table: self.class,
                ids,
            },
        };
        let data = match self.content {
            Some(content) => Data::Content(content),
            None => Data::Empty,
        };
        CreateStatement::new(tenant, namespace, database)
            .target(target)
            .data(data)
            .echo(Echo::After)
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateRequest, CreateStatement, Data, Echo, Target};
    use crate::catalog::types::{RecordId, Value};

    #[test]
    fn request_without_thing_targets_the_whole_table() {
        let stmt = CreateRequest::new("person").into_statement("acme", "app", "main");
        assert_eq!(
            stmt.what,
            vec![Target::WholeTable {
                table: "person".into()
            }]
        );
        assert_eq!(stmt.echo, Echo::After);
        assert_eq!(stmt.data, Data::Empty);
    }

    #[test]
    fn request_thing_and_batch_shapes() {
        let single = CreateRequest::new("person")
            .thing("tobie")
            .content(Value::object())
            .into_statement("acme", "app", "main");
        assert_eq!(
            single.what,
            vec![Target::SingleRecord {
                table: "person".into(),
                id: RecordId::text("tobie")
            }]
        );
        assert_eq!(single.data, Data::Content(Value::object()));

        let batch = CreateRequest::new("person")
            .batch([RecordId::from(1_i64), RecordId::from(2_i64)])
            .into_statement("acme", "app", "main");
        assert_eq!(batch.what[0].resolved_len(), 2);
        assert_eq!(batch.what[0].table(), Some("person"));
    }

    #[test]
    fn set_accumulates_assignments() {
        let stmt = CreateStatement::new("acme", "app", "main")
            .set("name", "Ann")
            .set("age", 41_i64);
        assert_eq!(
            stmt.data,
            Data::Set(vec![
                ("name".into(), Value::from("Ann")),
                ("age".into(), Value::from(41_i64)),
            ])
        );
    }
}
