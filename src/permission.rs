use crate::catalog::types::Value;
use serde::{Deserialize, Serialize};

/// Authentication level of a session.
///
/// Every level below `Root` is bound to one tenant. Semantics are strict:
/// - `Root` reaches every tenant, namespace and database.
/// - `Namespace` reaches every database of that namespace in its tenant.
/// - `Database` reaches one database of its tenant.
/// - `Scope` users belong to one database and are subject to table rules.
/// - `Anonymous` callers are subject to table rules everywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuthLevel {
    Root,
    Namespace {
        tenant: String,
        namespace: String,
    },
    Database {
        tenant: String,
        namespace: String,
        database: String,
    },
    Scope {
        tenant: String,
        namespace: String,
        database: String,
        scope: String,
    },
    Anonymous,
}

/// How much of the table rule set applies to a caller for one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Level grants the action outright.
    Full,
    /// Table rules decide.
    Rules,
    /// Caller belongs to another tenant, namespace or database.
    Outside,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerContext {
    pub caller_id: String,
    pub level: AuthLevel,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>, level: AuthLevel) -> Self {
        Self {
            caller_id: caller_id.into(),
            level,
        }
    }

    pub fn root() -> Self {
        Self::new("root", AuthLevel::Root)
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", AuthLevel::Anonymous)
    }

    pub fn scope(
        caller_id: impl Into<String>,
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::new(
            caller_id,
            AuthLevel::Scope {
                tenant: tenant.into(),
                namespace: namespace.into(),
                database: database.into(),
                scope: scope.into(),
            },
        )
    }

    pub fn authority(&self, tenant: &str, namespace: &str, database: &str) -> Authority {
        match &self.level {
            AuthLevel::Root => Authority::Full,
            AuthLevel::Namespace {
                tenant: tn,
                namespace: ns,
            } if tn == tenant && ns == namespace => Authority::Full,
            AuthLevel::Database {
                tenant: tn,
                namespace: ns,
                database: db,
            } if tn == tenant && ns == namespace && db == database => Authority::Full,
            AuthLevel::Scope {
                tenant: tn,
                namespace: ns,
                database: db,
                ..
            } if tn == tenant && ns == namespace && db == database => Authority::Rules,
            AuthLevel::Anonymous => Authority::Rules,
            _ => Authority::Outside,
        }
    }
}

/// Table-level access rule for one action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Rule {
    Full,
    #[default]
    None,
    Where(Predicate),
}

/// Predicate evaluated against the candidate document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Predicate {
    FieldEquals { field: String, value: Value },
    FieldExists { field: String },
    /// Field holds the caller's id as text.
    FieldIsCaller { field: String },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Rule {
    pub fn allows(&self, caller: &CallerContext, doc: &Value) -> bool {
        match self {
            Rule::Full => true,
            Rule::None => false,
            Rule::Where(predicate) => predicate.eval(caller, doc),
        }
    }
}

impl Predicate {
    pub fn eval(&self, caller: &CallerContext, doc: &Value) -> bool {
        match self {
            Predicate::FieldEquals { field, value } => doc.get_path(field) == Some(value),
            Predicate::FieldExists { field } => doc.get_path(field).is_some_and(|v| !v.is_null()),
            Predicate::FieldIsCaller { field } => doc
                .get_path(field)
                .and_then(Value::as_str)
                .is_some_and(|id| id == caller.caller_id),
            Predicate::All(items) => items.iter().all(|p| p.eval(caller, doc)),
            Predicate::Any(items) => items.iter().any(|p| p.eval(caller, doc)),
            Predicate::Not(inner) => !inner.eval(caller, doc),
        }
    }
}
