use crate::storage::kv::KvError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    Index,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Table => write!(f, "table"),
            ResourceType::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvdocErrorCode {
    MalformedKey,
    MergeError,
    IndexViolation,
    Conflict,
    Substrate,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    TableAlreadyExists,
    IndexAlreadyExists,
    TableNotFound,
    IndexNotFound,
}

impl KvdocErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            KvdocErrorCode::MalformedKey => "malformed_key",
            KvdocErrorCode::MergeError => "merge_error",
            KvdocErrorCode::IndexViolation => "index_violation",
            KvdocErrorCode::Conflict => "conflict",
            KvdocErrorCode::Substrate => "substrate",
            KvdocErrorCode::Encode => "encode",
            KvdocErrorCode::Decode => "decode",
            KvdocErrorCode::Validation => "validation",
            KvdocErrorCode::InvalidConfig => "invalid_config",
            KvdocErrorCode::TableAlreadyExists => "table_already_exists",
            KvdocErrorCode::IndexAlreadyExists => "index_already_exists",
            KvdocErrorCode::TableNotFound => "table_not_found",
            KvdocErrorCode::IndexNotFound => "index_not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum KvdocError {
    #[error("malformed key: {message}")]
    MalformedKey { message: String },
    #[error("merge error: {0}")]
    Merge(String),
    #[error("unique index '{index}' on table '{table}' already contains {key}")]
    Index {
        table: String,
        index: String,
        key: String,
    },
    #[error("record {address} already exists")]
    Conflict { address: String },
    #[error("substrate error: {0}")]
    Substrate(#[from] KvError),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
}

impl KvdocError {
    pub(crate) fn malformed_key(message: impl Into<String>) -> Self {
        KvdocError::MalformedKey {
            message: message.into(),
        }
    }

    pub fn code(&self) -> KvdocErrorCode {
        match self {
            KvdocError::MalformedKey { .. } => KvdocErrorCode::MalformedKey,
            KvdocError::Merge(_) => KvdocErrorCode::MergeError,
            KvdocError::Index { .. } => KvdocErrorCode::IndexViolation,
            KvdocError::Conflict { .. } => KvdocErrorCode::Conflict,
            KvdocError::Substrate(_) => KvdocErrorCode::Substrate,
            KvdocError::Encode(_) => KvdocErrorCode::Encode,
            KvdocError::Decode(_) => KvdocErrorCode::Decode,
            KvdocError::Validation(_) => KvdocErrorCode::Validation,
            KvdocError::InvalidConfig { .. } => KvdocErrorCode::InvalidConfig,
            KvdocError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Table => KvdocErrorCode::TableAlreadyExists,
                ResourceType::Index => KvdocErrorCode::IndexAlreadyExists,
            },
            KvdocError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Table => KvdocErrorCode::TableNotFound,
                ResourceType::Index => KvdocErrorCode::IndexNotFound,
            },
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

impl From<rmp_serde::encode::Error> for KvdocError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        KvdocError::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for KvdocError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        KvdocError::Decode(err.to_string())
    }
}
