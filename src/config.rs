use crate::error::KvdocError;

/// Runtime configuration for a kvdoc instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvdocConfig {
    /// Upper bound on any encoded record, index or patch key.
    pub max_key_bytes: usize,
    /// Upper bound on one encoded record value.
    pub max_value_bytes: usize,
    /// Upper bound on resolved targets in one statement (batches count per element).
    pub max_targets_per_statement: usize,
    /// Write a patch record for every persisted document.
    pub change_tracking: bool,
    /// Enforce table access rules for scope and anonymous callers.
    pub enforce_permissions: bool,
}

impl Default for KvdocConfig {
    fn default() -> Self {
        Self {
            max_key_bytes: 1024,
            max_value_bytes: 1024 * 1024,
            max_targets_per_statement: 10_000,
            change_tracking: true,
            enforce_permissions: true,
        }
    }
}

impl KvdocConfig {
    /// Local profile: no change records, no permission checks.
    pub fn development() -> Self {
        Self {
            change_tracking: false,
            enforce_permissions: false,
            ..Self::default()
        }
    }

    /// Tight limits for multi-tenant deployments.
    pub fn strict() -> Self {
        Self {
            max_key_bytes: 512,
            max_value_bytes: 256 * 1024,
            max_targets_per_statement: 1_000,
            change_tracking: true,
            enforce_permissions: true,
        }
    }

    pub fn validate(&self) -> Result<(), KvdocError> {
        if self.max_key_bytes == 0 {
            return Err(KvdocError::InvalidConfig {
                message: "max_key_bytes must be > 0".into(),
            });
        }
        if self.max_value_bytes == 0 {
            return Err(KvdocError::InvalidConfig {
                message: "max_value_bytes must be > 0".into(),
            });
        }
        if self.max_targets_per_statement == 0 {
            return Err(KvdocError::InvalidConfig {
                message: "max_targets_per_statement must be > 0".into(),
            });
        }
        Ok(())
    }
}
