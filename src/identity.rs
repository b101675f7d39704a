use crate::catalog::types::RecordId;
use uuid::Uuid;

/// Generates record ids for table-wide CREATE targets.
///
/// An id is `UUIDv5(namespace = fresh UUIDv4, name = tenant)`. Uniqueness
/// rests on the v4 randomness; the v5 step makes an id reproducible from its
/// seed, which [`IdentityGenerator::derive`] exposes for tests. Collisions are
/// not checked here: creating over an existing key fails in the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGenerator;

impl IdentityGenerator {
    pub fn new_identity(&self, tenant: &str) -> RecordId {
        Self::derive(Uuid::new_v4(), tenant)
    }

    pub fn derive(seed: Uuid, tenant: &str) -> RecordId {
        let id = Uuid::new_v5(&seed, tenant.as_bytes());
        RecordId::text(id.hyphenated().to_string())
    }
}
