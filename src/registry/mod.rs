use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::Database;
use crate::error::RegistryError;

/// Read-only roster lookup injected into the aggregation engine. Abstracted
/// behind a trait so the engine can run against a fake provider in tests and
/// so roster failures stay non-fatal at the call site.
#[async_trait]
pub trait CandidateRegistry: Send + Sync {
    /// Ids of every candidate currently registered for the election. May be
    /// briefly stale right after candidate creation.
    async fn list_candidate_ids(&self, election_id: &str) -> Result<BTreeSet<String>, RegistryError>;
}

/// Roster lookup backed by the candidates table.
pub struct DbCandidateRegistry {
    db: Arc<Database>,
}

impl DbCandidateRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CandidateRegistry for DbCandidateRegistry {
    async fn list_candidate_ids(&self, election_id: &str) -> Result<BTreeSet<String>, RegistryError> {
        self.db
            .list_candidate_ids(election_id)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }
}
