use chrono::Utc;
use log::warn;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::aggregation::Aggregator;
use crate::db::Database;
use crate::error::StoreError;
use crate::handlers::{VoteService, VoteStateChange};
use crate::models::{CandidateResult, ElectionResult};
use crate::registry::CandidateRegistry;

/// Client-facing read side: current results on demand and live feeds of
/// result and own-vote-state updates. Carries no write path for result
/// documents — those belong to the aggregation engine alone.
pub struct ResultReader {
    db: Arc<Database>,
    registry: Arc<dyn CandidateRegistry>,
    aggregator: Arc<Aggregator>,
    vote_service: Arc<VoteService>,
}

impl ResultReader {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<dyn CandidateRegistry>,
        aggregator: Arc<Aggregator>,
        vote_service: Arc<VoteService>,
    ) -> Self {
        Self {
            db,
            registry,
            aggregator,
            vote_service,
        }
    }

    /// Current result for an election. When no aggregate exists yet a
    /// zero-valued record is synthesized (zero-filled from the roster where
    /// available) so callers never handle a missing document.
    pub async fn get_result(&self, election_id: &str) -> Result<ElectionResult, StoreError> {
        let (stored, _) = self.db.load_election_result(election_id).await?;
        if let Some(result) = stored {
            return Ok(result);
        }

        let mut result = ElectionResult::empty(election_id, Utc::now());
        match self.registry.list_candidate_ids(election_id).await {
            Ok(roster) => {
                for candidate_id in roster {
                    result.candidates.insert(candidate_id, CandidateResult::zero());
                }
            }
            Err(e) => {
                warn!(
                    "roster lookup failed for election {}: {}; synthesizing bare result",
                    election_id, e
                );
            }
        }
        Ok(result)
    }

    /// Live feed of committed result snapshots; clients filter to the
    /// elections they render.
    pub fn subscribe_results(&self) -> broadcast::Receiver<ElectionResult> {
        self.aggregator.subscribe_results()
    }

    /// Live feed of committed vote-state writes; clients filter to their own
    /// `user_id` to track their record across tabs.
    pub fn subscribe_vote_states(&self) -> broadcast::Receiver<VoteStateChange> {
        self.vote_service.subscribe_vote_states()
    }
}
