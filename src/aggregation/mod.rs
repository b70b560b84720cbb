pub mod diff;
pub mod tally;

pub use self::diff::{compute_deltas, ElectionDelta};

use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::db::Database;
use crate::error::StoreError;
use crate::handlers::VoteStateChange;
use crate::models::ElectionResult;
use crate::registry::CandidateRegistry;
use self::tally::Tally;

// CAS attempts per election before giving up on this delivery
const MAX_WRITE_ATTEMPTS: u32 = 5;

const RESULT_FEED_CAPACITY: usize = 64;

/// The aggregation engine. Reacts to each vote-state write with its before-
/// and after-image, diffs the affected elections, and rewrites each affected
/// election's result document in its own compare-and-swap loop.
///
/// Result documents are the engine's exclusive write territory; committed
/// snapshots are also published on a broadcast feed for live subscribers.
pub struct Aggregator {
    db: Arc<Database>,
    registry: Arc<dyn CandidateRegistry>,
    results_tx: broadcast::Sender<ElectionResult>,
}

impl Aggregator {
    pub fn new(db: Arc<Database>, registry: Arc<dyn CandidateRegistry>) -> Self {
        let (results_tx, _) = broadcast::channel(RESULT_FEED_CAPACITY);
        Self {
            db,
            registry,
            results_tx,
        }
    }

    /// Live feed of committed result snapshots.
    pub fn subscribe_results(&self) -> broadcast::Receiver<ElectionResult> {
        self.results_tx.subscribe()
    }

    /// Process one vote-state write. Each affected election is updated
    /// independently: a failure is logged with its election id and delta,
    /// and the remaining elections are still processed. Returns the number
    /// of elections whose result was rewritten.
    pub async fn process_change(&self, change: &VoteStateChange) -> usize {
        let deltas = compute_deltas(change.before.as_ref(), change.after.as_ref());
        if deltas.is_empty() {
            debug!("vote state write for {} affected no elections", change.user_id);
            return 0;
        }

        let mut updated = 0;
        for delta in &deltas {
            match self.apply_to_election(delta).await {
                Ok(result) => {
                    info!(
                        "updated result for election {}: {} votes, {} dislike marks",
                        result.election_id, result.total_votes, result.total_dislike_marks
                    );
                    // Nobody listening is fine
                    let _ = self.results_tx.send(result);
                    updated += 1;
                }
                Err(e) => {
                    error!(
                        "failed to update result for election {}: {} (delta: {:?})",
                        delta.election_id, e, delta
                    );
                }
            }
        }
        updated
    }

    /// One election's transactional update: read the last snapshot (or start
    /// from zero), apply the delta, zero-fill from the roster, recompute
    /// percentages, and write the full snapshot back under compare-and-swap.
    async fn apply_to_election(&self, delta: &ElectionDelta) -> Result<ElectionResult, StoreError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let (current, version) = self.db.load_election_result(&delta.election_id).await?;
            let current =
                current.unwrap_or_else(|| ElectionResult::empty(&delta.election_id, Utc::now()));

            let mut tally = Tally::from_result(&current);
            tally.apply(delta);

            let roster = self.fetch_roster(&delta.election_id).await;
            let result = tally.into_result(&delta.election_id, &roster, Utc::now());

            if self.db.store_election_result(&result, version).await? {
                return Ok(result);
            }
            // Another user's update landed first; reload and reapply
        }
        Err(StoreError::ConflictExhausted(MAX_WRITE_ATTEMPTS))
    }

    /// Roster failures degrade zero-fill instead of aborting the update: the
    /// snapshot is still written with the candidate ids the counters know.
    async fn fetch_roster(&self, election_id: &str) -> BTreeSet<String> {
        match self.registry.list_candidate_ids(election_id).await {
            Ok(roster) => roster,
            Err(e) => {
                warn!(
                    "roster lookup failed for election {}: {}; writing partial zero-fill",
                    election_id, e
                );
                BTreeSet::new()
            }
        }
    }
}
