use chrono::Utc;
use log::debug;

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{ElectionChoice, VoteState};

// Reload-and-retry budget for a lost compare-and-swap race on the user's own
// record (their other tabs racing vote-submit against dislike-toggle)
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Before- and after-image of one committed vote-state write. This is the
/// trigger payload the aggregation engine consumes; delivery is at-least-once
/// and the engine's diff makes redelivery a no-op.
#[derive(Debug, Clone)]
pub struct VoteStateChange {
    pub user_id: String,
    pub before: Option<VoteState>,
    pub after: Option<VoteState>,
}

/// Register (or replace) the user's vote in an election. Voting for a
/// candidate clears any dislike mark the user had on that same candidate.
pub async fn submit_vote(
    db: &Database,
    user_id: &str,
    election_id: &str,
    candidate_id: &str,
) -> Result<Option<VoteStateChange>, StoreError> {
    mutate_vote_state(db, user_id, |state| {
        let now = Utc::now();
        let entry = state
            .elections
            .entry(election_id.to_string())
            .or_insert_with(|| ElectionChoice::new(now));
        entry.candidate_id = Some(candidate_id.to_string());
        entry.disliked_candidates.remove(candidate_id);
        entry.updated_at = now;
        true
    })
    .await
}

/// Withdraw the user's vote in an election. Dislike marks survive the
/// cancellation; an entry left with neither pick nor dislikes is dropped.
pub async fn cancel_vote(
    db: &Database,
    user_id: &str,
    election_id: &str,
) -> Result<Option<VoteStateChange>, StoreError> {
    mutate_vote_state(db, user_id, |state| {
        let Some(entry) = state.elections.get_mut(election_id) else {
            return false;
        };
        if entry.candidate_id.is_none() {
            return false;
        }
        entry.candidate_id = None;
        entry.updated_at = Utc::now();
        if entry.is_empty() {
            state.elections.remove(election_id);
        }
        true
    })
    .await
}

/// Flip the user's dislike mark on a candidate. Disliking the user's own
/// current pick is rejected as a no-op; clearing the last dislike of an
/// otherwise empty entry drops the entry.
pub async fn toggle_dislike(
    db: &Database,
    user_id: &str,
    election_id: &str,
    candidate_id: &str,
) -> Result<Option<VoteStateChange>, StoreError> {
    mutate_vote_state(db, user_id, |state| {
        let now = Utc::now();
        let entry = state
            .elections
            .entry(election_id.to_string())
            .or_insert_with(|| ElectionChoice::new(now));
        if entry.candidate_id.as_deref() == Some(candidate_id) {
            debug!(
                "user {} tried to dislike their current pick {} in election {}",
                state.user_id, candidate_id, election_id
            );
            return false;
        }
        if !entry.disliked_candidates.remove(candidate_id) {
            entry.disliked_candidates.insert(candidate_id.to_string());
        }
        entry.updated_at = now;
        if entry.is_empty() {
            state.elections.remove(election_id);
        }
        true
    })
    .await
}

/// Read-modify-write loop over the acting user's own vote-state document.
/// The closure edits the state in place and reports whether anything must be
/// written; `Ok(None)` means the mutation was a no-op (nothing committed, no
/// trigger produced). A lost compare-and-swap race reloads and reapplies.
async fn mutate_vote_state<F>(
    db: &Database,
    user_id: &str,
    mut edit: F,
) -> Result<Option<VoteStateChange>, StoreError>
where
    F: FnMut(&mut VoteState) -> bool,
{
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let (before, version) = db.load_vote_state(user_id).await?;
        let mut after = before
            .clone()
            .unwrap_or_else(|| VoteState::new(user_id));

        if !edit(&mut after) {
            return Ok(None);
        }

        if db.store_vote_state(&after, version).await? {
            return Ok(Some(VoteStateChange {
                user_id: user_id.to_string(),
                before,
                after: Some(after),
            }));
        }
        // Concurrent write from the same user's other session; retry
    }
    Err(StoreError::ConflictExhausted(MAX_WRITE_ATTEMPTS))
}
