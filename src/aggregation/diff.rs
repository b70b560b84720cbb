use std::collections::BTreeSet;

use crate::models::VoteState;

/// What changed for one election between a trigger's before- and after-image.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionDelta {
    pub election_id: String,
    pub vote_before: Option<String>,
    pub vote_after: Option<String>,
    pub added_dislikes: BTreeSet<String>,
    pub removed_dislikes: BTreeSet<String>,
}

impl ElectionDelta {
    pub fn vote_changed(&self) -> bool {
        self.vote_before != self.vote_after
    }

    pub fn is_empty(&self) -> bool {
        !self.vote_changed() && self.added_dislikes.is_empty() && self.removed_dislikes.is_empty()
    }
}

/// Diff two vote-state images into one delta per affected election.
///
/// Elections whose choice and dislike set are identical on both sides are
/// skipped entirely: no read, no write, no log noise. This is also what makes
/// at-least-once trigger redelivery safe — an identical (before, after) pair
/// produces no deltas.
pub fn compute_deltas(before: Option<&VoteState>, after: Option<&VoteState>) -> Vec<ElectionDelta> {
    let empty = BTreeSet::new();

    // Union of election ids present in either image, in stable order
    let mut election_ids = BTreeSet::new();
    for state in [before, after].into_iter().flatten() {
        election_ids.extend(state.elections.keys().cloned());
    }

    let mut deltas = Vec::new();
    for election_id in election_ids {
        let before_choice = before.and_then(|s| s.elections.get(&election_id));
        let after_choice = after.and_then(|s| s.elections.get(&election_id));

        let vote_before = before_choice.and_then(|c| c.candidate_id.clone());
        let vote_after = after_choice.and_then(|c| c.candidate_id.clone());
        let before_dislikes = before_choice.map_or(&empty, |c| &c.disliked_candidates);
        let after_dislikes = after_choice.map_or(&empty, |c| &c.disliked_candidates);

        let delta = ElectionDelta {
            election_id,
            vote_before,
            vote_after,
            added_dislikes: after_dislikes.difference(before_dislikes).cloned().collect(),
            removed_dislikes: before_dislikes.difference(after_dislikes).cloned().collect(),
        };
        if !delta.is_empty() {
            deltas.push(delta);
        }
    }
    deltas
}
