use chrono::{DateTime, Utc};
use log::warn;
use std::collections::{BTreeSet, HashMap};

use crate::aggregation::diff::ElectionDelta;
use crate::models::{CandidateResult, ElectionResult};

/// Working counters for one election, reconstructed from the last stored
/// aggregate. The engine trusts its own previous snapshot as ground truth
/// and applies a delta on top; it never rescans every user's vote state.
#[derive(Debug, Default)]
pub struct Tally {
    total_votes: u32,
    total_dislike_marks: u32,
    votes: HashMap<String, u32>,
    dislikes: HashMap<String, u32>,
}

impl Tally {
    pub fn from_result(result: &ElectionResult) -> Self {
        let mut tally = Tally {
            total_votes: result.total_votes,
            total_dislike_marks: result.total_dislike_marks,
            ..Default::default()
        };
        for (candidate_id, candidate) in &result.candidates {
            if candidate.count > 0 {
                tally.votes.insert(candidate_id.clone(), candidate.count);
            }
            if let Some(dislike_count) = candidate.dislike_count {
                if dislike_count > 0 {
                    tally.dislikes.insert(candidate_id.clone(), dislike_count);
                }
            }
        }
        tally
    }

    /// Apply one election's delta. Counters are clamped at zero: a would-be
    /// negative count means upstream data drift, which is logged and floored
    /// rather than propagated.
    pub fn apply(&mut self, delta: &ElectionDelta) {
        if delta.vote_changed() {
            if let Some(previous) = &delta.vote_before {
                decrement(&mut self.votes, previous, &delta.election_id, "vote count");
            }
            if let Some(current) = &delta.vote_after {
                *self.votes.entry(current.clone()).or_insert(0) += 1;
            }
            match (&delta.vote_before, &delta.vote_after) {
                // Switching candidates leaves the total unchanged
                (Some(_), Some(_)) => {}
                (None, Some(_)) => self.total_votes += 1,
                (Some(_), None) => {
                    if self.total_votes == 0 {
                        warn!(
                            "total votes already 0 for election {} while cancelling, clamping",
                            delta.election_id
                        );
                    }
                    self.total_votes = self.total_votes.saturating_sub(1);
                }
                (None, None) => {}
            }
        }

        for candidate in &delta.added_dislikes {
            *self.dislikes.entry(candidate.clone()).or_insert(0) += 1;
            self.total_dislike_marks += 1;
        }
        for candidate in &delta.removed_dislikes {
            decrement(&mut self.dislikes, candidate, &delta.election_id, "dislike count");
            if self.total_dislike_marks == 0 {
                warn!(
                    "total dislike marks already 0 for election {}, clamping",
                    delta.election_id
                );
            }
            self.total_dislike_marks = self.total_dislike_marks.saturating_sub(1);
        }
    }

    /// Render the counters back into a complete result snapshot: zero-fill
    /// every rostered candidate, then recompute all percentages from the
    /// final totals of this same pass.
    pub fn into_result(
        self,
        election_id: &str,
        roster: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> ElectionResult {
        let mut candidates: HashMap<String, CandidateResult> = HashMap::new();

        for id in self.votes.keys().chain(self.dislikes.keys()).chain(roster) {
            candidates
                .entry(id.clone())
                .or_insert_with(CandidateResult::zero);
        }

        for (id, candidate) in candidates.iter_mut() {
            let count = self.votes.get(id).copied().unwrap_or(0);
            candidate.count = count;
            candidate.percentage = share(count, self.total_votes);
            let dislike_count = self.dislikes.get(id).copied().unwrap_or(0);
            if dislike_count > 0 {
                candidate.dislike_count = Some(dislike_count);
                candidate.dislike_percentage = Some(share(dislike_count, self.total_dislike_marks));
            }
        }

        ElectionResult {
            election_id: election_id.to_string(),
            total_votes: self.total_votes,
            total_dislike_marks: self.total_dislike_marks,
            candidates,
            last_updated: now,
        }
    }
}

fn decrement(counts: &mut HashMap<String, u32>, candidate: &str, election_id: &str, what: &str) {
    match counts.get_mut(candidate) {
        Some(count) if *count > 1 => *count -= 1,
        Some(_) => {
            // Dropped to zero: remove the entry, zero-fill re-adds rostered ids
            counts.remove(candidate);
        }
        None => {
            warn!(
                "{} for candidate {} in election {} already 0, clamping",
                what, candidate, election_id
            );
        }
    }
}

/// Percentage with one decimal place: round(part / total * 1000) / 10.
fn share(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / total as f64).round() / 10.0
    }
}
