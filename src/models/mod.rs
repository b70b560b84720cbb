use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// One record per user: their current pick and dislike marks across every
/// election they have interacted with. Elections they never touched are
/// simply absent from the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteState {
    pub user_id: String,
    #[serde(default)]
    pub elections: HashMap<String, ElectionChoice>,
}

impl VoteState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            elections: HashMap::new(),
        }
    }

    /// The user's current pick for an election, if any.
    pub fn chosen_candidate(&self, election_id: &str) -> Option<&str> {
        self.elections
            .get(election_id)
            .and_then(|choice| choice.candidate_id.as_deref())
    }
}

/// A user's state for a single election. Invariant: `candidate_id` (when
/// present) never appears in `disliked_candidates` — voting for a candidate
/// clears any prior dislike mark on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionChoice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disliked_candidates: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ElectionChoice {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            candidate_id: None,
            disliked_candidates: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// An entry with no pick and no dislikes is deleted by omission rather
    /// than kept as a tombstone.
    pub fn is_empty(&self) -> bool {
        self.candidate_id.is_none() && self.disliked_candidates.is_empty()
    }
}

/// Per-election cached aggregate. Written only by the aggregation engine;
/// read-only everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResult {
    pub election_id: String,
    pub total_votes: u32,
    pub total_dislike_marks: u32,
    #[serde(default)]
    pub candidates: HashMap<String, CandidateResult>,
    pub last_updated: DateTime<Utc>,
}

impl ElectionResult {
    /// Zero-valued record for an election with no aggregate yet.
    pub fn empty(election_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            election_id: election_id.into(),
            total_votes: 0,
            total_dislike_marks: 0,
            candidates: HashMap::new(),
            last_updated: now,
        }
    }
}

/// Per-candidate slice of an `ElectionResult`. The dislike fields are only
/// present while the candidate carries at least one dislike mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub count: u32,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dislike_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dislike_percentage: Option<f64>,
}

impl CandidateResult {
    pub fn zero() -> Self {
        Self {
            count: 0,
            percentage: 0.0,
            dislike_count: None,
            dislike_percentage: None,
        }
    }
}

/// Registry row for an election. Creation/teardown of elections is external
/// to the aggregation core; this is the minimal write-side the roster needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Election {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Registry row for a candidate within an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub election_id: String,
    pub name: String,
}

impl Candidate {
    pub fn new(election_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            election_id: election_id.into(),
            name: name.into(),
        }
    }
}
