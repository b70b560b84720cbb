//! Vote-prediction aggregation core.
//!
//! Users keep one sparse vote-state document each (their current pick and
//! dislike marks per election). Every committed write to such a document is
//! delivered, with its before- and after-image, to the aggregation engine,
//! which diffs the affected elections and incrementally rewrites each
//! election's cached result document under compare-and-swap. Clients read
//! results and follow live feeds through the sync layer; they never write
//! result documents themselves.

pub mod aggregation;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod sync;
pub mod tasks;

pub use aggregation::Aggregator;
pub use db::Database;
pub use error::{RegistryError, StoreError};
pub use handlers::{VoteService, VoteStateChange};
pub use models::{Candidate, CandidateResult, Election, ElectionChoice, ElectionResult, VoteState};
pub use registry::{CandidateRegistry, DbCandidateRegistry};
pub use sync::ResultReader;
