pub mod vote;

pub use vote::{cancel_vote, submit_vote, toggle_dislike, VoteStateChange};

use log::warn;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::db::Database;
use crate::error::StoreError;

const STATE_FEED_CAPACITY: usize = 64;

/// Client command surface over the vote-state mutators. Every committed
/// write is forwarded onto the change stream (the aggregation engine's
/// trigger) and echoed on a broadcast feed so clients can follow their own
/// record live. No-op mutations produce neither.
pub struct VoteService {
    db: Arc<Database>,
    changes_tx: mpsc::UnboundedSender<VoteStateChange>,
    states_tx: broadcast::Sender<VoteStateChange>,
}

impl VoteService {
    /// Returns the service and the receiving end of the change stream, to be
    /// handed to the aggregation worker.
    pub fn new(db: Arc<Database>) -> (Self, mpsc::UnboundedReceiver<VoteStateChange>) {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let (states_tx, _) = broadcast::channel(STATE_FEED_CAPACITY);
        (
            Self {
                db,
                changes_tx,
                states_tx,
            },
            changes_rx,
        )
    }

    /// Live feed of committed vote-state writes; clients filter to their own
    /// `user_id`.
    pub fn subscribe_vote_states(&self) -> broadcast::Receiver<VoteStateChange> {
        self.states_tx.subscribe()
    }

    pub async fn submit_vote(
        &self,
        user_id: &str,
        election_id: &str,
        candidate_id: &str,
    ) -> Result<(), StoreError> {
        let change = vote::submit_vote(&self.db, user_id, election_id, candidate_id).await?;
        self.publish(change);
        Ok(())
    }

    pub async fn cancel_vote(&self, user_id: &str, election_id: &str) -> Result<(), StoreError> {
        let change = vote::cancel_vote(&self.db, user_id, election_id).await?;
        self.publish(change);
        Ok(())
    }

    pub async fn toggle_dislike(
        &self,
        user_id: &str,
        election_id: &str,
        candidate_id: &str,
    ) -> Result<(), StoreError> {
        let change = vote::toggle_dislike(&self.db, user_id, election_id, candidate_id).await?;
        self.publish(change);
        Ok(())
    }

    fn publish(&self, change: Option<VoteStateChange>) {
        let Some(change) = change else {
            return;
        };
        // Feed subscribers may be absent; the trigger consumer should not be
        if self.changes_tx.send(change.clone()).is_err() {
            warn!(
                "change stream closed, dropping trigger for user {}",
                change.user_id
            );
        }
        let _ = self.states_tx.send(change);
    }
}
