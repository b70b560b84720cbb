use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::aggregation::Aggregator;
use crate::handlers::VoteStateChange;

/// Background worker consuming the vote-state change stream and driving the
/// aggregation engine. Engine failures are already contained per election,
/// so a bad delivery never takes the worker down; the loop ends only when
/// every sender is gone.
pub async fn run_aggregation_task(
    aggregator: Arc<Aggregator>,
    mut changes: mpsc::UnboundedReceiver<VoteStateChange>,
) {
    info!("starting aggregation worker");
    while let Some(change) = changes.recv().await {
        let updated = aggregator.process_change(&change).await;
        debug!(
            "processed vote state change for user {}: {} election(s) updated",
            change.user_id, updated
        );
    }
    info!("change stream closed, aggregation worker exiting");
}
