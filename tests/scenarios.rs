use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use votecast::handlers::{cancel_vote, submit_vote, toggle_dislike};
use votecast::tasks::aggregator::run_aggregation_task;
use votecast::{
    Aggregator, Candidate, CandidateRegistry, Database, DbCandidateRegistry, Election,
    RegistryError, ResultReader, VoteService, VoteStateChange,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Election "e1" with the given candidate ids registered, plus an aggregator
/// wired to the db-backed roster.
async fn setup(candidates: &[&str]) -> (Arc<Database>, Arc<Aggregator>) {
    init_logging();
    let db = Arc::new(Database::in_memory().await.unwrap());
    let election = Election {
        id: "e1".to_string(),
        name: "Presidential 2027".to_string(),
        created_at: Utc::now(),
    };
    db.create_election(&election).await.unwrap();
    for id in candidates {
        let candidate = Candidate {
            id: id.to_string(),
            election_id: "e1".to_string(),
            name: format!("Candidate {id}"),
        };
        db.add_candidate(&candidate).await.unwrap();
    }
    let registry = Arc::new(DbCandidateRegistry::new(Arc::clone(&db)));
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&db), registry));
    (db, aggregator)
}

async fn submit_and_aggregate(
    db: &Database,
    aggregator: &Aggregator,
    user: &str,
    candidate: &str,
) {
    let change = submit_vote(db, user, "e1", candidate).await.unwrap().unwrap();
    assert_eq!(aggregator.process_change(&change).await, 1);
}

struct FailingRegistry;

#[async_trait]
impl CandidateRegistry for FailingRegistry {
    async fn list_candidate_ids(&self, _: &str) -> Result<BTreeSet<String>, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }
}

#[tokio::test]
async fn vote_then_switch() {
    let (db, aggregator) = setup(&["a", "b"]).await;

    submit_and_aggregate(&db, &aggregator, "u1", "a").await;
    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.candidates["a"].count, 1);
    assert_eq!(result.candidates["a"].percentage, 100.0);

    submit_and_aggregate(&db, &aggregator, "u1", "b").await;
    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.candidates["a"].count, 0);
    assert_eq!(result.candidates["b"].count, 1);
    assert_eq!(result.candidates["b"].percentage, 100.0);
}

#[tokio::test]
async fn vote_then_cancel_leaves_zero_filled_result() {
    let (db, aggregator) = setup(&["a", "b", "c"]).await;

    submit_and_aggregate(&db, &aggregator, "u1", "a").await;
    let change = cancel_vote(&db, "u1", "e1").await.unwrap().unwrap();
    assert_eq!(aggregator.process_change(&change).await, 1);

    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 0);
    assert_eq!(result.candidates.len(), 3);
    for id in ["a", "b", "c"] {
        assert_eq!(result.candidates[id].count, 0);
        assert_eq!(result.candidates[id].percentage, 0.0);
        assert_eq!(result.candidates[id].dislike_count, None);
    }
}

#[tokio::test]
async fn dislike_then_vote_same_candidate() {
    let (db, aggregator) = setup(&["a", "b"]).await;

    let change = toggle_dislike(&db, "u1", "e1", "a").await.unwrap().unwrap();
    assert_eq!(aggregator.process_change(&change).await, 1);
    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_dislike_marks, 1);
    assert_eq!(result.candidates["a"].dislike_count, Some(1));

    // Voting for a clears the dislike mark in the same write
    submit_and_aggregate(&db, &aggregator, "u1", "a").await;
    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.total_dislike_marks, 0);
    assert_eq!(result.candidates["a"].count, 1);
    assert_eq!(result.candidates["a"].dislike_count, None);
}

#[tokio::test]
async fn three_way_split_percentages() {
    let (db, aggregator) = setup(&["a", "b", "c"]).await;

    submit_and_aggregate(&db, &aggregator, "u1", "a").await;
    submit_and_aggregate(&db, &aggregator, "u2", "b").await;
    submit_and_aggregate(&db, &aggregator, "u3", "c").await;

    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 3);
    // Each share rounds individually to 33.3; the sum is deliberately not 100
    for id in ["a", "b", "c"] {
        assert_eq!(result.candidates[id].percentage, 33.3);
    }
}

#[tokio::test]
async fn conservation_across_many_users() {
    let (db, aggregator) = setup(&["a", "b"]).await;

    // u1 votes a then switches to b, u2 votes a then cancels, u3 votes b,
    // u4 dislikes a only
    submit_and_aggregate(&db, &aggregator, "u1", "a").await;
    submit_and_aggregate(&db, &aggregator, "u1", "b").await;
    submit_and_aggregate(&db, &aggregator, "u2", "a").await;
    let change = cancel_vote(&db, "u2", "e1").await.unwrap().unwrap();
    assert_eq!(aggregator.process_change(&change).await, 1);
    submit_and_aggregate(&db, &aggregator, "u3", "b").await;
    let change = toggle_dislike(&db, "u4", "e1", "a").await.unwrap().unwrap();
    assert_eq!(aggregator.process_change(&change).await, 1);

    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();

    // Recount from the source of truth: every user's current pick
    let mut expected_total = 0;
    let mut expected_b = 0;
    for user in ["u1", "u2", "u3", "u4"] {
        let (state, _) = db.load_vote_state(user).await.unwrap();
        if let Some(candidate) = state.as_ref().and_then(|s| s.chosen_candidate("e1")) {
            expected_total += 1;
            if candidate == "b" {
                expected_b += 1;
            }
        }
    }
    assert_eq!(result.total_votes, expected_total);
    assert_eq!(result.candidates["b"].count, expected_b);
    assert_eq!(result.candidates["a"].count, 0);
    assert_eq!(result.total_dislike_marks, 1);
    assert_eq!(result.candidates["a"].dislike_count, Some(1));
}

#[tokio::test]
async fn redelivered_trigger_is_noop() {
    let (db, aggregator) = setup(&["a"]).await;

    submit_and_aggregate(&db, &aggregator, "u1", "a").await;

    // At-least-once redelivery arrives after the write has settled: both
    // images show the same record, so nothing is affected
    let (settled, _) = db.load_vote_state("u1").await.unwrap();
    let redelivery = VoteStateChange {
        user_id: "u1".to_string(),
        before: settled.clone(),
        after: settled,
    };
    assert_eq!(aggregator.process_change(&redelivery).await, 0);

    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.candidates["a"].count, 1);
}

#[tokio::test]
async fn roster_failure_degrades_zero_fill() {
    init_logging();
    let db = Arc::new(Database::in_memory().await.unwrap());
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&db), Arc::new(FailingRegistry)));

    let change = submit_vote(&db, "u1", "e1", "a").await.unwrap().unwrap();
    // The update still commits, with only the candidates the delta knows
    assert_eq!(aggregator.process_change(&change).await, 1);

    let (result, _) = db.load_election_result("e1").await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates["a"].count, 1);
}

#[tokio::test]
async fn reader_synthesizes_zero_result() {
    let (db, aggregator) = setup(&["a", "b", "c"]).await;
    let registry = Arc::new(DbCandidateRegistry::new(Arc::clone(&db)));
    let (service, _changes) = VoteService::new(Arc::clone(&db));
    let reader = ResultReader::new(
        Arc::clone(&db),
        registry,
        Arc::clone(&aggregator),
        Arc::new(service),
    );

    // No votes ever cast: never null, zero-filled from the roster
    let result = reader.get_result("e1").await.unwrap();
    assert_eq!(result.total_votes, 0);
    assert_eq!(result.candidates.len(), 3);
    for id in ["a", "b", "c"] {
        assert_eq!(result.candidates[id].count, 0);
        assert_eq!(result.candidates[id].percentage, 0.0);
    }
}

#[tokio::test]
async fn live_pipeline_delivers_result_updates() {
    let (db, aggregator) = setup(&["a", "b"]).await;
    let (service, changes_rx) = VoteService::new(Arc::clone(&db));
    let service = Arc::new(service);

    let mut results = aggregator.subscribe_results();
    let mut states = service.subscribe_vote_states();
    tokio::spawn(run_aggregation_task(Arc::clone(&aggregator), changes_rx));

    service.submit_vote("u1", "e1", "a").await.unwrap();

    let state_change = tokio::time::timeout(Duration::from_secs(5), states.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state_change.user_id, "u1");
    assert_eq!(
        state_change.after.unwrap().chosen_candidate("e1"),
        Some("a")
    );

    let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.election_id, "e1");
    assert_eq!(result.total_votes, 1);
    assert_eq!(result.candidates["a"].count, 1);

    // A no-op command produces no trigger and no result update
    service.cancel_vote("u2", "e1").await.unwrap();
    service.submit_vote("u1", "e1", "b").await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.candidates["b"].count, 1);
    assert_eq!(result.candidates["a"].count, 0);
    assert_eq!(result.total_votes, 1);
}
