use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row, Sqlite,
};
use std::collections::BTreeSet;
use std::env;

use crate::error::StoreError;
use crate::models::{Candidate, Election, ElectionResult, VoteState};

/// Version tag of a stored document, used for compare-and-swap writes.
/// `None` means the document does not exist yet.
pub type DocVersion = Option<i64>;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect using `DATABASE_URL` (default `sqlite:votecast.db`), creating
    /// the database file and schema if missing.
    pub async fn connect() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:votecast.db".to_string());
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database on a single connection (a `:memory:` database is
    /// per-connection, so the pool must not hand out more than one).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vote_states (
                user_id TEXT PRIMARY KEY,
                elections TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS election_results (
                election_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS elections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT PRIMARY KEY,
                election_id TEXT NOT NULL,
                name TEXT NOT NULL,
                FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // --- VoteState documents ---

    /// Load a user's vote-state document together with its version tag.
    pub async fn load_vote_state(
        &self,
        user_id: &str,
    ) -> Result<(Option<VoteState>, DocVersion), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT elections, version
            FROM vote_states
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let elections = serde_json::from_str(&row.get::<String, _>("elections"))?;
                let state = VoteState {
                    user_id: user_id.to_string(),
                    elections,
                };
                Ok((Some(state), Some(row.get::<i64, _>("version"))))
            }
            None => Ok((None, None)),
        }
    }

    /// Compare-and-swap write of a vote-state document. Returns `false` when
    /// another writer committed first (version mismatch, or the document
    /// appeared where `expected` was `None`); the caller reloads and retries.
    pub async fn store_vote_state(
        &self,
        state: &VoteState,
        expected: DocVersion,
    ) -> Result<bool, StoreError> {
        let elections = serde_json::to_string(&state.elections)?;
        let affected = match expected {
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE vote_states
                    SET elections = ?, version = version + 1
                    WHERE user_id = ? AND version = ?
                    "#,
                )
                .bind(&elections)
                .bind(&state.user_id)
                .bind(version)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO vote_states (user_id, elections, version)
                    VALUES (?, ?, 1)
                    ON CONFLICT(user_id) DO NOTHING
                    "#,
                )
                .bind(&state.user_id)
                .bind(&elections)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };
        Ok(affected == 1)
    }

    // --- ElectionResult documents ---

    /// Load an election's result document together with its version tag.
    pub async fn load_election_result(
        &self,
        election_id: &str,
    ) -> Result<(Option<ElectionResult>, DocVersion), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT doc, version
            FROM election_results
            WHERE election_id = ?
            "#,
        )
        .bind(election_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let result = serde_json::from_str(&row.get::<String, _>("doc"))?;
                Ok((Some(result), Some(row.get::<i64, _>("version"))))
            }
            None => Ok((None, None)),
        }
    }

    /// Compare-and-swap write of a result document. Full overwrite: the
    /// stored document is always a complete, internally consistent snapshot.
    pub async fn store_election_result(
        &self,
        result: &ElectionResult,
        expected: DocVersion,
    ) -> Result<bool, StoreError> {
        let doc = serde_json::to_string(result)?;
        let affected = match expected {
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE election_results
                    SET doc = ?, version = version + 1
                    WHERE election_id = ? AND version = ?
                    "#,
                )
                .bind(&doc)
                .bind(&result.election_id)
                .bind(version)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO election_results (election_id, doc, version)
                    VALUES (?, ?, 1)
                    ON CONFLICT(election_id) DO NOTHING
                    "#,
                )
                .bind(&result.election_id)
                .bind(&doc)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };
        Ok(affected == 1)
    }

    // --- Candidate registry ---

    /// Create an election registry row.
    pub async fn create_election(&self, election: &Election) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO elections (id, name, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&election.id)
        .bind(&election.name)
        .bind(election.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register a candidate for an election.
    pub async fn add_candidate(&self, candidate: &Candidate) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO candidates (id, election_id, name)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.election_id)
        .bind(&candidate.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ids of every candidate currently registered for an election.
    pub async fn list_candidate_ids(
        &self,
        election_id: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        let ids = sqlx::query(
            r#"
            SELECT id
            FROM candidates
            WHERE election_id = ?
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();
        Ok(ids)
    }

    /// Election teardown: drop the roster rows and the cached result. Stray
    /// references in vote-state documents are tolerated by the aggregation
    /// engine (degraded zero-fill).
    pub async fn remove_election(&self, election_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM candidates WHERE election_id = ?")
            .bind(election_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM elections WHERE id = ?")
            .bind(election_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM election_results WHERE election_id = ?")
            .bind(election_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
