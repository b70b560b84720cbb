use thiserror::Error;

/// Failures from the document store.
///
/// `ConflictExhausted` is the terminal form of a compare-and-swap race: the
/// writer reloaded and retried up to its attempt budget and lost every time.
/// Mutators surface it to the caller as a retryable failure; the aggregation
/// engine catches it per election and logs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored document could not be (de)serialized: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("write conflict persisted after {0} attempts")]
    ConflictExhausted(u32),
}

/// The candidate roster could not be read. Non-fatal by contract: the
/// aggregation engine degrades to partial zero-fill and logs a warning.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("candidate roster unavailable: {0}")]
    Unavailable(String),
}
