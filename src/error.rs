use thiserror::Error;

/// Failures reading the bulk dataset. Callers degrade these to an empty bulk set.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Bulk dataset is missing required column '{0}'")]
    MissingColumn(&'static str),
}

/// Failures of the persisted record store. None of them leave a partial write behind.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Missing required fields: {}", .0.join(", "))]
    ValidationFailed(Vec<&'static str>),

    #[error("Storage full: {0}")]
    StorageFull(String),

    #[error("Store write failed: {0}")]
    WriteFailure(#[source] std::io::Error),

    #[error("Store read failed: {0}")]
    StoreReadFailure(String),

    #[error("No sighting id left after {0}")]
    IdExhausted(u64),
}

impl StoreError {
    /// Whether the submitter can simply try again with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StorageFull(_) | StoreError::WriteFailure(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::StoreReadFailure(e.to_string())
    }
}
