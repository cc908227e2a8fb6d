use sportstream_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("undecodable article batch: {0}")]
    Decode(#[from] serde_json::Error),

    /// Writing article `external_id` failed; the rest of its batch was skipped.
    #[error("storing article {external_id} failed ({skipped} skipped): {source}")]
    Store {
        external_id: i64,
        skipped: usize,
        #[source]
        source: StoreError,
    },
}

impl WorkerError {
    /// Reason label for the consumer-failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Store { .. } => "dispatch",
        }
    }
}
