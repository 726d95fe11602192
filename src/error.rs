use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate {collection} document for key {key}")]
    Conflict {
        collection: &'static str,
        key: String,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
