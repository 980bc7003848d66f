use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("malformed history: {0}")]
    Json(#[from] serde_json::Error),
    #[error("none of {0} packets carries a usable timestamp")]
    NoUsableSamples(usize),
}
