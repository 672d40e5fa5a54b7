use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("store rejected request: {0}")]
    Rejected(String),

    #[error("malformed store response: {0}")]
    Decode(String),
}
