use parlor_store::StoreError;
use thiserror::Error;

/// Client-side error taxonomy. Validation and store failures on
/// user-initiated actions surface a notice and leave input intact;
/// background flag updates log and swallow their failures instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("not signed in")]
    NotAuthenticated,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("local storage failure: {0}")]
    LocalStorage(#[from] sqlx::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}
