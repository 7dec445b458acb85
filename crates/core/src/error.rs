use thiserror::Error;

pub type AdResult<T> = Result<T, AdError>;

#[derive(Error, Debug)]
pub enum AdError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient funds: balance {balance} cannot cover {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
