#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    SignatureInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token revoked")]
    TokenRevoked,

    #[error("failed to encode token: {0}")]
    Encoding(String),

    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

impl From<sqlx::Error> for TrackingError {
    fn from(value: sqlx::Error) -> Self {
        Self::Storage(value.into())
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(value: serde_json::Error) -> Self {
        Self::Storage(value.into())
    }
}

#[macro_export]
macro_rules! invalid {
    ($msg:literal $(,)?) => {
        return Err($crate::TrackingError::InvalidInput(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::TrackingError::InvalidInput(format!($fmt, $($arg)*)))
    };
}
