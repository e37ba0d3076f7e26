use thiserror::Error;

/// Error taxonomy shared by every layer. Backend failures collapse into
/// [`DssError::Internal`], which carries the underlying message for operator
/// diagnosis but stays opaque to callers.
#[derive(Debug, Error)]
pub enum DssError {
    #[error("bad input: {message}")]
    BadInput { message: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("already exists: {message}")]
    AlreadyExists { message: String },
    #[error("version mismatch: {message}")]
    VersionMismatch { message: String },
    #[error("area too large: {message}")]
    AreaTooLarge { message: String },
    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },
    #[error("storage error: {message}")]
    Internal { message: String },
}

impl DssError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::VersionMismatch {
            message: message.into(),
        }
    }

    pub fn area_too_large(message: impl Into<String>) -> Self {
        Self::AreaTooLarge {
            message: message.into(),
        }
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::LimitExceeded {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type DssResult<T> = Result<T, DssError>;

impl From<sea_orm::DbErr> for DssError {
    fn from(value: sea_orm::DbErr) -> Self {
        DssError::internal(value.to_string())
    }
}
