use thiserror::Error;

/// Stable machine-readable codes attached to service errors
pub mod error_codes {
    pub const DELETE_CART_ITEM_FAILURE: &str = "DELETE_CART_ITEM_FAILURE";
    pub const UPDATE_CART_ITEM_FAILURE: &str = "UPDATE_CART_ITEM_FAILURE";
    pub const UPDATE_CART_ITEM_CONFLICT: &str = "UPDATE_CART_ITEM_CONFLICT";
    pub const GET_CART_ITEM_FAILURE: &str = "GET_CART_ITEM_FAILURE";
    pub const GET_CART_FAILURE: &str = "GET_CART_FAILURE";
    pub const DELETE_CART_FAILURE: &str = "DELETE_CART_FAILURE";
    pub const MISSING_USER_ID: &str = "MISSING_USER_ID";
}

/// Class of a service error, used to pick the transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Conflict,
    Internal,
}

/// Service-level errors returned to callers.
///
/// Messages are fixed strings; they never carry amounts or cart contents.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    InvalidArgument { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{message}")]
    Internal { code: &'static str, message: String },
}

impl ServiceError {
    pub fn invalid_argument(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Internal {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument { code, .. }
            | ServiceError::Conflict { code, .. }
            | ServiceError::Internal { code, .. } => code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ServiceError::Conflict { .. } => ErrorKind::Conflict,
            ServiceError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Repository-level errors for backend access
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Backend command failed: {message}")]
    Backend { message: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Transaction aborted by concurrent writes after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Timeout occurred during operation")]
    Timeout,
}

impl RepositoryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ServiceError::internal(error_codes::GET_CART_FAILURE, "failed to get cart");
        assert_eq!(error.to_string(), "failed to get cart");
        assert_eq!(error.code(), "GET_CART_FAILURE");
        assert_eq!(error.kind(), ErrorKind::Internal);

        let error = RepositoryError::Conflict { attempts: 3 };
        assert_eq!(
            error.to_string(),
            "Transaction aborted by concurrent writes after 3 attempts"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ServiceError::invalid_argument(error_codes::DELETE_CART_ITEM_FAILURE, "x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ServiceError::conflict(error_codes::UPDATE_CART_ITEM_CONFLICT, "x").kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_repository_error_from_serde() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_error.is_err());

        let repo_error: RepositoryError = json_error.unwrap_err().into();
        match repo_error {
            RepositoryError::Serialization { .. } => {}
            _ => panic!("Expected Serialization error"),
        }
        assert!(!RepositoryError::Timeout.is_conflict());
        assert!(RepositoryError::Conflict { attempts: 1 }.is_conflict());
    }
}
