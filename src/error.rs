//! Error taxonomy shared by every core component.
//!
//! Each failure carries a stable machine-readable [`ErrorKind`] plus a
//! human-readable message. The web layer maps kinds onto HTTP status codes;
//! nothing below it knows about HTTP.

use thiserror::Error;

use crate::mailer::MailError;
use crate::storage::StorageError;
use crate::uploads::UploadError;

/// Stable, machine-readable classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Conflict,
    Forbidden,
    AlreadyRelated,
    SelfTarget,
    UploadFailed,
    StorageError,
    EmailDeliveryFailed,
    Unauthorized,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::AlreadyRelated => "already_related",
            ErrorKind::SelfTarget => "self_target",
            ErrorKind::UploadFailed => "upload_failed",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::EmailDeliveryFailed => "email_delivery_failed",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("verification code has expired")]
    ExpiredCode,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("already requested or friends")]
    AlreadyRelated,
    #[error("cannot target yourself")]
    SelfTarget,
    #[error("image upload failed: {0}")]
    UploadFailed(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("email delivery failed: {0}")]
    EmailDeliveryFailed(String),
    #[error("authentication required")]
    Unauthorized,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::ExpiredCode => ErrorKind::ValidationError,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::AlreadyRelated => ErrorKind::AlreadyRelated,
            CoreError::SelfTarget => ErrorKind::SelfTarget,
            CoreError::UploadFailed(_) => ErrorKind::UploadFailed,
            CoreError::Storage(_) => ErrorKind::StorageError,
            CoreError::EmailDeliveryFailed(_) => ErrorKind::EmailDeliveryFailed,
            CoreError::Unauthorized => ErrorKind::Unauthorized,
        }
    }

    /// Message safe to show to a client. Storage failures are reduced to a
    /// generic line; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        CoreError::Forbidden(msg.into())
    }

    pub fn user_not_found() -> Self {
        CoreError::NotFound("user".to_string())
    }
}

/// A missing row surfaces as `NotFound` and a uniqueness clash as `Conflict`;
/// everything else stays an opaque storage failure.
impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => CoreError::NotFound(what),
            StorageError::AlreadyExists(what) => {
                CoreError::Conflict(format!("{what} already exists"))
            }
            other => CoreError::Storage(other),
        }
    }
}

/// A payload the client got wrong is a validation error; only a store
/// failure is the upload backend's fault.
impl From<UploadError> for CoreError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Store(_) => CoreError::UploadFailed(err.to_string()),
            UploadError::Empty
            | UploadError::InvalidEncoding
            | UploadError::UnsupportedType(_)
            | UploadError::TooLarge => CoreError::Validation(err.to_string()),
        }
    }
}

impl From<MailError> for CoreError {
    fn from(err: MailError) -> Self {
        CoreError::EmailDeliveryFailed(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_code_is_a_validation_error() {
        assert_eq!(CoreError::ExpiredCode.kind(), ErrorKind::ValidationError);
        assert_eq!(CoreError::ExpiredCode.kind().as_str(), "validation_error");
    }

    #[test]
    fn storage_detail_is_not_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = CoreError::from(StorageError::Io(io));
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert_eq!(err.public_message(), "internal storage error");
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let err = CoreError::from(StorageError::NotFound("user".to_string()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "user not found");
    }

    #[test]
    fn bad_image_payload_is_a_validation_error() {
        let err = CoreError::from(UploadError::UnsupportedType("text/plain".to_string()));
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(CoreError::from(UploadError::TooLarge).kind(), ErrorKind::ValidationError);
        let err = CoreError::from(UploadError::Store("disk full".to_string()));
        assert_eq!(err.kind(), ErrorKind::UploadFailed);
    }

    #[test]
    fn mail_failure_maps_to_email_delivery_failed() {
        let err = CoreError::from(MailError::Exhausted {
            attempts: 3,
            last: Box::new(MailError::Transport("smtp down".to_string())),
        });
        assert_eq!(err.kind(), ErrorKind::EmailDeliveryFailed);
        assert_eq!(err.kind().as_str(), "email_delivery_failed");
        assert!(err.to_string().contains("smtp down"));
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(CoreError::user_not_found().to_string(), "user not found");
    }
}
