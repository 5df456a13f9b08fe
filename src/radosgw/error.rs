//! # Admin API Errors
//!
//! The admin API reports failures as a JSON body carrying an S3-style `Code`.
//! Codes are translated into `AdminErrorKind` once, where the response is read.

use serde::Deserialize;
use thiserror::Error;

/// Classified failure of an admin API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminErrorKind {
    /// The user does not exist
    NoSuchUser,
    /// An access key supplied on create is already registered
    KeyExists,
    /// The uid is taken (with different parameters)
    UserAlreadyExists,
    NoSuchBucket,
    /// Authentication or authorization failed
    AccessDenied,
    /// The request never produced a response
    Transport,
    Other,
}

impl AdminErrorKind {
    /// Classify an admin API error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("NoSuchUser") {
            AdminErrorKind::NoSuchUser
        } else if code.starts_with("KeyExists") {
            AdminErrorKind::KeyExists
        } else if code.starts_with("UserAlreadyExists") {
            AdminErrorKind::UserAlreadyExists
        } else if code.starts_with("NoSuchBucket") {
            AdminErrorKind::NoSuchBucket
        } else if code.starts_with("AccessDenied")
            || code.starts_with("InvalidAccessKeyId")
            || code.starts_with("SignatureDoesNotMatch")
        {
            AdminErrorKind::AccessDenied
        } else {
            AdminErrorKind::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AdminErrorKind::NoSuchUser => "NoSuchUser",
            AdminErrorKind::KeyExists => "KeyExists",
            AdminErrorKind::UserAlreadyExists => "UserAlreadyExists",
            AdminErrorKind::NoSuchBucket => "NoSuchBucket",
            AdminErrorKind::AccessDenied => "AccessDenied",
            AdminErrorKind::Transport => "Transport",
            AdminErrorKind::Other => "Other",
        }
    }
}

/// Failure of one admin API operation
#[derive(Debug, Error)]
#[error("admin {operation} failed ({}): {message}", kind.as_str())]
pub struct AdminError {
    pub kind: AdminErrorKind,
    pub operation: &'static str,
    /// HTTP status, absent for transport failures
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
}

impl AdminError {
    pub fn new(kind: AdminErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            status: None,
            message: message.into(),
        }
    }

    /// Translate a non-success response into a classified error
    #[must_use]
    pub fn from_response(operation: &'static str, status: u16, body: &str) -> Self {
        let kind = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => AdminErrorKind::from_code(&parsed.code),
            Err(_) if status == 401 || status == 403 => AdminErrorKind::AccessDenied,
            Err(_) => AdminErrorKind::Other,
        };
        Self {
            kind,
            operation,
            status: Some(status),
            message: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.to_string()
            },
        }
    }

    pub fn transport(operation: &'static str, error: &reqwest::Error) -> Self {
        Self::new(AdminErrorKind::Transport, operation, error.to_string())
    }

    /// Whether a later attempt may succeed without any change on our side
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            AdminErrorKind::Transport | AdminErrorKind::AccessDenied => true,
            AdminErrorKind::Other => self.status.is_none_or(|s| s >= 500 || s == 429),
            AdminErrorKind::NoSuchUser
            | AdminErrorKind::KeyExists
            | AdminErrorKind::UserAlreadyExists
            | AdminErrorKind::NoSuchBucket => false,
        }
    }

    /// The gateway rejected the admin keys this client signs with
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.kind == AdminErrorKind::AccessDenied
    }
}
