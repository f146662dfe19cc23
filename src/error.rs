//! Error taxonomy for the client core.
//!
//! Validation errors are plain message lists produced locally. Transport and
//! domain errors come back from the remote collaborator and are kept apart so
//! callers can map them to different user-facing messages.

use thiserror::Error;

/// HTTP-level failure of a remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not found ({status})")]
    NotFound { status: u16 },

    #[error("no response from service")]
    Unreachable,

    #[error("{reason} ({status})")]
    Other {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request could not be built: {0}")]
    Request(String),
}

impl TransportError {
    pub fn from_status(status: u16, reason: &str, body: &str) -> Self {
        match status {
            404 => TransportError::NotFound { status },
            0 => TransportError::Unreachable,
            _ => TransportError::Other {
                status,
                reason: reason.to_string(),
                body: body.to_string(),
            },
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            TransportError::NotFound { status } | TransportError::Other { status, .. } => *status,
            _ => 0,
        }
    }

    /// Message shown to the user. Short response bodies are included, long
    /// ones (usually HTML error pages) are not.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::NotFound { status } => {
                format!("Not Found ({}). Server not reachable.", status)
            }
            TransportError::Unreachable => "Unknown (0). Something went wrong.".to_string(),
            TransportError::Other { status, reason, body } if body.len() < 50 => {
                format!("{} ({}). {}", reason, status, body)
            }
            TransportError::Other { status, reason, .. } => format!("{} ({}). ", reason, status),
            TransportError::Decode(_) | TransportError::Request(_) => {
                "Unknown (0). Something went wrong.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Unreachable => true,
            TransportError::Other { status, .. } => matches!(
                status,
                408 |   // Request Timeout
                429 |   // Too Many Requests
                500 |   // Internal Server Error
                502 |   // Bad Gateway
                503 |   // Service Unavailable
                504     // Gateway Timeout
            ),
            _ => false,
        }
    }
}

/// The call succeeded at the transport level but the service refused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("bad credentials")]
    BadCredentials,

    #[error("name already taken")]
    NameTaken,

    #[error("invalid token")]
    InvalidToken,

    #[error("rejected: {0}")]
    Rejected(String),
}

impl DomainError {
    pub fn user_message(&self) -> String {
        match self {
            DomainError::BadCredentials => "Wrong username and/or password.".to_string(),
            DomainError::NameTaken => "This name is already taken.".to_string(),
            DomainError::InvalidToken => "Your session has expired. Please log in again.".to_string(),
            DomainError::Rejected(reason) => reason.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RemoteError {
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Transport(e) => e.user_message(),
            RemoteError::Domain(e) => e.user_message(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport(e) if e.is_retryable())
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("could not encode value: {0}")]
    Encode(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Umbrella error for operations that span several layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("no active session")]
    NoSession,

    #[error("settings have not been loaded")]
    SettingsNotLoaded,

    #[error("a request is already in flight")]
    Busy,
}

impl ClientError {
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Remote(err) => err.user_message(),
            ClientError::Validation(errors) => errors.join("\n"),
            other => other.to_string(),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Remote(err.into())
    }
}

impl From<DomainError> for ClientError {
    fn from(err: DomainError) -> Self {
        ClientError::Remote(err.into())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            TransportError::from_status(404, "Not Found", ""),
            TransportError::NotFound { status: 404 }
        );
        assert_eq!(TransportError::from_status(0, "", ""), TransportError::Unreachable);
        assert!(matches!(
            TransportError::from_status(500, "Internal Server Error", "boom"),
            TransportError::Other { status: 500, .. }
        ));
    }

    #[test]
    fn test_user_messages_are_distinct_per_category() {
        let not_found = TransportError::NotFound { status: 404 }.user_message();
        let unreachable = TransportError::Unreachable.user_message();
        let other = TransportError::from_status(409, "Conflict", "name exists").user_message();
        assert_eq!(not_found, "Not Found (404). Server not reachable.");
        assert_eq!(unreachable, "Unknown (0). Something went wrong.");
        assert_eq!(other, "Conflict (409). name exists");
    }

    #[test]
    fn test_long_bodies_are_dropped_from_message() {
        let body = "<html>".repeat(20);
        let msg = TransportError::from_status(500, "Internal Server Error", &body).user_message();
        assert_eq!(msg, "Internal Server Error (500). ");
    }

    #[test]
    fn test_retryable_categories() {
        assert!(TransportError::Unreachable.is_retryable());
        assert!(TransportError::from_status(503, "Service Unavailable", "").is_retryable());
        assert!(!TransportError::NotFound { status: 404 }.is_retryable());
        assert!(!RemoteError::from(DomainError::BadCredentials).is_retryable());
    }
}
