// 🚨 Error Types - one enum per boundary
// Component boundaries (session, API, persistence) return these instead of panicking.

use std::time::Duration;
use thiserror::Error;

/// Boxed cause attached to authentication failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

// ============================================================================
// CREDENTIALS & TOKEN STORE
// ============================================================================

/// Signature or payload check failed on a sealed credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("corrupted credential: {0}")]
    Corrupted(String),
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential store backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("stored credential is unreadable: {0}")]
    Unreadable(String),

    #[error("credential store lock poisoned")]
    Poisoned,

    #[error("credential missing from store after write (key `{0}`)")]
    MissingAfterWrite(String),

    #[error(transparent)]
    Corrupted(#[from] CredentialError),
}

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing user/password. Fatal, retrying will not help.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        reason: String,
        #[source]
        source: BoxError,
    },

    #[error("credential store error: {0}")]
    CredentialStore(#[from] CredentialStoreError),
}

impl SessionError {
    pub fn authentication(reason: &str, source: impl Into<BoxError>) -> Self {
        SessionError::AuthenticationFailed {
            reason: reason.to_string(),
            source: source.into(),
        }
    }
}

// ============================================================================
// TRANSPORT & API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport failure: {0}")]
    Other(String),
}

/// Per-request classification returned by `ApiClient`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not obtain bearer token: {0}")]
    Session(#[from] SessionError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {body}")]
    Protocol {
        status: u16,
        body: serde_json::Value,
    },

    #[error("invalid JSON response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Status code for protocol errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// SOURCES, PERSISTENCE & IMPORT RUNS
// ============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unexpected payload from {source_name}: {detail}")]
    UnexpectedPayload { source_name: String, detail: String },

    #[error("source database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid upsert batch: {0}")]
    InvalidBatch(String),

    #[error("could not encode event data: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to fetch batch from {source_name}")]
    Fetch {
        source_name: String,
        #[source]
        cause: FetchError,
    },

    #[error("failed to persist store batch")]
    Persistence(#[source] PersistenceError),
}
