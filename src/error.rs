//! Error taxonomy for the gateway.
//!
//! Each component returns its own error enum. At the boundary every error is
//! collapsed into a [`Rejection`], which carries a stable code and an HTTP
//! status but never the internal detail (provider bodies, SQL errors, key ids).

use axum::http::StatusCode;
use thiserror::Error;

/// Bearer token verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Header could not be decoded or carries no `kid`
    #[error("token header is malformed or missing a key id")]
    MalformedToken,

    /// The key ring is empty (identity provider unreachable or never fetched)
    #[error("no identity provider signing keys available")]
    KeyUnavailable,

    /// The token's `kid` is not part of the current key set
    #[error("signing key '{0}' is not in the current key set")]
    UnknownKey(String),

    /// `exp` is in the past
    #[error("token has expired")]
    Expired,

    /// Signature, audience or claim validation failed
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Credential cipher failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Missing or unusable encryption secret
    #[error("cipher configuration error: {0}")]
    Configuration(String),

    /// Authentication tag mismatch or malformed ciphertext
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Persistence failures shared by the vault and the identity stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,

    /// A stored value could not be parsed back into its domain type
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Credential vault failures.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Storage(StorageError::Sqlite(e))
    }
}

/// Identity binder failures.
#[derive(Debug, Error)]
pub enum BinderError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for BinderError {
    fn from(e: rusqlite::Error) -> Self {
        BinderError::Storage(StorageError::Sqlite(e))
    }
}

/// Third-party token endpoint failures.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Provider answered with a non-success status (body already redacted)
    #[error("{integration} token endpoint rejected the request with status {status}: {body}")]
    UpstreamAuth {
        integration: String,
        status: u16,
        body: String,
    },

    /// Timeout or connection failure; safe to retry
    #[error("{integration} token endpoint unavailable: {reason}")]
    UpstreamUnavailable { integration: String, reason: String },

    /// Provider answered 2xx with a payload we cannot use
    #[error("{integration} token endpoint returned an invalid response: {reason}")]
    InvalidResponse { integration: String, reason: String },

    #[error("integration '{0}' is not configured")]
    NotConfigured(String),
}

impl AdapterError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::UpstreamUnavailable { .. })
    }
}

/// Failures of the connect / refresh flows that join adapters and the vault.
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("no {integration} credentials stored for tenant {tenant_id}")]
    NotConnected { tenant_id: String, integration: String },
}

/// Caller-visible rejection with a stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
    UpstreamFailure,
    Internal,
}

impl Rejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Unauthenticated => "unauthenticated",
            Rejection::Forbidden => "forbidden",
            Rejection::NotFound => "not_found",
            Rejection::Conflict => "conflict",
            Rejection::Unavailable => "unavailable",
            Rejection::UpstreamFailure => "upstream_failure",
            Rejection::Internal => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthenticated => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::Conflict => StatusCode::CONFLICT,
            Rejection::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::UpstreamFailure => StatusCode::BAD_GATEWAY,
            Rejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl VerifyError {
    pub fn rejection(&self) -> Rejection {
        match self {
            VerifyError::KeyUnavailable => Rejection::Unavailable,
            _ => Rejection::Unauthenticated,
        }
    }
}

impl BinderError {
    pub fn rejection(&self) -> Rejection {
        match self {
            BinderError::Conflict(_) => Rejection::Conflict,
            BinderError::NotFound(_) => Rejection::NotFound,
            BinderError::Forbidden(_) => Rejection::Forbidden,
            BinderError::Storage(_) => Rejection::Internal,
        }
    }
}

impl AdapterError {
    pub fn rejection(&self) -> Rejection {
        match self {
            AdapterError::UpstreamUnavailable { .. } => Rejection::Unavailable,
            AdapterError::NotConfigured(_) => Rejection::Internal,
            _ => Rejection::UpstreamFailure,
        }
    }
}

impl CustodyError {
    pub fn rejection(&self) -> Rejection {
        match self {
            CustodyError::Adapter(e) => e.rejection(),
            CustodyError::Vault(_) => Rejection::Internal,
            CustodyError::NotConnected { .. } => Rejection::NotFound,
        }
    }
}
