//! Encrypted custody of third-party OAuth tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialCustodian                │
//! │  - connect (code exchange → store)       │
//! │  - access_token (retrieve → refresh)     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialVault                    │
//! │  - one row per (tenant, integration)     │
//! │  - upsert, expiry-aware retrieval        │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//! ┌─────────────────────────────────────────┐
//! │       CredentialCipher                   │
//! │  - AES-256-GCM, random nonce per token   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use gatekeeper::credentials::{CredentialCipher, CredentialLookup, CredentialVault, NewCredential};
//! use gatekeeper::db::Database;
//! use gatekeeper::integrations::IntegrationType;
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = Database::open("gatekeeper.db")?;
//! let cipher = CredentialCipher::new(&std::env::var("GATEKEEPER_ENCRYPTION_KEY")?)?;
//! let vault = CredentialVault::new(db, cipher);
//!
//! vault.store(
//!     "tenant-id",
//!     IntegrationType::Zoho,
//!     &NewCredential::new("access", "refresh", Utc::now() + Duration::hours(1)),
//! )?;
//!
//! match vault.retrieve("tenant-id", IntegrationType::Zoho)? {
//!     Some(CredentialLookup::Active(creds)) => println!("expires at {}", creds.expires_at),
//!     Some(CredentialLookup::Expired(expired)) => println!("refresh needed ({})", expired.expires_at),
//!     None => println!("not connected"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Access and refresh tokens are only ever stored as ciphertext
//! - Only the vault writes ciphertext; all other metadata is plaintext
//! - `Debug` output of decrypted values never includes token material

use crate::integrations::IntegrationType;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub mod custody;
mod encryption;
mod vault;

pub use custody::CredentialCustodian;
pub use encryption::{derive_key, CredentialCipher};
pub use vault::CredentialVault;

/// Token pair and metadata handed to the vault for storage.
#[derive(Clone)]
pub struct NewCredential {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token
    pub expires_at: DateTime<Utc>,
    /// Provider organization id (Zoho org, QuickBooks realm)
    pub org_id: Option<String>,
    /// Provider-side tenant id (Xero tenant)
    pub external_tenant_id: Option<String>,
    /// Opaque extra fields from the provider's token response
    pub additional_data: Option<Value>,
}

impl NewCredential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            org_id: None,
            external_tenant_id: None,
            additional_data: None,
        }
    }

    pub fn with_org_id(mut self, org_id: Option<String>) -> Self {
        self.org_id = org_id;
        self
    }

    pub fn with_external_tenant_id(mut self, external_tenant_id: Option<String>) -> Self {
        self.external_tenant_id = external_tenant_id;
        self
    }

    pub fn with_additional_data(mut self, additional_data: Option<Value>) -> Self {
        self.additional_data = additional_data;
        self
    }
}

impl std::fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewCredential")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("org_id", &self.org_id)
            .field("external_tenant_id", &self.external_tenant_id)
            .finish()
    }
}

/// A stored credential row. Tokens are ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: i64,
    pub tenant_id: String,
    pub integration: IntegrationType,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub org_id: Option<String>,
    pub external_tenant_id: Option<String>,
    pub additional_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decrypted, still-valid credential.
#[derive(Clone, PartialEq)]
pub struct DecryptedCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub org_id: Option<String>,
    pub external_tenant_id: Option<String>,
    pub additional_data: Option<Value>,
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("org_id", &self.org_id)
            .field("external_tenant_id", &self.external_tenant_id)
            .finish()
    }
}

/// Credential whose access token has expired. Only the refresh token is
/// decrypted, so the caller can drive a refresh.
#[derive(Clone, PartialEq)]
pub struct ExpiredCredential {
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub org_id: Option<String>,
    pub external_tenant_id: Option<String>,
    pub additional_data: Option<Value>,
}

impl std::fmt::Debug for ExpiredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiredCredential")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of [`CredentialVault::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialLookup {
    Active(DecryptedCredential),
    Expired(ExpiredCredential),
}

impl CredentialLookup {
    pub fn is_expired(&self) -> bool {
        matches!(self, CredentialLookup::Expired(_))
    }
}
