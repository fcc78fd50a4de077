// Configuration surface
pub mod config;

// Error taxonomy and boundary rejections
pub mod error;

// Shared SQLite handle and schema
pub mod db;

// Identity provider signing keys and token verification
pub mod keyring;
pub mod verifier;

// Tenants, users and subject binding
pub mod identity;

// Bearer authentication strategy
pub mod auth;

// Third-party OAuth adapters
pub mod integrations;

// Encrypted credential custody
pub mod credentials;

// Startup wiring
pub mod gateway;

pub use gateway::Gateway;
