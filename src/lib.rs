//! Account identity service.
//!
//! Resolves identifiers to canonical accounts, issues and checks
//! verification codes, normalizes external provider identities, runs
//! the explicit merge workflow for overlapping identities, and binds
//! and unbinds authentication methods. Storage sits behind the
//! [`db::IdentityStore`] traits with Postgres and in-memory backends;
//! token issuance and transport live in the calling service.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod security;
pub mod services;
pub mod validators;

pub use error::{AuthError, Result};
pub use models::{
    Account, AccountMergeRequest, AuthBinding, AuthMethod, CodePurpose, MergeConflicts,
    MergeResolution, MergeSide, MergeStatus, MfaSettings, VerificationCode,
};
pub use services::{AuthService, RegistrationOutcome, SecondFactor};
