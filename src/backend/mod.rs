//! Identity and account storage behind trait seams.
//!
//! Authentication and per-user account documents live in a hosted backend. The service only
//! needs a handful of operations from it, captured by [`IdentityProvider`] and [`AccountStore`].
//! Two implementations exist: REST clients for Firebase Authentication and Firestore, and a
//! process-local [`MemoryBackend`] used for development and tests.

mod firestore;
mod identity;
mod memory;

use crate::config::{BackendProvider, Config};
use crate::plans::{Limit, PlanId};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub use firestore::FirestoreAccountStore;
pub use identity::IdentityToolkitClient;
pub use memory::MemoryBackend;

/// Errors surfaced by identity and account backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The presented token is missing, expired or revoked.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),
    /// Email/password combination was rejected.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Sign-up attempted with an email that already has an account.
    #[error("An account with this email already exists")]
    EmailInUse,
    /// The backend refused the request for a reason the caller can fix.
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// The requested account document does not exist.
    #[error("Account not found: {0}")]
    NotFound(String),
    /// Conditional writes kept losing to concurrent updates.
    #[error("Concurrent update conflict: {0}")]
    Contention(String),
    /// The backend could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with an unexpected error status.
    #[error("Backend request failed: {0}")]
    RequestFailed(String),
    /// The backend response could not be decoded.
    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),
}

/// Authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Stable user identifier.
    pub uid: String,
    /// Email address, when the provider knows it.
    pub email: Option<String>,
}

/// Tokens returned by a successful sign-up or sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    /// The signed-in principal.
    pub identity: Identity,
    /// Bearer token for subsequent requests.
    pub id_token: String,
    /// Token used to obtain a fresh `id_token`.
    pub refresh_token: String,
    /// Lifetime of `id_token` in seconds.
    pub expires_in: u64,
}

/// Per-user account document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    /// Owner of the document.
    pub uid: String,
    /// Email recorded at creation.
    pub email: Option<String>,
    /// Current subscription plan.
    pub plan: PlanId,
    /// Operations consumed in `usage_period`.
    pub monthly_usage: u64,
    /// Billing period (`YYYY-MM`) the counter belongs to.
    pub usage_period: Option<String>,
}

impl AccountRecord {
    /// Fresh free-plan document.
    pub fn new(uid: &str, email: Option<&str>) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.map(str::to_string),
            plan: PlanId::Free,
            monthly_usage: 0,
            usage_period: None,
        }
    }

    /// Usage attributed to `period`; counters from other periods read as zero.
    pub fn usage_in(&self, period: &str) -> u64 {
        match self.usage_period.as_deref() {
            Some(stored) if stored == period => self.monthly_usage,
            _ => 0,
        }
    }
}

/// Outcome of a conditional usage increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageIncrement {
    /// The counter was incremented to the contained value.
    Applied(u64),
    /// The counter was already at its quota; nothing was written.
    LimitReached,
}

/// Verifies bearer tokens and performs email authentication.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer ID token to its principal.
    async fn verify(&self, id_token: &str) -> Result<Identity, BackendError>;

    /// Create an email/password account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;
}

/// Reads and mutates per-user account documents.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Load an account document, returning `None` when it does not exist.
    async fn load_account(&self, uid: &str) -> Result<Option<AccountRecord>, BackendError>;

    /// Create a free-plan document, returning the existing one if it is already present.
    async fn create_account(
        &self,
        uid: &str,
        email: Option<&str>,
    ) -> Result<AccountRecord, BackendError>;

    /// Replace the stored plan.
    async fn set_plan(&self, uid: &str, plan: PlanId) -> Result<(), BackendError>;

    /// Atomically increment the usage counter unless it has reached `quota`.
    ///
    /// A counter stored for a different period is treated as zero and replaced.
    async fn try_increment_usage(
        &self,
        uid: &str,
        period: &str,
        quota: Limit,
    ) -> Result<UsageIncrement, BackendError>;

    /// Decrement the usage counter for `period`, never going below zero. Returns the new count.
    async fn decrement_usage(&self, uid: &str, period: &str) -> Result<u64, BackendError>;
}

/// Identity provider and account store pair used by the service.
#[derive(Clone)]
pub struct Backend {
    /// Token verification and email authentication.
    pub identity: Arc<dyn IdentityProvider>,
    /// Account documents.
    pub accounts: Arc<dyn AccountStore>,
}

impl Backend {
    /// Backend whose identity and accounts both live in one in-memory store.
    pub fn in_memory(store: Arc<MemoryBackend>) -> Self {
        Self {
            identity: store.clone(),
            accounts: store,
        }
    }
}

/// Build the backend selected by `BACKEND_PROVIDER`.
pub fn build_backend(config: &Config) -> Backend {
    match config.backend_provider {
        BackendProvider::Memory => {
            tracing::warn!("Using in-memory backend; accounts are lost on restart");
            Backend::in_memory(Arc::new(MemoryBackend::new()))
        }
        BackendProvider::Firebase => {
            let project_id = config.firebase_project_id.clone().unwrap_or_default();
            let api_key = config.firebase_api_key.clone().unwrap_or_default();
            Backend {
                identity: Arc::new(IdentityToolkitClient::new(
                    config.identity_base_url.clone(),
                    api_key.clone(),
                )),
                accounts: Arc::new(FirestoreAccountStore::new(
                    config.firestore_base_url.clone(),
                    project_id,
                    api_key,
                )),
            }
        }
    }
}
