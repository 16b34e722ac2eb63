//! Identity, plan and usage context passed explicitly into every operation.

use crate::backend::{Backend, BackendError, Identity};
use crate::plans::{Limit, PlanId};
use crate::usage::current_period;
use serde::Serialize;
use tokio::sync::watch;

/// Point-in-time view of who is calling and what their plan allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Signed-in principal, if any.
    pub identity: Option<Identity>,
    /// Current plan.
    pub plan: PlanId,
    /// Operations consumed in `period`.
    pub usage: u64,
    /// Billing period (`YYYY-MM`).
    pub period: String,
}

impl SessionSnapshot {
    /// Signed-out session on the free plan.
    pub fn anonymous(period: String) -> Self {
        Self {
            identity: None,
            plan: PlanId::Free,
            usage: 0,
            period,
        }
    }

    /// Whether a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Identifier of the signed-in user.
    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    /// The plan's monthly quota.
    pub fn quota(&self) -> Limit {
        self.plan.limits().monthly_operations
    }

    /// Whether the quota is used up.
    pub fn limit_reached(&self) -> bool {
        self.quota().is_exhausted_at(self.usage)
    }

    /// Operations left this period, or `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.quota()
            .bound()
            .map(|bound| bound.saturating_sub(self.usage))
    }
}

/// Turns bearer tokens into [`SessionSnapshot`]s.
#[derive(Clone)]
pub struct SessionResolver {
    backend: Backend,
}

impl SessionResolver {
    /// Create a resolver over the given backend.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Resolve a session from an optional bearer token.
    ///
    /// Missing tokens yield an anonymous session; invalid ones are an error. The account document
    /// is created on first sight, and a failed plan lookup degrades to the free plan.
    pub async fn resolve(&self, id_token: Option<&str>) -> Result<SessionSnapshot, BackendError> {
        let period = current_period();
        let Some(token) = id_token.map(str::trim).filter(|token| !token.is_empty()) else {
            return Ok(SessionSnapshot::anonymous(period));
        };

        let identity = self.backend.identity.verify(token).await?;
        let account = match self.backend.accounts.load_account(&identity.uid).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => match self
                .backend
                .accounts
                .create_account(&identity.uid, identity.email.as_deref())
                .await
            {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(uid = %identity.uid, %error, "Failed to create account document");
                    None
                }
            },
            Err(error) => {
                tracing::warn!(uid = %identity.uid, %error, "Plan lookup failed; using free plan");
                None
            }
        };

        let (plan, usage) = account
            .map(|record| (record.plan, record.usage_in(&period)))
            .unwrap_or((PlanId::Free, 0));
        tracing::debug!(uid = %identity.uid, %plan, usage, "Session resolved");
        Ok(SessionSnapshot {
            identity: Some(identity),
            plan,
            usage,
            period,
        })
    }
}

/// Lifecycle of a long-lived session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Identity and plan have not been fetched yet.
    Loading,
    /// Snapshot available.
    Ready(SessionSnapshot),
}

/// Long-lived session holder for processes serving a single user.
///
/// Only the provider mutates the state; consumers get read-only receivers.
pub struct SessionProvider {
    resolver: SessionResolver,
    token: Option<String>,
    state: watch::Sender<SessionState>,
}

impl SessionProvider {
    /// Create a provider in the `Loading` state.
    pub fn new(resolver: SessionResolver, token: Option<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            resolver,
            token,
            state,
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Re-query identity and plan storage and publish the result.
    pub async fn refresh(&self) -> Result<SessionSnapshot, BackendError> {
        let snapshot = self.resolver.resolve(self.token.as_deref()).await?;
        self.state.send_replace(SessionState::Ready(snapshot.clone()));
        Ok(snapshot)
    }

    /// Current snapshot, loading it first if needed.
    pub async fn current(&self) -> Result<SessionSnapshot, BackendError> {
        let ready = match &*self.state.borrow() {
            SessionState::Ready(snapshot) => Some(snapshot.clone()),
            SessionState::Loading => None,
        };
        match ready {
            Some(snapshot) => Ok(snapshot),
            None => self.refresh().await,
        }
    }

    /// Publish a new usage count after a charge or rollback.
    pub fn record_usage(&self, usage: u64) {
        self.state.send_modify(|state| {
            if let SessionState::Ready(snapshot) = state {
                snapshot.usage = usage;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AccountRecord, AccountStore, IdentityProvider, MemoryBackend, UsageIncrement,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FailingAccounts;

    #[async_trait]
    impl AccountStore for FailingAccounts {
        async fn load_account(&self, _uid: &str) -> Result<Option<AccountRecord>, BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }

        async fn create_account(
            &self,
            _uid: &str,
            _email: Option<&str>,
        ) -> Result<AccountRecord, BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }

        async fn set_plan(&self, _uid: &str, _plan: PlanId) -> Result<(), BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }

        async fn try_increment_usage(
            &self,
            _uid: &str,
            _period: &str,
            _quota: Limit,
        ) -> Result<UsageIncrement, BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }

        async fn decrement_usage(&self, _uid: &str, _period: &str) -> Result<u64, BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn missing_token_is_anonymous_free() {
        let resolver = SessionResolver::new(Backend::in_memory(Arc::new(MemoryBackend::new())));
        let snapshot = resolver.resolve(None).await.expect("snapshot");
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.plan, PlanId::Free);
        assert_eq!(snapshot.remaining(), Some(3));
    }

    #[tokio::test]
    async fn first_resolution_creates_free_account() {
        let store = Arc::new(MemoryBackend::new());
        let auth = store.sign_up("a@example.com", "secret1").await.expect("sign up");
        let resolver = SessionResolver::new(Backend::in_memory(store.clone()));

        let snapshot = resolver
            .resolve(Some(&auth.id_token))
            .await
            .expect("snapshot");
        assert_eq!(snapshot.uid(), Some(auth.identity.uid.as_str()));
        assert_eq!(snapshot.plan, PlanId::Free);
        assert!(
            store
                .load_account(&auth.identity.uid)
                .await
                .expect("load")
                .is_some()
        );
    }

    #[tokio::test]
    async fn invalid_token_is_an_error() {
        let resolver = SessionResolver::new(Backend::in_memory(Arc::new(MemoryBackend::new())));
        assert!(matches!(
            resolver.resolve(Some("bogus")).await,
            Err(BackendError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn plan_lookup_failure_falls_back_to_free() {
        let store = Arc::new(MemoryBackend::new());
        let auth = store.sign_up("a@example.com", "secret1").await.expect("sign up");
        let resolver = SessionResolver::new(Backend {
            identity: store,
            accounts: Arc::new(FailingAccounts),
        });
        let snapshot = resolver
            .resolve(Some(&auth.id_token))
            .await
            .expect("snapshot");
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.plan, PlanId::Free);
    }

    #[tokio::test]
    async fn provider_moves_from_loading_to_ready_and_refreshes() {
        let store = Arc::new(MemoryBackend::new());
        let auth = store.sign_up("a@example.com", "secret1").await.expect("sign up");
        let provider = SessionProvider::new(
            SessionResolver::new(Backend::in_memory(store.clone())),
            Some(auth.id_token.clone()),
        );
        let receiver = provider.subscribe();
        assert_eq!(*receiver.borrow(), SessionState::Loading);

        let snapshot = provider.current().await.expect("current");
        assert_eq!(snapshot.plan, PlanId::Free);

        store
            .set_plan(&auth.identity.uid, PlanId::Pro)
            .await
            .expect("upgrade");
        provider.refresh().await.expect("refresh");
        provider.record_usage(7);
        match &*receiver.borrow() {
            SessionState::Ready(snapshot) => {
                assert_eq!(snapshot.plan, PlanId::Pro);
                assert_eq!(snapshot.usage, 7);
            }
            SessionState::Loading => panic!("provider should be ready"),
        }
    }
}
