use super::{
    AccountRecord, AccountStore, AuthSession, BackendError, Identity, IdentityProvider,
    UsageIncrement,
};
use crate::plans::{Limit, PlanId};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const TOKEN_LIFETIME_SECS: u64 = 3600;
const MIN_PASSWORD_CHARS: usize = 6;

struct StoredUser {
    uid: String,
    email: String,
    password_hash: String,
}

/// Process-local identity provider and account store.
///
/// Each map entry locks independently, which makes the usage increment a true
/// check-and-increment without a global lock. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    users: DashMap<String, StoredUser>,
    tokens: DashMap<String, Identity>,
    accounts: DashMap<String, AccountRecord>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_session(&self, uid: &str, email: &str) -> AuthSession {
        let identity = Identity {
            uid: uid.to_string(),
            email: Some(email.to_string()),
        };
        let id_token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(id_token.clone(), identity.clone());
        AuthSession {
            identity,
            id_token,
            refresh_token: Uuid::new_v4().simple().to_string(),
            expires_in: TOKEN_LIFETIME_SECS,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(uid: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn verify(&self, id_token: &str) -> Result<Identity, BackendError> {
        self.tokens
            .get(id_token)
            .map(|identity| identity.clone())
            .ok_or_else(|| BackendError::Unauthorized("INVALID_ID_TOKEN".into()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(BackendError::Rejected("INVALID_EMAIL".into()));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(BackendError::Rejected(format!(
                "WEAK_PASSWORD : Password should be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        let uid = match self.users.entry(email.clone()) {
            Entry::Occupied(_) => return Err(BackendError::EmailInUse),
            Entry::Vacant(slot) => {
                let uid = Uuid::new_v4().simple().to_string();
                slot.insert(StoredUser {
                    uid: uid.clone(),
                    email: email.clone(),
                    password_hash: hash_password(&uid, password),
                });
                uid
            }
        };
        Ok(self.issue_session(&uid, &email))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let email = normalize_email(email);
        let (uid, stored_email) = {
            let user = self
                .users
                .get(&email)
                .ok_or(BackendError::InvalidCredentials)?;
            if user.password_hash != hash_password(&user.uid, password) {
                return Err(BackendError::InvalidCredentials);
            }
            (user.uid.clone(), user.email.clone())
        };
        Ok(self.issue_session(&uid, &stored_email))
    }
}

#[async_trait]
impl AccountStore for MemoryBackend {
    async fn load_account(&self, uid: &str) -> Result<Option<AccountRecord>, BackendError> {
        Ok(self.accounts.get(uid).map(|record| record.clone()))
    }

    async fn create_account(
        &self,
        uid: &str,
        email: Option<&str>,
    ) -> Result<AccountRecord, BackendError> {
        let record = self
            .accounts
            .entry(uid.to_string())
            .or_insert_with(|| AccountRecord::new(uid, email));
        Ok(record.clone())
    }

    async fn set_plan(&self, uid: &str, plan: PlanId) -> Result<(), BackendError> {
        let mut record = self
            .accounts
            .get_mut(uid)
            .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
        record.plan = plan;
        Ok(())
    }

    async fn try_increment_usage(
        &self,
        uid: &str,
        period: &str,
        quota: Limit,
    ) -> Result<UsageIncrement, BackendError> {
        let mut record = self
            .accounts
            .get_mut(uid)
            .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
        let current = record.usage_in(period);
        if quota.is_exhausted_at(current) {
            return Ok(UsageIncrement::LimitReached);
        }
        record.monthly_usage = current + 1;
        record.usage_period = Some(period.to_string());
        Ok(UsageIncrement::Applied(current + 1))
    }

    async fn decrement_usage(&self, uid: &str, period: &str) -> Result<u64, BackendError> {
        let mut record = self
            .accounts
            .get_mut(uid)
            .ok_or_else(|| BackendError::NotFound(uid.to_string()))?;
        let current = record.usage_in(period);
        if current == 0 {
            return Ok(0);
        }
        record.monthly_usage = current - 1;
        Ok(current - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn sign_up_then_sign_in_and_verify() {
        let backend = MemoryBackend::new();
        let created = backend
            .sign_up("Ada@Example.com", "correct horse")
            .await
            .expect("sign up");
        let signed_in = backend
            .sign_in("ada@example.com", "correct horse")
            .await
            .expect("sign in");
        assert_eq!(created.identity.uid, signed_in.identity.uid);

        let identity = backend.verify(&signed_in.id_token).await.expect("verify");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn duplicate_and_bad_credentials_are_rejected() {
        let backend = MemoryBackend::new();
        backend
            .sign_up("a@example.com", "secret1")
            .await
            .expect("sign up");
        assert!(matches!(
            backend.sign_up("a@example.com", "secret2").await,
            Err(BackendError::EmailInUse)
        ));
        assert!(matches!(
            backend.sign_in("a@example.com", "wrong!!").await,
            Err(BackendError::InvalidCredentials)
        ));
        assert!(matches!(
            backend.sign_up("b@example.com", "123").await,
            Err(BackendError::Rejected(_))
        ));
        assert!(matches!(
            backend.verify("made-up").await,
            Err(BackendError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_increments_never_exceed_quota() {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_account("u1", None).await.expect("create");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let backend = backend.clone();
            tasks.push(tokio::spawn(async move {
                backend
                    .try_increment_usage("u1", "2026-10", Limit::Bounded(3))
                    .await
                    .expect("increment")
            }));
        }
        let mut applied = 0;
        for task in tasks {
            if matches!(task.await.expect("join"), UsageIncrement::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 3);
        let record = backend.load_account("u1").await.expect("load").expect("present");
        assert_eq!(record.usage_in("2026-10"), 3);
    }

    #[tokio::test]
    async fn decrement_floors_at_zero() {
        let backend = MemoryBackend::new();
        backend.create_account("u1", None).await.expect("create");
        backend
            .try_increment_usage("u1", "2026-10", Limit::Unbounded)
            .await
            .expect("increment");
        assert_eq!(backend.decrement_usage("u1", "2026-10").await.expect("dec"), 0);
        assert_eq!(backend.decrement_usage("u1", "2026-10").await.expect("dec"), 0);
    }

    #[tokio::test]
    async fn create_account_keeps_existing_document() {
        let backend = MemoryBackend::new();
        backend.create_account("u1", Some("a@example.com")).await.expect("create");
        backend.set_plan("u1", PlanId::Pro).await.expect("plan");
        let again = backend.create_account("u1", None).await.expect("create");
        assert_eq!(again.plan, PlanId::Pro);
        assert_eq!(again.email.as_deref(), Some("a@example.com"));
    }
}
