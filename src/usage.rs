//! Monthly usage ledger.
//!
//! The ledger mirrors the stored counter locally so callers can cheaply ask whether the quota is
//! exhausted, while the authoritative check-and-increment happens in the account store. One
//! ledger is shared by all work spawned from a single request.

use crate::backend::{AccountStore, BackendError, UsageIncrement};
use crate::plans::{Limit, PlanId};
use crate::session::SessionSnapshot;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Anonymous sessions have no counter to charge.
    #[error("Please sign in to continue.")]
    Anonymous,
    /// The account store failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result of [`UsageLedger::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// One operation was charged; the counter now holds the contained value.
    Applied(u64),
    /// The quota was already used up; nothing was charged.
    LimitReached,
}

/// Billing period key (`YYYY-MM`, UTC) for the current instant.
pub fn current_period() -> String {
    period_of(OffsetDateTime::now_utc())
}

/// Billing period key for an arbitrary instant.
pub fn period_of(instant: OffsetDateTime) -> String {
    let utc = instant.to_offset(time::UtcOffset::UTC);
    format!("{:04}-{:02}", utc.year(), u8::from(utc.month()))
}

/// Usage counter for one account and billing period.
pub struct UsageLedger {
    accounts: Arc<dyn AccountStore>,
    uid: Option<String>,
    plan: PlanId,
    period: String,
    quota: Limit,
    count: AtomicU64,
}

impl UsageLedger {
    /// Seed a ledger from a resolved session.
    pub fn new(session: &SessionSnapshot, accounts: Arc<dyn AccountStore>) -> Self {
        Self {
            accounts,
            uid: session.uid().map(str::to_string),
            plan: session.plan,
            period: session.period.clone(),
            quota: session.plan.limits().monthly_operations,
            count: AtomicU64::new(session.usage),
        }
    }

    /// Whether the quota is used up. An unbounded quota never trips.
    pub fn check_limit(&self) -> bool {
        self.quota.is_exhausted_at(self.count())
    }

    /// Charge one operation through the store's conditional increment.
    pub async fn increment(&self) -> Result<IncrementOutcome, LedgerError> {
        let uid = self.uid.as_deref().ok_or(LedgerError::Anonymous)?;
        if self.check_limit() {
            return Ok(IncrementOutcome::LimitReached);
        }
        match self
            .accounts
            .try_increment_usage(uid, &self.period, self.quota)
            .await?
        {
            UsageIncrement::Applied(count) => {
                self.count.store(count, Ordering::SeqCst);
                tracing::info!(uid, period = %self.period, usage = count, "Usage incremented");
                Ok(IncrementOutcome::Applied(count))
            }
            UsageIncrement::LimitReached => {
                if let Some(bound) = self.quota.bound() {
                    self.count.fetch_max(bound, Ordering::SeqCst);
                }
                tracing::info!(uid, plan = %self.plan, "Usage increment refused at quota");
                Ok(IncrementOutcome::LimitReached)
            }
        }
    }

    /// Undo one charge after the billed operation failed.
    pub async fn rollback(&self) -> Result<u64, LedgerError> {
        let uid = self.uid.as_deref().ok_or(LedgerError::Anonymous)?;
        let count = self.accounts.decrement_usage(uid, &self.period).await?;
        self.count.store(count, Ordering::SeqCst);
        tracing::info!(uid, period = %self.period, usage = count, "Usage rolled back");
        Ok(count)
    }

    /// Operations consumed in the current period.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// The plan's monthly quota.
    pub fn quota(&self) -> Limit {
        self.quota
    }

    /// Operations left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.quota
            .bound()
            .map(|bound| bound.saturating_sub(self.count()))
    }

    /// Plan the ledger charges against.
    pub fn plan(&self) -> PlanId {
        self.plan
    }
}
