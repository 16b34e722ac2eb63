//! Plan selection with a mocked checkout, and contact-sales requests.

use crate::backend::{AccountStore, BackendError, Identity};
use crate::plans::{PlanAcquisition, PlanId, PlanOffer, offer};
use crate::session::SessionSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const MAX_SUBJECT_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 5000;

/// Payment provider chosen at checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    /// Card payments.
    #[default]
    Stripe,
    /// PayPal wallet.
    #[serde(rename = "paypal")]
    PayPal,
    /// Tap Payments.
    Tap,
}

impl FromStr for PaymentGateway {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::PayPal),
            "tap" => Ok(Self::Tap),
            other => Err(BillingError::UnknownGateway(other.to_string())),
        }
    }
}

/// Errors raised by billing operations.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Plan changes require a signed-in user.
    #[error("Please sign in to continue.")]
    SignInRequired,
    /// The gateway name is not recognized.
    #[error("Unknown payment gateway: {0}")]
    UnknownGateway(String),
    /// The payment was declined.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    /// A contact request field is missing or invalid.
    #[error("Invalid contact request: {0}")]
    InvalidContact(String),
    /// Storing the new plan failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Proof of a completed (mock) charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    /// Receipt identifier.
    pub receipt_id: Uuid,
    /// Gateway used.
    pub gateway: PaymentGateway,
    /// Plan purchased.
    pub plan: PlanId,
    /// Amount charged, in US cents.
    pub amount_cents: u32,
}

/// Charges a customer for a plan.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Charge `payer` for one month of `offer` through `gateway`.
    async fn charge(
        &self,
        gateway: PaymentGateway,
        payer: &Identity,
        offer: &PlanOffer,
    ) -> Result<PaymentReceipt, BillingError>;
}

/// Payment processor that approves every charge without contacting a gateway.
#[derive(Debug, Default)]
pub struct MockPaymentProcessor;

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn charge(
        &self,
        gateway: PaymentGateway,
        payer: &Identity,
        offer: &PlanOffer,
    ) -> Result<PaymentReceipt, BillingError> {
        let receipt = PaymentReceipt {
            receipt_id: Uuid::new_v4(),
            gateway,
            plan: offer.id,
            amount_cents: offer.monthly_price_cents.unwrap_or_default(),
        };
        tracing::info!(
            uid = %payer.uid,
            plan = %offer.id,
            gateway = ?gateway,
            amount_cents = receipt.amount_cents,
            receipt = %receipt.receipt_id,
            "Mock payment approved"
        );
        Ok(receipt)
    }
}

/// Result of a plan selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The user is already on this plan.
    Unchanged {
        /// Current plan.
        plan: PlanId,
    },
    /// Switched to a plan that needs no payment.
    Activated {
        /// New plan.
        plan: PlanId,
    },
    /// Paid and switched.
    Paid {
        /// New plan.
        plan: PlanId,
        /// Charge receipt.
        receipt: PaymentReceipt,
    },
    /// The plan is sold through sales; nothing changed.
    ContactSales {
        /// Requested plan.
        plan: PlanId,
        /// Next step for the user.
        message: String,
    },
}

/// Contact-sales form.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRequest {
    /// Sender name.
    #[serde(default)]
    pub name: Option<String>,
    /// Reply address; defaults to the signed-in user's email.
    #[serde(default)]
    pub email: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
}

/// Acknowledgement of a contact request.
#[derive(Debug, Clone, Serialize)]
pub struct ContactTicket {
    /// Ticket identifier.
    pub ticket_id: Uuid,
    /// Confirmation text.
    pub message: &'static str,
}

/// Plan changes and sales contact.
#[derive(Clone)]
pub struct BillingService {
    accounts: Arc<dyn AccountStore>,
    payments: Arc<dyn PaymentProcessor>,
}

impl BillingService {
    /// Create a billing service.
    pub fn new(accounts: Arc<dyn AccountStore>, payments: Arc<dyn PaymentProcessor>) -> Self {
        Self { accounts, payments }
    }

    /// Move the session's user to `plan`, charging through `gateway` when the plan is paid.
    pub async fn select_plan(
        &self,
        session: &SessionSnapshot,
        plan: PlanId,
        gateway: Option<PaymentGateway>,
    ) -> Result<CheckoutOutcome, BillingError> {
        let identity = session
            .identity
            .as_ref()
            .ok_or(BillingError::SignInRequired)?;
        if session.plan == plan {
            return Ok(CheckoutOutcome::Unchanged { plan });
        }

        let offer = offer(plan);
        match offer.acquisition {
            PlanAcquisition::ContactSales => Ok(CheckoutOutcome::ContactSales {
                plan,
                message: format!(
                    "The {} plan is arranged with our sales team. Send us a message to get started.",
                    offer.name
                ),
            }),
            PlanAcquisition::Free => {
                self.accounts.set_plan(&identity.uid, plan).await?;
                tracing::info!(uid = %identity.uid, from = %session.plan, to = %plan, "Plan changed");
                Ok(CheckoutOutcome::Activated { plan })
            }
            PlanAcquisition::Checkout => {
                let gateway = gateway.unwrap_or_default();
                let receipt = self.payments.charge(gateway, identity, &offer).await?;
                self.accounts.set_plan(&identity.uid, plan).await?;
                tracing::info!(uid = %identity.uid, from = %session.plan, to = %plan, "Plan purchased");
                Ok(CheckoutOutcome::Paid { plan, receipt })
            }
        }
    }

    /// Record a contact-sales request.
    pub fn contact(
        &self,
        session: &SessionSnapshot,
        request: ContactRequest,
    ) -> Result<ContactTicket, BillingError> {
        let subject = request.subject.trim();
        let message = request.message.trim();
        if subject.is_empty() {
            return Err(BillingError::InvalidContact("subject is required".into()));
        }
        if message.is_empty() {
            return Err(BillingError::InvalidContact("message is required".into()));
        }
        if subject.chars().count() > MAX_SUBJECT_CHARS {
            return Err(BillingError::InvalidContact(format!(
                "subject exceeds {MAX_SUBJECT_CHARS} characters"
            )));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(BillingError::InvalidContact(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let reply_to = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .or_else(|| session.identity.as_ref().and_then(|id| id.email.clone()));
        if reply_to.as_deref().is_some_and(|email| !email.contains('@')) {
            return Err(BillingError::InvalidContact("email is not valid".into()));
        }

        let ticket = ContactTicket {
            ticket_id: Uuid::new_v4(),
            message: "Thanks for reaching out! We will get back to you as soon as possible.",
        };
        tracing::info!(
            ticket = %ticket.ticket_id,
            uid = session.uid().unwrap_or("anonymous"),
            name = request.name.as_deref().unwrap_or(""),
            reply_to = reply_to.as_deref().unwrap_or(""),
            subject,
            message_chars = message.chars().count(),
            "Contact request received"
        );
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    async fn signed_in(plan: PlanId) -> (BillingService, Arc<MemoryBackend>, SessionSnapshot) {
        let store = Arc::new(MemoryBackend::new());
        store.create_account("u1", Some("a@example.com")).await.expect("account");
        store.set_plan("u1", plan).await.expect("plan");
        let service = BillingService::new(store.clone(), Arc::new(MockPaymentProcessor));
        let session = SessionSnapshot {
            identity: Some(Identity {
                uid: "u1".into(),
                email: Some("a@example.com".into()),
            }),
            plan,
            usage: 0,
            period: "2026-10".into(),
        };
        (service, store, session)
    }

    async fn stored_plan(store: &MemoryBackend) -> PlanId {
        store.load_account("u1").await.expect("load").expect("account").plan
    }

    #[tokio::test]
    async fn paid_plans_charge_then_switch() {
        let (service, store, session) = signed_in(PlanId::Free).await;
        let outcome = service
            .select_plan(&session, PlanId::Pro, Some(PaymentGateway::Tap))
            .await
            .expect("checkout");
        match outcome {
            CheckoutOutcome::Paid { plan, receipt } => {
                assert_eq!(plan, PlanId::Pro);
                assert_eq!(receipt.gateway, PaymentGateway::Tap);
                assert_eq!(receipt.amount_cents, 1200);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(stored_plan(&store).await, PlanId::Pro);
    }

    #[tokio::test]
    async fn gateway_defaults_to_stripe() {
        let (service, _, session) = signed_in(PlanId::Free).await;
        let outcome = service
            .select_plan(&session, PlanId::Starter, None)
            .await
            .expect("checkout");
        assert!(matches!(
            outcome,
            CheckoutOutcome::Paid { receipt, .. } if receipt.gateway == PaymentGateway::Stripe
        ));
    }

    #[tokio::test]
    async fn negotiated_and_current_plans_do_not_change_anything() {
        let (service, store, session) = signed_in(PlanId::Starter).await;
        assert!(matches!(
            service.select_plan(&session, PlanId::Enterprise, None).await,
            Ok(CheckoutOutcome::ContactSales { .. })
        ));
        assert_eq!(
            service.select_plan(&session, PlanId::Starter, None).await.expect("same"),
            CheckoutOutcome::Unchanged { plan: PlanId::Starter }
        );
        assert_eq!(stored_plan(&store).await, PlanId::Starter);

        assert_eq!(
            service.select_plan(&session, PlanId::Free, None).await.expect("downgrade"),
            CheckoutOutcome::Activated { plan: PlanId::Free }
        );
        assert_eq!(stored_plan(&store).await, PlanId::Free);
    }

    #[tokio::test]
    async fn anonymous_checkout_requires_sign_in() {
        let (service, _, _) = signed_in(PlanId::Free).await;
        let anonymous = SessionSnapshot::anonymous("2026-10".into());
        assert!(matches!(
            service.select_plan(&anonymous, PlanId::Pro, None).await,
            Err(BillingError::SignInRequired)
        ));
    }

    #[tokio::test]
    async fn contact_requires_subject_and_message() {
        let (service, _, session) = signed_in(PlanId::Free).await;
        let request = |subject: &str, message: &str| ContactRequest {
            name: None,
            email: None,
            subject: subject.into(),
            message: message.into(),
        };
        assert!(matches!(
            service.contact(&session, request(" ", "hello")),
            Err(BillingError::InvalidContact(_))
        ));
        assert!(matches!(
            service.contact(&session, request("Pricing", "")),
            Err(BillingError::InvalidContact(_))
        ));
        assert!(service.contact(&session, request("Pricing", "Enterprise quote?")).is_ok());
    }

    #[test]
    fn gateways_parse_by_name() {
        assert_eq!("PayPal".parse::<PaymentGateway>().expect("paypal"), PaymentGateway::PayPal);
        assert!(matches!(
            "bitcoin".parse::<PaymentGateway>(),
            Err(BillingError::UnknownGateway(_))
        ));
        assert_eq!(
            serde_json::to_value(PaymentGateway::PayPal).expect("json"),
            serde_json::json!("paypal")
        );
    }
}
