//! Subscription plans, their limits, and the pricing catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

const MEGABYTE: u64 = 1024 * 1024;

/// Identifier of a subscription plan as stored in account documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    /// Trial plan assigned to every new account.
    #[default]
    Free,
    /// Entry paid plan.
    Starter,
    /// Higher volume paid plan with document exports.
    Pro,
    /// Unlimited operations for teams.
    Business,
    /// Negotiated contract, no limits.
    Enterprise,
    /// Bespoke arrangement, no limits.
    Custom,
}

impl PlanId {
    /// Every plan, in pricing order.
    pub const ALL: [PlanId; 6] = [
        PlanId::Free,
        PlanId::Starter,
        PlanId::Pro,
        PlanId::Business,
        PlanId::Enterprise,
        PlanId::Custom,
    ];

    /// Stable identifier used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
            Self::Custom => "custom",
        }
    }

    /// Parse a stored plan identifier, resolving anything unknown to [`PlanId::Free`].
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|()| {
            tracing::warn!(plan = value, "Unknown plan identifier; using free plan limits");
            PlanId::Free
        })
    }

    /// Static limits attached to the plan.
    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                monthly_operations: Limit::Bounded(3),
                max_file_bytes: Limit::Bounded(5 * MEGABYTE),
                max_pdf_pages: Limit::Bounded(1),
            },
            Self::Starter => PlanLimits {
                monthly_operations: Limit::Bounded(200),
                max_file_bytes: Limit::Bounded(50 * MEGABYTE),
                max_pdf_pages: Limit::Bounded(20),
            },
            Self::Pro => PlanLimits {
                monthly_operations: Limit::Bounded(3000),
                max_file_bytes: Limit::Bounded(100 * MEGABYTE),
                max_pdf_pages: Limit::Bounded(100),
            },
            Self::Business => PlanLimits {
                monthly_operations: Limit::Unbounded,
                max_file_bytes: Limit::Bounded(500 * MEGABYTE),
                max_pdf_pages: Limit::Bounded(1000),
            },
            Self::Enterprise | Self::Custom => PlanLimits {
                monthly_operations: Limit::Unbounded,
                max_file_bytes: Limit::Unbounded,
                max_pdf_pages: Limit::Unbounded,
            },
        }
    }

    /// Whether PDF and Word exports are available on this plan.
    pub fn can_export_documents(&self) -> bool {
        matches!(self, Self::Pro | Self::Business | Self::Enterprise)
    }
}

impl std::str::FromStr for PlanId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            "enterprise" => Ok(Self::Enterprise),
            "custom" => Ok(Self::Custom),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric ceiling that may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Values strictly above the bound are rejected.
    Bounded(u64),
    /// No ceiling.
    Unbounded,
}

impl Limit {
    /// Whether `value` fits within the limit (equal is accepted).
    pub fn admits(&self, value: u64) -> bool {
        match self {
            Self::Bounded(bound) => value <= *bound,
            Self::Unbounded => true,
        }
    }

    /// Whether a counter at `value` has used the whole allowance.
    pub fn is_exhausted_at(&self, value: u64) -> bool {
        match self {
            Self::Bounded(bound) => value >= *bound,
            Self::Unbounded => false,
        }
    }

    /// The bound, if any.
    pub fn bound(&self) -> Option<u64> {
        match self {
            Self::Bounded(bound) => Some(*bound),
            Self::Unbounded => None,
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bound().serialize(serializer)
    }
}

/// Per-plan ceilings enforced at upload and processing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    /// Billed operations per billing period.
    pub monthly_operations: Limit,
    /// Largest accepted upload, in bytes.
    pub max_file_bytes: Limit,
    /// Largest accepted PDF, in pages.
    pub max_pdf_pages: Limit,
}

impl PlanLimits {
    /// Upload size limit in whole megabytes, for user-facing messages.
    pub fn max_file_megabytes(&self) -> Option<u64> {
        self.max_file_bytes.bound().map(|bytes| bytes / MEGABYTE)
    }
}

/// How a plan is obtained from the pricing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAcquisition {
    /// Switch immediately, no payment.
    Free,
    /// Pay through the checkout flow.
    Checkout,
    /// Reach out to sales.
    ContactSales,
}

/// One entry of the pricing catalog.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOffer {
    /// Plan identifier.
    pub id: PlanId,
    /// Display name.
    pub name: &'static str,
    /// Monthly price in US cents, when the plan has a list price.
    pub monthly_price_cents: Option<u32>,
    /// One-line pitch.
    pub description: &'static str,
    /// Feature bullets.
    pub features: &'static [&'static str],
    /// How the plan is obtained.
    pub acquisition: PlanAcquisition,
    /// Limits attached to the plan.
    pub limits: PlanLimits,
    /// Whether PDF/Word export is included.
    pub document_exports: bool,
}

impl PlanOffer {
    /// Price label such as `$12`, or `Contact us` for negotiated plans.
    pub fn price_label(&self) -> String {
        match self.monthly_price_cents {
            Some(cents) if cents % 100 == 0 => format!("${}", cents / 100),
            Some(cents) => format!("${}.{:02}", cents / 100, cents % 100),
            None => "Contact us".to_string(),
        }
    }
}

const FREE_FEATURES: &[&str] = &[
    "3 operations",
    "5 MB maximum file size",
    "1 PDF page",
    "Text extraction from images",
];
const STARTER_FEATURES: &[&str] = &[
    "200 operations per month",
    "50 MB maximum file size",
    "20 PDF pages",
    "TXT downloads",
];
const PRO_FEATURES: &[&str] = &[
    "3000 operations per month",
    "100 MB maximum file size",
    "100 PDF pages",
    "TXT, PDF and DOCX exports",
];
const BUSINESS_FEATURES: &[&str] = &[
    "Unlimited operations",
    "500 MB maximum file size",
    "1000 PDF pages",
    "API access",
];
const NEGOTIATED_FEATURES: &[&str] = &[
    "Unlimited operations",
    "No file size limit",
    "No page limit",
];

/// Look up the catalog entry for a plan.
pub fn offer(plan: PlanId) -> PlanOffer {
    let (name, monthly_price_cents, description, features, acquisition) = match plan {
        PlanId::Free => (
            "Free",
            Some(0),
            "For trying things out and light personal use.",
            FREE_FEATURES,
            PlanAcquisition::Free,
        ),
        PlanId::Starter => (
            "Starter",
            Some(500),
            "Your entry point for everyday use.",
            STARTER_FEATURES,
            PlanAcquisition::Checkout,
        ),
        PlanId::Pro => (
            "Pro",
            Some(1200),
            "For students and freelancers who need throughput.",
            PRO_FEATURES,
            PlanAcquisition::Checkout,
        ),
        PlanId::Business => (
            "Business",
            Some(4900),
            "Complete tooling for growing teams.",
            BUSINESS_FEATURES,
            PlanAcquisition::Checkout,
        ),
        PlanId::Enterprise => (
            "Enterprise",
            None,
            "Negotiated limits and support.",
            NEGOTIATED_FEATURES,
            PlanAcquisition::ContactSales,
        ),
        PlanId::Custom => (
            "Custom",
            None,
            "Arrangements tailored to a single customer.",
            NEGOTIATED_FEATURES,
            PlanAcquisition::ContactSales,
        ),
    };

    PlanOffer {
        id: plan,
        name,
        monthly_price_cents,
        description,
        features,
        acquisition,
        limits: plan.limits(),
        document_exports: plan.can_export_documents(),
    }
}

/// Full pricing catalog in display order.
pub fn catalog() -> Vec<PlanOffer> {
    PlanId::ALL.into_iter().map(offer).collect()
}
