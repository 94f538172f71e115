use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::BillingError;

/// Local subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Overdue,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Overdue => "overdue",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "overdue" => Ok(SubscriptionStatus::Overdue),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(BillingError::UnknownStatus(other.to_string())),
        }
    }
}

/// A locally recorded paid-plan subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,

    /// Provider-assigned identifier; records without one cannot be reconciled
    pub external_id: Option<String>,

    pub owner_id: String,
    pub status: SubscriptionStatus,

    /// Plan label chosen at checkout (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn new_pending(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        external_id: Option<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            external_id,
            owner_id: owner_id.into(),
            status: SubscriptionStatus::Pending,
            plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = status;
        self
    }

    /// External identifier usable for a provider lookup, if any.
    pub fn reconcilable_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Per-run reconciliation counts. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub total: u32,
    pub updated: u32,
    pub deleted: u32,
    pub unchanged: u32,
    /// Pending records without an external identifier
    pub skipped: u32,
    /// Provider or store errors; the record stays pending for the next run
    pub failed: u32,
    /// Owners whose pending records could not be read (multi-owner runs only)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_owners: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ReconcileSummary {
    pub fn message(&self) -> String {
        format!(
            "Reconciled {} pending subscriptions: {} updated, {} deleted",
            self.total, self.updated, self.deleted
        )
    }

    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.total += other.total;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.failed_owners += other.failed_owners;
    }
}
