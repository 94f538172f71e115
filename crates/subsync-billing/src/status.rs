//! Provider status vocabulary and its translation into local statuses.
//!
//! Two translation tables exist. Subscription lookups are authoritative only
//! for values they recognise, so unknown values map to nothing and leave the
//! local record alone. Payment lookups are a fallback for subscriptions the
//! provider no longer knows about, and every value there resolves to some
//! local status.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::SubscriptionStatus;

/// Status reported by the payment provider for a subscription or a payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderStatus {
    Active,
    Confirmed,
    Received,
    ReceivedInCash,
    Pending,
    Overdue,
    Expired,
    Inactive,
    Cancelled,
    Deleted,
    Refunded,
    /// Any value outside the known vocabulary, kept verbatim for logging
    Unrecognized(String),
}

impl ProviderStatus {
    /// Parse a provider value. Matching is case-insensitive and never fails.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "CONFIRMED" => Self::Confirmed,
            "RECEIVED" => Self::Received,
            "RECEIVED_IN_CASH" => Self::ReceivedInCash,
            "PENDING" => Self::Pending,
            "OVERDUE" => Self::Overdue,
            "EXPIRED" => Self::Expired,
            "INACTIVE" => Self::Inactive,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            "DELETED" => Self::Deleted,
            "REFUNDED" => Self::Refunded,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Received => "RECEIVED",
            Self::ReceivedInCash => "RECEIVED_IN_CASH",
            Self::Pending => "PENDING",
            Self::Overdue => "OVERDUE",
            Self::Expired => "EXPIRED",
            Self::Inactive => "INACTIVE",
            Self::Cancelled => "CANCELLED",
            Self::Deleted => "DELETED",
            Self::Refunded => "REFUNDED",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Translation for subscription-level lookups.
    ///
    /// Returns `None` for unrecognized values: the record is left untouched.
    pub fn subscription_mapping(&self) -> Option<SubscriptionStatus> {
        match self {
            Self::Active | Self::Confirmed | Self::Received | Self::ReceivedInCash => {
                Some(SubscriptionStatus::Active)
            }
            Self::Pending => Some(SubscriptionStatus::Pending),
            Self::Overdue => Some(SubscriptionStatus::Overdue),
            Self::Expired | Self::Inactive | Self::Cancelled | Self::Deleted | Self::Refunded => {
                Some(SubscriptionStatus::Expired)
            }
            Self::Unrecognized(_) => None,
        }
    }

    /// Translation for payment-level fallback lookups.
    pub fn payment_mapping(&self) -> SubscriptionStatus {
        match self {
            Self::Confirmed | Self::Received | Self::ReceivedInCash => SubscriptionStatus::Active,
            Self::Pending => SubscriptionStatus::Pending,
            Self::Overdue => SubscriptionStatus::Overdue,
            Self::Active
            | Self::Expired
            | Self::Inactive
            | Self::Cancelled
            | Self::Deleted
            | Self::Refunded
            | Self::Unrecognized(_) => SubscriptionStatus::Expired,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ProviderStatus {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for ProviderStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
