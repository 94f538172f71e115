use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BillingError;
use crate::status::ProviderStatus;

/// Result of looking a subscription up by its provider id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionLookup {
    /// The provider knows the subscription; the status may be absent
    Found(Option<ProviderStatus>),
    /// HTTP 404
    NotFound,
}

/// A payment as returned by the provider's payment search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayment {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,

    /// Cross-reference key set by us when the payment was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProviderStatus>,
}

/// Authoritative provider view of one local subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Subscription-level status (None when the provider omitted it)
    Subscription(Option<ProviderStatus>),
    /// Subscription unknown, but a payment carries the cross-reference
    Payment(Option<ProviderStatus>),
    /// Neither a subscription nor a payment exists upstream
    Missing,
}

/// Read-only client for the payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Look up a subscription by provider id.
    ///
    /// A 404 is `Ok(NotFound)`; any other non-2xx response is an error.
    async fn subscription_status(
        &self,
        external_id: &str,
    ) -> Result<SubscriptionLookup, BillingError>;

    /// Search payments by cross-reference key and return the first payment
    /// carrying exactly that key. Any non-2xx response is an error.
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ProviderPayment>, BillingError>;

    /// Resolve a local subscription against the provider.
    ///
    /// Falls back to the payment search when the subscription lookup 404s.
    async fn resolve(&self, external_id: &str) -> Result<Resolution, BillingError> {
        match self.subscription_status(external_id).await? {
            SubscriptionLookup::Found(status) => Ok(Resolution::Subscription(status)),
            SubscriptionLookup::NotFound => {
                debug!(external_id, "Subscription not found upstream, searching payments");
                match self.find_payment_by_reference(external_id).await? {
                    Some(payment) => {
                        debug!(
                            external_id,
                            payment_id = %payment.id,
                            status = ?payment.status,
                            "Matched payment by cross-reference"
                        );
                        Ok(Resolution::Payment(payment.status))
                    }
                    None => Ok(Resolution::Missing),
                }
            }
        }
    }
}

/// Type alias for a shareable provider instance.
pub type DynPaymentProvider = Arc<dyn PaymentProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        lookup: SubscriptionLookup,
        payment: Option<ProviderPayment>,
    }

    #[async_trait]
    impl PaymentProvider for Fixed {
        async fn subscription_status(
            &self,
            _external_id: &str,
        ) -> Result<SubscriptionLookup, BillingError> {
            Ok(self.lookup.clone())
        }

        async fn find_payment_by_reference(
            &self,
            _reference: &str,
        ) -> Result<Option<ProviderPayment>, BillingError> {
            Ok(self.payment.clone())
        }
    }

    fn payment(status: &str) -> ProviderPayment {
        ProviderPayment {
            id: "pay_1".into(),
            subscription: None,
            external_reference: Some("sub_1".into()),
            status: Some(ProviderStatus::parse(status)),
        }
    }

    #[tokio::test]
    async fn found_subscription_wins() {
        let provider = Fixed {
            lookup: SubscriptionLookup::Found(Some(ProviderStatus::Active)),
            payment: Some(payment("OVERDUE")),
        };
        assert_eq!(
            provider.resolve("sub_1").await.unwrap(),
            Resolution::Subscription(Some(ProviderStatus::Active))
        );
    }

    #[tokio::test]
    async fn not_found_falls_back_to_payment() {
        let provider = Fixed {
            lookup: SubscriptionLookup::NotFound,
            payment: Some(payment("OVERDUE")),
        };
        assert_eq!(
            provider.resolve("sub_1").await.unwrap(),
            Resolution::Payment(Some(ProviderStatus::Overdue))
        );
    }

    #[tokio::test]
    async fn not_found_anywhere_is_missing() {
        let provider = Fixed {
            lookup: SubscriptionLookup::NotFound,
            payment: None,
        };
        assert_eq!(provider.resolve("sub_1").await.unwrap(), Resolution::Missing);
    }
}
