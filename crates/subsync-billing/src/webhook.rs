//! Provider-pushed payment events.
//!
//! The provider notifies us of payment changes out of band. An event carries
//! the payment, which references the subscription it belongs to and our own
//! cross-reference key; either can locate the local record.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BillingError;
use crate::status::ProviderStatus;
use crate::store::SubscriptionStore;
use crate::types::SubscriptionStatus;

/// Events after which the subscription can no longer be considered paid
const TERMINAL_EVENTS: &[&str] = &["PAYMENT_DELETED", "PAYMENT_REFUNDED"];

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub event: String,
    #[serde(default)]
    pub payment: Option<EventPayment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub status: Option<ProviderStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub received: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    pub updated: bool,
}

impl WebhookOutcome {
    fn unmatched() -> Self {
        Self {
            received: true,
            matched: false,
            subscription_id: None,
            status: None,
            updated: false,
        }
    }
}

impl PaymentEvent {
    /// Local status implied by this event, if any.
    pub fn target_status(&self) -> Option<SubscriptionStatus> {
        if TERMINAL_EVENTS.contains(&self.event.as_str()) {
            return Some(SubscriptionStatus::Expired);
        }
        self.payment
            .as_ref()?
            .status
            .as_ref()
            .map(ProviderStatus::payment_mapping)
    }

    /// Provider ids that may identify the local record, most specific first.
    fn lookup_keys(&self) -> Vec<&str> {
        let Some(payment) = &self.payment else {
            return Vec::new();
        };
        [payment.subscription.as_deref(), payment.external_reference.as_deref()]
            .into_iter()
            .flatten()
            .filter(|key| !key.trim().is_empty())
            .collect()
    }
}

/// Apply a payment event to the local store.
pub async fn apply_payment_event(
    store: &dyn SubscriptionStore,
    event: &PaymentEvent,
) -> Result<WebhookOutcome, BillingError> {
    let mut found = None;
    for key in event.lookup_keys() {
        if let Some(subscription) = store.find_by_external_id(key).await? {
            found = Some(subscription);
            break;
        }
    }

    let Some(subscription) = found else {
        debug!(event = %event.event, "Payment event matches no local subscription");
        return Ok(WebhookOutcome::unmatched());
    };

    let target = event.target_status();
    let mut outcome = WebhookOutcome {
        received: true,
        matched: true,
        subscription_id: Some(subscription.id.clone()),
        status: Some(subscription.status),
        updated: false,
    };

    if let Some(status) = target
        && status != subscription.status
    {
        outcome.updated = store.update_status(&subscription.id, status).await?;
        if outcome.updated {
            outcome.status = Some(status);
            info!(
                subscription_id = %subscription.id,
                event = %event.event,
                from = %subscription.status,
                to = %status,
                "Subscription status updated from payment event"
            );
        }
    }

    Ok(outcome)
}
