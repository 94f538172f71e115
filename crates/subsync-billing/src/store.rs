use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BillingError;
use crate::types::{Subscription, SubscriptionStatus};

/// Storage trait for locally recorded subscriptions
///
/// Every mutation is a single-row operation; callers never rely on
/// multi-row atomicity.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fetch all pending subscriptions of an owner, in no particular order.
    ///
    /// Returns an empty list when there are none. An error means the store
    /// itself could not be read.
    async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Subscription>, BillingError>;

    /// Set the status of one subscription and refresh its `updated_at`.
    ///
    /// Returns `false` when no row has this id.
    async fn update_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool, BillingError>;

    /// Hard-delete one subscription. Returns `false` when no row has this id.
    async fn delete(&self, id: &str) -> Result<bool, BillingError>;

    /// Record a new subscription
    async fn insert(&self, subscription: &Subscription) -> Result<(), BillingError>;

    /// Get a subscription by local id
    async fn get(&self, id: &str) -> Result<Option<Subscription>, BillingError>;

    /// Get a subscription by provider-assigned id
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>, BillingError>;

    /// Owners that currently have at least one pending subscription
    async fn list_pending_owners(&self) -> Result<Vec<String>, BillingError>;

    /// Checks that the store can serve reads.
    async fn ping(&self) -> Result<(), BillingError> {
        self.list_pending_owners().await.map(|_| ())
    }
}

/// Type alias for a shareable store instance.
pub type DynSubscriptionStore = Arc<dyn SubscriptionStore>;
