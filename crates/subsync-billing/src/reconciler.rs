//! Reconciliation of pending subscriptions against the payment provider.
//!
//! Per record, the transition is one of:
//!
//! - pending -> active | overdue | expired, from the mapped provider status
//! - pending -> deleted, when neither a subscription nor a payment exists upstream
//! - unchanged, when the mapped status equals the stored one or is unknown
//!
//! Failures are isolated per record. A record that fails stays pending and is
//! picked up again by the next run.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::BillingError;
use crate::provider::{DynPaymentProvider, Resolution};
use crate::status::ProviderStatus;
use crate::store::DynSubscriptionStore;
use crate::types::{ReconcileSummary, Subscription, SubscriptionStatus};

/// What to do with one local record given the provider's view of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Update(SubscriptionStatus),
    Delete,
    Unchanged,
}

/// Fate of one record within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Updated(SubscriptionStatus),
    Deleted,
    Unchanged,
    Skipped,
    Failed,
}

impl ReconcileSummary {
    pub fn record(&mut self, outcome: RecordOutcome) {
        self.total += 1;
        match outcome {
            RecordOutcome::Updated(_) => self.updated += 1,
            RecordOutcome::Deleted => self.deleted += 1,
            RecordOutcome::Unchanged => self.unchanged += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Failed => self.failed += 1,
        }
    }
}

/// Decide the action for a record currently in `current`.
pub fn plan_action(current: SubscriptionStatus, resolution: &Resolution) -> RecordAction {
    let target = match resolution {
        Resolution::Subscription(status) => {
            status.as_ref().and_then(ProviderStatus::subscription_mapping)
        }
        Resolution::Payment(status) => Some(
            status
                .as_ref()
                .map_or(SubscriptionStatus::Expired, ProviderStatus::payment_mapping),
        ),
        Resolution::Missing => return RecordAction::Delete,
    };

    match target {
        Some(status) if status != current => RecordAction::Update(status),
        _ => RecordAction::Unchanged,
    }
}

/// Drives reconciliation runs with injected store and provider
#[derive(Clone)]
pub struct Reconciler {
    store: DynSubscriptionStore,
    provider: DynPaymentProvider,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(store: DynSubscriptionStore, provider: DynPaymentProvider) -> Self {
        Self {
            store,
            provider,
            concurrency: 1,
        }
    }

    /// Bound the number of records reconciled at once. 1 means sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &DynSubscriptionStore {
        &self.store
    }

    /// Reconcile every pending subscription of one owner.
    ///
    /// Fails only when the pending records cannot be read.
    pub async fn reconcile_owner(&self, owner_id: &str) -> Result<ReconcileSummary, BillingError> {
        let pending = self.store.fetch_pending(owner_id).await?;

        info!(
            owner_id,
            pending = pending.len(),
            concurrency = self.concurrency,
            "Reconciling pending subscriptions"
        );

        let outcomes: Vec<RecordOutcome> = stream::iter(pending)
            .map(|subscription| {
                let this = self.clone();
                async move { this.reconcile_one(subscription).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = ReconcileSummary::default();
        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            owner_id,
            total = summary.total,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            "Reconciliation finished"
        );

        Ok(summary)
    }

    /// Reconcile every owner that has pending subscriptions.
    ///
    /// An owner whose records cannot be read is logged and left for the next
    /// run; the remaining owners are still processed.
    pub async fn reconcile_all(&self) -> Result<ReconcileSummary, BillingError> {
        let owners = self.store.list_pending_owners().await?;
        let mut summary = ReconcileSummary::default();

        for owner_id in &owners {
            match self.reconcile_owner(owner_id).await {
                Ok(owner_summary) => summary.merge(&owner_summary),
                Err(e) => {
                    error!(owner_id = %owner_id, error = %e, "Reconciliation aborted for owner");
                    summary.failed_owners += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn reconcile_one(&self, subscription: Subscription) -> RecordOutcome {
        let Some(external_id) = subscription.reconcilable_id() else {
            debug!(
                subscription_id = %subscription.id,
                "No external id, skipping"
            );
            return RecordOutcome::Skipped;
        };

        let resolution = match self.provider.resolve(external_id).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(
                    subscription_id = %subscription.id,
                    external_id,
                    error = %e,
                    "Provider lookup failed, record left pending"
                );
                return RecordOutcome::Failed;
            }
        };

        if let Resolution::Subscription(Some(ProviderStatus::Unrecognized(raw))) = &resolution {
            warn!(
                subscription_id = %subscription.id,
                external_id,
                provider_status = %raw,
                "Unrecognized provider status, record left unchanged"
            );
        }

        match plan_action(subscription.status, &resolution) {
            RecordAction::Unchanged => RecordOutcome::Unchanged,
            RecordAction::Update(status) => {
                match self.store.update_status(&subscription.id, status).await {
                    Ok(true) => {
                        info!(
                            subscription_id = %subscription.id,
                            from = %subscription.status,
                            to = %status,
                            "Subscription status updated"
                        );
                        RecordOutcome::Updated(status)
                    }
                    Ok(false) => {
                        debug!(subscription_id = %subscription.id, "Subscription vanished before update");
                        RecordOutcome::Unchanged
                    }
                    Err(e) => {
                        error!(
                            subscription_id = %subscription.id,
                            error = %e,
                            "Failed to update subscription status"
                        );
                        RecordOutcome::Failed
                    }
                }
            }
            RecordAction::Delete => match self.store.delete(&subscription.id).await {
                Ok(true) => {
                    info!(
                        subscription_id = %subscription.id,
                        external_id,
                        "Deleted orphan subscription"
                    );
                    RecordOutcome::Deleted
                }
                Ok(false) => {
                    debug!(subscription_id = %subscription.id, "Orphan already removed");
                    RecordOutcome::Unchanged
                }
                Err(e) => {
                    error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to delete orphan subscription"
                    );
                    RecordOutcome::Failed
                }
            },
        }
    }
}
