use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::error::BillingError;
use crate::reconciler::Reconciler;
use crate::types::ReconcileSummary;

/// Periodically reconciles every owner with pending subscriptions
pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Start processing loop
    pub async fn run(&self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = every.as_secs(), "Reconcile scheduler started");

        loop {
            ticker.tick().await;

            match self.tick().await {
                Ok(summary) => {
                    if summary.total > 0 || summary.failed_owners > 0 {
                        info!(
                            total = summary.total,
                            updated = summary.updated,
                            deleted = summary.deleted,
                            failed = summary.failed,
                            failed_owners = summary.failed_owners,
                            "Scheduled reconciliation finished"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "Scheduled reconciliation failed");
                }
            }
        }
    }

    /// Run a single reconciliation pass over all owners
    pub async fn tick(&self) -> Result<ReconcileSummary, BillingError> {
        self.reconciler.reconcile_all().await
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(every).await })
    }
}
