//! In-memory subscription store for subsync.
//!
//! Backed by a `DashMap` keyed by local subscription id. Intended for local
//! development and tests; nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use subsync_db_memory::InMemorySubscriptionStore;
//! use subsync_billing::{Subscription, SubscriptionStore};
//!
//! let store = InMemorySubscriptionStore::new();
//! store.insert(&Subscription::new_pending("s1", "owner", Some("sub_1".into()))).await?;
//! let pending = store.fetch_pending("owner").await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use subsync_billing::{BillingError, Subscription, SubscriptionStatus, SubscriptionStore};
use time::OffsetDateTime;

/// In-memory subscription store.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    rows: DashMap<String, Subscription>,
    /// Successful `update_status` and `delete` calls
    mutations: AtomicU64,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing rows.
    pub fn with_rows(rows: impl IntoIterator<Item = Subscription>) -> Self {
        let store = Self::new();
        for row in rows {
            store.rows.insert(row.id.clone(), row);
        }
        store
    }

    /// Number of rows mutated so far (updates and deletes).
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn fetch_pending(&self, owner_id: &str) -> Result<Vec<Subscription>, BillingError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.owner_id == owner_id && row.status == SubscriptionStatus::Pending)
            .map(|row| row.value().clone())
            .collect())
    }

    async fn update_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool, BillingError> {
        match self.rows.get_mut(id) {
            Some(mut row) => {
                row.status = status;
                row.updated_at = OffsetDateTime::now_utc();
                self.mutations.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, BillingError> {
        let removed = self.rows.remove(id).is_some();
        if removed {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn insert(&self, subscription: &Subscription) -> Result<(), BillingError> {
        match self.rows.entry(subscription.id.clone()) {
            Entry::Occupied(_) => Err(BillingError::store(format!(
                "subscription '{}' already exists",
                subscription.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(subscription.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>, BillingError> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>, BillingError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.external_id.as_deref() == Some(external_id))
            .map(|row| row.value().clone()))
    }

    async fn list_pending_owners(&self) -> Result<Vec<String>, BillingError> {
        let mut owners: Vec<String> = self
            .rows
            .iter()
            .filter(|row| row.status == SubscriptionStatus::Pending)
            .map(|row| row.owner_id.clone())
            .collect();
        owners.sort();
        owners.dedup();
        Ok(owners)
    }
}

/// Creates a new shareable in-memory store.
pub fn create_store() -> Arc<InMemorySubscriptionStore> {
    Arc::new(InMemorySubscriptionStore::new())
}
