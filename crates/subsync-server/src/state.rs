use std::sync::Arc;

use axum::extract::FromRef;
use subsync_billing::{DynSubscriptionStore, Reconciler};

use crate::auth::AuthState;
use crate::config::WebhookSettings;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: DynSubscriptionStore,
    pub reconciler: Arc<Reconciler>,
    pub auth: AuthState,
    pub webhook: Arc<WebhookSettings>,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, auth: AuthState, webhook: WebhookSettings) -> Self {
        Self {
            store: reconciler.store().clone(),
            reconciler,
            auth,
            webhook: Arc::new(webhook),
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
