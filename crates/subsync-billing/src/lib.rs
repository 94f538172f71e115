//! Subscription reconciliation against an external payment provider.
//!
//! - [`store`]: the `SubscriptionStore` trait implemented by storage backends
//! - [`provider`]: the `PaymentProvider` trait and lookup results
//! - [`adapters`]: the REST implementation of `PaymentProvider`
//! - [`status`]: provider status vocabulary and translation tables
//! - [`reconciler`]: the per-owner reconciliation run
//! - [`scheduler`]: periodic reconciliation of every owner
//! - [`webhook`]: provider-pushed payment events

pub mod adapters;
pub mod error;
pub mod provider;
pub mod reconciler;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod types;
pub mod webhook;

pub use adapters::{DEFAULT_API_KEY_HEADER, HttpPaymentProvider, HttpProviderConfig};
pub use error::BillingError;
pub use provider::{
    DynPaymentProvider, PaymentProvider, ProviderPayment, Resolution, SubscriptionLookup,
};
pub use reconciler::{RecordAction, RecordOutcome, Reconciler, plan_action};
pub use scheduler::ReconcileScheduler;
pub use status::ProviderStatus;
pub use store::{DynSubscriptionStore, SubscriptionStore};
pub use types::*;
pub use webhook::{PaymentEvent, WebhookOutcome, apply_payment_event};
