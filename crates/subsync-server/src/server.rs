use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use subsync_billing::{
    DynPaymentProvider, DynSubscriptionStore, HttpPaymentProvider, ReconcileScheduler, Reconciler,
};
use subsync_db_postgres::PostgresSubscriptionStore;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::AuthState;
use crate::config::{AppConfig, StorageBackend};
use crate::handlers;
use crate::state::AppState;

pub struct SubsyncServer {
    addr: SocketAddr,
    app: Router,
    reconciler: Arc<Reconciler>,
    scheduler_every: Option<std::time::Duration>,
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/api/subscriptions/sync", post(handlers::sync_subscriptions))
        .route("/webhooks/payments", post(handlers::payment_webhook))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynSubscriptionStore>,
    provider: Option<DynPaymentProvider>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
            provider: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use this store instead of the configured backend.
    pub fn with_store(mut self, store: DynSubscriptionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this provider instead of the configured REST client.
    pub fn with_provider(mut self, provider: DynPaymentProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub async fn build(self) -> anyhow::Result<SubsyncServer> {
        let cfg = self.config;

        let store = match self.store {
            Some(store) => store,
            None => create_store(&cfg).await?,
        };
        let provider: DynPaymentProvider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(
                HttpPaymentProvider::new(cfg.provider.to_http_config())
                    .context("payment provider client")?,
            ),
        };

        let reconciler = Arc::new(
            Reconciler::new(store, provider).with_concurrency(cfg.reconcile.concurrency),
        );
        let state = AppState::new(
            reconciler.clone(),
            AuthState::new(&cfg.auth),
            cfg.webhook.clone(),
        );
        let app = build_app(&cfg, state);

        Ok(SubsyncServer {
            addr: self.addr,
            app,
            reconciler,
            scheduler_every: cfg.reconcile.interval(),
        })
    }
}

async fn create_store(cfg: &AppConfig) -> anyhow::Result<DynSubscriptionStore> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory subscription store; data is lost on restart");
            Ok(subsync_db_memory::create_store())
        }
        StorageBackend::Postgres => {
            let pg = cfg
                .storage
                .postgres
                .as_ref()
                .context("storage.postgres is required for the postgres backend")?;
            let store = PostgresSubscriptionStore::connect(pg)
                .await
                .context("connecting to PostgreSQL")?;
            Ok(Arc::new(store))
        }
    }
}

impl SubsyncServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let scheduler: Option<JoinHandle<()>> = self
            .scheduler_every
            .map(|every| ReconcileScheduler::new(self.reconciler.clone()).spawn(every));

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = scheduler {
            handle.abort();
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
