use std::sync::Arc;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use subsync_billing::{BillingError, Subscription, SubscriptionStatus, SubscriptionStore};
use subsync_db_memory::InMemorySubscriptionStore;
use subsync_server::{AppConfig, OwnerClaims, ServerBuilder};
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "endpoint-test-secret";
const WEBHOOK_TOKEN: &str = "hook-token";

fn config(provider_base: &str, webhook_token: Option<&str>) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.provider.base_url = format!("{provider_base}/v3");
    cfg.provider.api_key = "provider-key".into();
    cfg.auth.jwt_secret = SECRET.into();
    cfg.webhook.token = webhook_token.map(str::to_string);
    cfg
}

async fn start_server(
    cfg: AppConfig,
    store: Arc<InMemorySubscriptionStore>,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let server = ServerBuilder::new()
        .with_config(cfg)
        .with_store(store)
        .build()
        .await
        .expect("build server");
    let app = server.router();

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, handle)
}

fn bearer(secret: &str, owner: &str) -> String {
    let claims = OwnerClaims {
        sub: owner.into(),
        exp: time::OffsetDateTime::now_utc().unix_timestamp() + 600,
        aud: None,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

fn pending(id: &str, owner: &str, external_id: Option<&str>) -> Subscription {
    Subscription::new_pending(id, owner, external_id.map(str::to_string))
}

async fn mount_provider(provider: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v3/subscriptions/sub_1"))
        .and(header("access_token", "provider-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "sub_1", "status": "CONFIRMED"})),
        )
        .mount(provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/subscriptions/sub_2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/payments"))
        .and(query_param("externalReference", "sub_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "pay_2", "externalReference": "sub_2", "status": "OVERDUE"}]
        })))
        .mount(provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/subscriptions/sub_3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/payments"))
        .and(query_param("externalReference", "sub_3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(provider)
        .await;
}

#[tokio::test]
async fn health_endpoints_work() {
    let provider = MockServer::start().await;
    let store = Arc::new(InMemorySubscriptionStore::new());
    let (base, shutdown_tx, handle) = start_server(config(&provider.uri(), None), store).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

struct UnreachableStore;

#[async_trait::async_trait]
impl SubscriptionStore for UnreachableStore {
    async fn fetch_pending(&self, _: &str) -> Result<Vec<Subscription>, BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn update_status(&self, _: &str, _: SubscriptionStatus) -> Result<bool, BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn delete(&self, _: &str) -> Result<bool, BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn insert(&self, _: &Subscription) -> Result<(), BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn get(&self, _: &str) -> Result<Option<Subscription>, BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn find_by_external_id(&self, _: &str) -> Result<Option<Subscription>, BillingError> {
        Err(BillingError::store("connection refused"))
    }
    async fn list_pending_owners(&self) -> Result<Vec<String>, BillingError> {
        Err(BillingError::store("connection refused"))
    }
}

#[tokio::test]
async fn readiness_reports_unreachable_store() {
    let provider = MockServer::start().await;
    let server = ServerBuilder::new()
        .with_config(config(&provider.uri(), None))
        .with_store(Arc::new(UnreachableStore))
        .build()
        .await
        .expect("build server");
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, server.router()).await;
    });

    let resp = reqwest::get(format!("http://{addr}/readyz")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "unavailable");
    assert!(body["error"].as_str().unwrap().contains("connection refused"));

    handle.abort();
}

#[tokio::test]
async fn sync_requires_valid_bearer_token() {
    let provider = MockServer::start().await;
    let store = Arc::new(InMemorySubscriptionStore::with_rows([pending(
        "s1",
        "owner-1",
        Some("sub_1"),
    )]));
    let (base, shutdown_tx, handle) =
        start_server(config(&provider.uri(), None), store.clone()).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/subscriptions/sync");

    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Authorization"));

    let resp = client
        .post(&url)
        .header("authorization", bearer("wrong-secret", "owner-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    // Nothing was touched and the provider was never called
    assert_eq!(store.mutation_count(), 0);
    assert!(provider.received_requests().await.unwrap().is_empty());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn sync_reconciles_owner_records() {
    let provider = MockServer::start().await;
    mount_provider(&provider).await;

    let store = Arc::new(InMemorySubscriptionStore::with_rows([
        pending("s1", "owner-1", Some("sub_1")),
        pending("s2", "owner-1", Some("sub_2")),
        pending("s3", "owner-1", Some("sub_3")),
        pending("s4", "owner-1", None),
        pending("s5", "owner-2", Some("sub_1")),
    ]));
    let (base, shutdown_tx, handle) =
        start_server(config(&provider.uri(), None), store.clone()).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/subscriptions/sync");

    let resp = client
        .post(&url)
        .header("authorization", bearer(SECRET, "owner-1"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 4);
    assert_eq!(body["updated"], 2);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(
        body["message"],
        "Reconciled 4 pending subscriptions: 2 updated, 1 deleted"
    );

    let status = |id: &'static str| {
        let store = store.clone();
        async move { store.get(id).await.unwrap().map(|s| s.status) }
    };
    assert_eq!(status("s1").await, Some(SubscriptionStatus::Active));
    assert_eq!(status("s2").await, Some(SubscriptionStatus::Overdue));
    assert_eq!(status("s3").await, None);
    assert_eq!(status("s4").await, Some(SubscriptionStatus::Pending));
    // Another owner's record is out of scope
    assert_eq!(status("s5").await, Some(SubscriptionStatus::Pending));

    // Second run: only the record without an external id is still pending
    let resp = client
        .post(&url)
        .header("authorization", bearer(SECRET, "owner-1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["deleted"], 0);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn payment_webhook_disabled_without_token() {
    let provider = MockServer::start().await;
    let store = Arc::new(InMemorySubscriptionStore::new());
    let (base, shutdown_tx, handle) = start_server(config(&provider.uri(), None), store).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/webhooks/payments"))
        .json(&json!({"event": "PAYMENT_CONFIRMED"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn payment_webhook_applies_events() {
    let provider = MockServer::start().await;
    let store = Arc::new(InMemorySubscriptionStore::with_rows([
        pending("s1", "owner-1", Some("sub_1")),
        pending("s2", "owner-1", Some("ref_2")),
    ]));
    let (base, shutdown_tx, handle) =
        start_server(config(&provider.uri(), Some(WEBHOOK_TOKEN)), store.clone()).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/webhooks/payments");

    let event = json!({
        "event": "PAYMENT_RECEIVED",
        "payment": {"id": "pay_1", "subscription": "sub_1", "status": "RECEIVED"}
    });

    let resp = client
        .post(&url)
        .header("asaas-access-token", "nope")
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(store.mutation_count(), 0);

    let resp = client
        .post(&url)
        .header("asaas-access-token", WEBHOOK_TOKEN)
        .json(&event)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["matched"], true);
    assert_eq!(body["updated"], true);
    assert_eq!(body["status"], "active");

    // Falls back to the cross-reference key
    let resp = client
        .post(&url)
        .header("asaas-access-token", WEBHOOK_TOKEN)
        .json(&json!({
            "event": "PAYMENT_OVERDUE",
            "payment": {"id": "pay_2", "externalReference": "ref_2", "status": "OVERDUE"}
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["subscription_id"], "s2");
    assert_eq!(body["status"], "overdue");

    let resp = client
        .post(&url)
        .header("asaas-access-token", WEBHOOK_TOKEN)
        .json(&json!({
            "event": "PAYMENT_RECEIVED",
            "payment": {"id": "pay_9", "subscription": "sub_unknown", "status": "RECEIVED"}
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["matched"], false);

    let resp = client
        .post(&url)
        .header("asaas-access-token", WEBHOOK_TOKEN)
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    assert_eq!(store.mutation_count(), 2);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
