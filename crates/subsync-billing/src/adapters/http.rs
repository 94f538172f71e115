use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::BillingError;
use crate::provider::{PaymentProvider, ProviderPayment, SubscriptionLookup};
use crate::status::ProviderStatus;

pub const DEFAULT_API_KEY_HEADER: &str = "access_token";

/// Longest slice of an error body kept in `BillingError::ProviderStatus`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// REST base, e.g. `https://api.asaas.com/v3`
    pub base_url: String,
    pub api_key: String,
    /// Header carrying the API key
    pub api_key_header: String,
    /// Request timeout; `None` keeps the HTTP client default
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            timeout: None,
            user_agent: concat!("subsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionBody {
    #[serde(default)]
    status: Option<ProviderStatus>,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct PaymentList {
    #[serde(default)]
    data: Vec<ProviderPayment>,
}

/// REST client for the payment provider.
pub struct HttpPaymentProvider {
    http_client: Client,
    base_url: Url,
    api_key_header: HeaderName,
    api_key: HeaderValue,
}

impl HttpPaymentProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, BillingError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            BillingError::invalid_config(format!(
                "invalid provider base_url '{}': {e}",
                config.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BillingError::invalid_config(format!(
                "provider base_url '{}' cannot be a base",
                config.base_url
            )));
        }

        let api_key_header = HeaderName::from_bytes(config.api_key_header.as_bytes())
            .map_err(|e| BillingError::invalid_config(format!("invalid api_key_header: {e}")))?;
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| BillingError::invalid_config(format!("invalid api_key: {e}")))?;
        api_key.set_sensitive(true);

        let mut builder = Client::builder().user_agent(config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| BillingError::invalid_config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key_header,
            api_key,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BillingError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BillingError::invalid_config("provider base_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, BillingError> {
        debug!(url = %url, "Provider request");
        self.http_client
            .get(url)
            .header(self.api_key_header.clone(), self.api_key.clone())
            .send()
            .await
            .map_err(|e| BillingError::ProviderRequest(e.to_string()))
    }

    async fn status_error(response: Response) -> BillingError {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        BillingError::ProviderStatus { status, body }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn subscription_status(
        &self,
        external_id: &str,
    ) -> Result<SubscriptionLookup, BillingError> {
        let url = self.endpoint(&["subscriptions", external_id])?;
        let response = self.get(url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(SubscriptionLookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: SubscriptionBody = response
            .json()
            .await
            .map_err(|e| BillingError::ProviderResponse(e.to_string()))?;

        // Removed subscriptions are still served, flagged rather than 404'd
        if body.deleted {
            return Ok(SubscriptionLookup::Found(Some(ProviderStatus::Deleted)));
        }
        Ok(SubscriptionLookup::Found(body.status))
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ProviderPayment>, BillingError> {
        let mut url = self.endpoint(&["payments"])?;
        url.query_pairs_mut()
            .append_pair("externalReference", reference);
        let response = self.get(url).await?;

        // A search with no match answers 200 with empty data; any other
        // status, 404 included, is a provider fault.
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let list: PaymentList = response
            .json()
            .await
            .map_err(|e| BillingError::ProviderResponse(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .find(|payment| payment.external_reference.as_deref() == Some(reference)))
    }
}
