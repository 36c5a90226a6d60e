//! HTTP clients for the external collaborators.

use crate::config::{CatalogConfig, IdentityConfig, ProcessorConfig};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::types::{CatalogTitle, MemberId, Plan, TitleId};
use serde::Deserialize;
use serde_json::json;

/// Payment processor management API client.
#[derive(Clone)]
pub struct HttpProcessorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProcessorClient {
    /// Build a client from configuration.
    #[must_use]
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn expect_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CoreError::Processor(format!("{context}: {status} {body}")))
    }
}

#[derive(Deserialize)]
struct CheckoutSessionBody {
    url: String,
}

impl ProcessorClient for HttpProcessorClient {
    async fn create_checkout(&self, member: MemberId, plan: &Plan) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "mode": "subscription",
                "client_reference_id": member.to_string(),
                "price": plan.external_price_ref,
                "metadata": { "price_ref": plan.external_price_ref },
            }))
            .send()
            .await
            .map_err(|e| CoreError::Processor(format!("checkout creation failed: {e}")))?;

        let body: CheckoutSessionBody = Self::expect_success(response, "checkout creation")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Processor(format!("checkout response malformed: {e}")))?;
        Ok(body.url)
    }

    async fn cancel_subscription(&self, external_ref: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/v1/subscriptions/{external_ref}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CoreError::Processor(format!("cancellation failed: {e}")))?;

        Self::expect_success(response, "cancellation").await?;
        Ok(())
    }

    async fn schedule_cancellation(&self, external_ref: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/v1/subscriptions/{external_ref}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "cancel_at_period_end": true }))
            .send()
            .await
            .map_err(|e| CoreError::Processor(format!("cancellation scheduling failed: {e}")))?;

        Self::expect_success(response, "cancellation scheduling").await?;
        Ok(())
    }

    async fn resume_subscription(&self, external_ref: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/v1/subscriptions/{external_ref}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "cancel_at_period_end": false }))
            .send()
            .await
            .map_err(|e| CoreError::Processor(format!("resume failed: {e}")))?;

        Self::expect_success(response, "resume").await?;
        Ok(())
    }
}

/// Auth-layer identity directory client.
#[derive(Clone)]
pub struct HttpIdentityDirectory {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl HttpIdentityDirectory {
    /// Build a client from configuration.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }
}

impl IdentityDirectory for HttpIdentityDirectory {
    async fn delete_identity(&self, member: MemberId) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/admin/users/{member}", self.base_url))
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| CoreError::store(format!("identity deletion failed: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(CoreError::not_found("Identity")),
            status => Err(CoreError::store(format!(
                "identity deletion failed: {status}"
            ))),
        }
    }
}

/// Catalog metadata service client.
#[derive(Clone)]
pub struct HttpCatalogResolver {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogResolver {
    /// Build a client from configuration.
    #[must_use]
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CatalogTitleBody {
    id: TitleId,
    name: String,
}

impl CatalogResolver for HttpCatalogResolver {
    async fn resolve_title(&self, id: TitleId) -> Result<CatalogTitle> {
        let response = self
            .http
            .get(format!("{}/titles/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| CoreError::store(format!("catalog lookup failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {
                let body: CatalogTitleBody = response
                    .json()
                    .await
                    .map_err(|e| CoreError::store(format!("catalog response malformed: {e}")))?;
                Ok(CatalogTitle {
                    id: body.id,
                    name: body.name,
                })
            }
            reqwest::StatusCode::NOT_FOUND => Err(CoreError::not_found("CatalogTitle")),
            status => Err(CoreError::store(format!("catalog lookup failed: {status}"))),
        }
    }
}
