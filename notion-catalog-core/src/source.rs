//! Notion database adapter.
//!
//! Issues the "active products" query, follows pagination cursors until the
//! store reports completion, and runs every returned page through the
//! normalizer. Only a failing query is an error; broken records are excluded
//! (see [`crate::normalize`]).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::NotionConfig;
use crate::contract::ProductSource;
use crate::error::CatalogError;
use crate::normalize::{normalize_batch, NormalizedBatch};
use crate::product::Product;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Product source backed by a Notion database. Built once from config and
/// passed into whatever needs products; holds a single HTTP client.
pub struct NotionSource {
    config: NotionConfig,
    client: Client,
}

impl NotionSource {
    pub fn new(config: NotionConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &NotionConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        // avoid "//" when joining paths
        self.config.base_url.trim_end_matches('/')
    }

    fn query_body(&self, cursor: Option<&str>) -> serde_json::Value {
        let mut body = json!({
            "filter": {
                "property": self.config.active_property,
                "checkbox": { "equals": true }
            },
            "page_size": self.config.page_size,
        });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        body
    }

    /// Runs the paginated query and normalizes every page, keeping the
    /// exclusions alongside the products.
    pub async fn fetch_batch(&self) -> Result<NormalizedBatch, CatalogError> {
        let url = format!(
            "{}/v1/databases/{}/query",
            self.base_url(),
            self.config.database_id
        );
        let mut batch = NormalizedBatch::default();
        let mut cursor: Option<String> = None;
        let mut requests = 0usize;

        loop {
            requests += 1;
            debug!(url = %url, cursor = ?cursor, request = requests, "Querying Notion database");
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_token)
                .header("Notion-Version", &self.config.notion_version)
                .json(&self.query_body(cursor.as_deref()))
                .send()
                .await
                .map_err(|e| {
                    error!(error = ?e, url = %url, "Failed to send Notion query");
                    CatalogError::Upstream(format!("failed to query {url}: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<failed to decode response body>"));
                error!(status = %status, url = %url, "Notion API returned error. Response body: {body}");
                return Err(CatalogError::Upstream(format!(
                    "Notion API returned {status}: {body}"
                )));
            }

            let page: QueryResponse = response.json().await.map_err(|e| {
                error!(error = ?e, url = %url, "Failed to parse Notion query response");
                CatalogError::Upstream(format!("malformed query response: {e}"))
            })?;

            batch.extend(normalize_batch(&page.results, &self.config.fields));

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        info!(
            requests,
            products = batch.products.len(),
            excluded = batch.exclusions.len(),
            "Retrieved active products from Notion"
        );
        Ok(batch)
    }

    /// Sets (or clears, with `None`) the price of a single page.
    pub async fn update_price(&self, page_id: &str, price: Option<f64>) -> Result<(), CatalogError> {
        let url = format!("{}/v1/pages/{}", self.base_url(), page_id);
        let mut properties = serde_json::Map::new();
        properties.insert(self.config.fields.price.clone(), json!({ "number": price }));
        let body = json!({ "properties": properties });
        info!(page_id, ?price, "Updating product price in Notion");

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.config.api_token)
            .header("Notion-Version", &self.config.notion_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url = %url, "Failed to send price update");
                CatalogError::Upstream(format!("failed to update {url}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to decode response body>"));
            error!(status = %status, page_id, "Notion API rejected price update. Response body: {body}");
            return Err(CatalogError::Upstream(format!(
                "Notion API returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductSource for NotionSource {
    async fn fetch_active_products(&self) -> Result<Vec<Product>, CatalogError> {
        let batch = self.fetch_batch().await?;
        batch.trace_summary();
        Ok(batch.products)
    }
}
