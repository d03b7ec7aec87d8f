use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::normalize::FieldMap;

pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_ACTIVE_PROPERTY: &str = "Catálogo Ativo";
pub const DEFAULT_TEMPLATE_NAME: &str = "catalog.html";
pub const DEFAULT_PRICE_ON_REQUEST: &str = "Preço sob consulta";
pub const DEFAULT_CURRENCY: &str = "R$";
pub const DEFAULT_SOURCE_TAG: &str = "ja_distribuidora";

/// Connection settings for the Notion database holding the products.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_token: String,
    pub database_id: String,
    pub base_url: String,
    pub notion_version: String,
    pub page_size: u32,
    /// Checkbox property that marks a product as part of the catalog.
    pub active_property: String,
    pub timeout: Duration,
    pub fields: FieldMap,
}

impl NotionConfig {
    pub fn new(api_token: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            database_id: database_id.into(),
            base_url: DEFAULT_NOTION_BASE_URL.to_string(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            page_size: 100,
            active_property: DEFAULT_ACTIVE_PROPERTY.to_string(),
            timeout: Duration::from_secs(30),
            fields: FieldMap::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Shape checks only; a failing check is logged, never fatal.
    pub fn trace_loaded(&self) {
        if !looks_like_notion_token(&self.api_token) {
            warn!("NOTION_API_TOKEN does not look like a Notion integration token");
        }
        if !looks_like_database_id(&self.database_id) {
            warn!(database_id = %self.database_id, "NOTION_DATABASE_ID is not a 32 hex digit id");
        }
        info!(
            base_url = %self.base_url,
            database_id = %self.database_id,
            page_size = self.page_size,
            active_property = %self.active_property,
            "Loaded Notion config"
        );
    }
}

/// Integration tokens are `secret_...` (legacy) or `ntn_...`.
pub fn looks_like_notion_token(token: &str) -> bool {
    (token.starts_with("secret_") || token.starts_with("ntn_")) && token.len() > 40
}

pub fn looks_like_database_id(id: &str) -> bool {
    let clean: String = id.chars().filter(|c| *c != '-').collect();
    clean.len() == 32 && clean.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub template_dir: PathBuf,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default = "default_price_on_request")]
    pub price_on_request: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl RenderConfig {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            template_name: default_template_name(),
            price_on_request: default_price_on_request(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl OutputConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_tag: default_source_tag(),
        }
    }
}

/// Everything the generation pipeline needs, minus store credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub render: RenderConfig,
    pub output: OutputConfig,
}

impl CatalogConfig {
    pub fn trace_loaded(&self) {
        info!(
            template_dir = %self.render.template_dir.display(),
            template_name = %self.render.template_name,
            output_dir = %self.output.output_dir.display(),
            "Loaded catalog config"
        );
        debug!(?self, "Catalog config loaded (full debug)");
    }
}

fn default_template_name() -> String {
    DEFAULT_TEMPLATE_NAME.to_string()
}

fn default_price_on_request() -> String {
    DEFAULT_PRICE_ON_REQUEST.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_source_tag() -> String {
    DEFAULT_SOURCE_TAG.to_string()
}
