/// `load_config` module: loads the static YAML config and maps it onto the
/// core's [`CatalogConfig`] and [`NotionConfig`].
///
/// The YAML file holds no secrets. The Notion token and database id come
/// from the environment (`NOTION_API_TOKEN`, `NOTION_DATABASE_ID`) and are
/// only required by commands that actually talk to the store, so `list` and
/// `generate --selection` work without them.
///
/// Relative `template_dir` / `output_dir` entries are resolved against the
/// directory containing the config file, not the current working directory.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use notion_catalog_core::config::{CatalogConfig, NotionConfig, OutputConfig, RenderConfig};
use notion_catalog_core::normalize::FieldMap;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub const TOKEN_ENV: &str = "NOTION_API_TOKEN";
pub const DATABASE_ID_ENV: &str = "NOTION_DATABASE_ID";

/// Notion API page size limit.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotionSection {
    pub base_url: Option<String>,
    pub page_size: Option<u32>,
    pub active_property: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug)]
pub struct CliConfig {
    pub notion: NotionSection,
    pub catalog: CatalogConfig,
    pub fields: FieldMap,
}

impl CliConfig {
    /// Builds the store connection settings, reading secrets from the
    /// environment.
    pub fn notion_config(&self) -> Result<NotionConfig> {
        let api_token = require_env(TOKEN_ENV)?;
        let database_id = require_env(DATABASE_ID_ENV)?;

        let mut config = NotionConfig::new(api_token, database_id);
        if let Some(base_url) = &self.notion.base_url {
            config = config.with_base_url(base_url.trim_end_matches('/'));
        }
        if let Some(page_size) = self.notion.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                warn!(page_size, max = MAX_PAGE_SIZE, "page_size out of range, clamping");
            }
            config.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        }
        if let Some(active_property) = &self.notion.active_property {
            config.active_property = active_property.clone();
        }
        if let Some(timeout_secs) = self.notion.timeout_secs {
            config.timeout = Duration::from_secs(timeout_secs);
        }
        config.fields = self.fields.clone();
        config.trace_loaded();
        Ok(config)
    }
}

fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => {
            error!(env = key, "Required environment variable missing");
            Err(anyhow!("{key} must be set in the environment or .env file"))
        }
    }
}

fn resolve_against(base: &Path, dir: PathBuf) -> PathBuf {
    if dir.is_relative() {
        base.join(dir)
    } else {
        dir
    }
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        #[serde(default)]
        notion: NotionSection,
        render: RenderConfig,
        output: OutputConfig,
        #[serde(default)]
        fields: FieldMap,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let base = path_ref.parent().unwrap_or_else(|| Path::new(""));
    let mut render = raw.render;
    render.template_dir = resolve_against(base, render.template_dir);
    let mut output = raw.output;
    output.output_dir = resolve_against(base, output.output_dir);

    let catalog = CatalogConfig { render, output };
    catalog.trace_loaded();

    Ok(CliConfig {
        notion: raw.notion,
        catalog,
        fields: raw.fields,
    })
}
