//! # notion-catalog CLI Interface (Module)
//!
//! Command parsing and orchestration for the `notion-catalog` binary. All
//! business logic (fetching, normalizing, rendering, compiling, persisting)
//! lives in [`notion_catalog_core`]; this module only wires configuration
//! into it and prints results.
//!
//! ## How To Use
//! - Command-line users: run the `notion-catalog` binary with `--help`.
//! - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notion_catalog_core::contract::ProductSource;
use notion_catalog_core::output::{format_file_size, OutputManager};
use notion_catalog_core::pipeline::CatalogPipeline;
use notion_catalog_core::source::NotionSource;
use notion_catalog_core::{CatalogError, GeneratedArtifact, GenerationError, Product, Stage};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TITLE: &str = "Catálogo JA Distribuidora";

/// CLI for notion-catalog: turn a Notion product database into a PDF catalog.
#[derive(Parser)]
#[clap(
    name = "notion-catalog",
    version,
    about = "Generate PDF product catalogs from a Notion database"
)]
pub struct Cli {
    /// Log at DEBUG level
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a PDF catalog from the active products (or a saved selection)
    Generate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Catalog title printed on the first page
        #[clap(long, default_value = DEFAULT_TITLE)]
        title: String,
        /// Output filename; auto-generated from the timestamp when omitted
        #[clap(long)]
        filename: Option<String>,
        /// JSON file with the products to include, in order
        #[clap(long)]
        selection: Option<PathBuf>,
    },
    /// Print the active products as JSON
    Products {
        #[clap(long)]
        config: PathBuf,
    },
    /// Set (or clear) the price of one product page
    UpdatePrice {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        page_id: String,
        /// New price; omit to mark the product as "price on request"
        #[clap(long)]
        price: Option<f64>,
    },
    /// List previously generated catalogs
    List {
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate {
            config,
            title,
            filename,
            selection,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "generate", "Starting catalog generation");
            let artifact = generate(&config, &title, filename.as_deref(), selection.as_deref())
                .await
                .map_err(|e| {
                    tracing::error!(
                        command = "generate",
                        stage = %e.stage,
                        rejected = e.is_rejected(),
                        error = %e.source,
                        "Catalog generation failed"
                    );
                    anyhow::Error::new(e)
                })?;
            println!(
                "{} ({})",
                artifact.path.display(),
                format_file_size(artifact.size_bytes)
            );
            Ok(())
        }
        Commands::Products { config } => {
            let config = load_config(config)?;
            let source = NotionSource::new(config.notion_config()?)?;
            let products = source.fetch_active_products().await?;
            tracing::info!(command = "products", count = products.len(), "Fetched active products");
            println!("{}", serde_json::to_string_pretty(&products)?);
            Ok(())
        }
        Commands::UpdatePrice {
            config,
            page_id,
            price,
        } => {
            let config = load_config(config)?;
            let source = NotionSource::new(config.notion_config()?)?;
            source
                .update_price(&page_id, price)
                .await
                .with_context(|| format!("Failed to update price of page {page_id}"))?;
            tracing::info!(command = "update-price", page_id = %page_id, ?price, "Price updated");
            Ok(())
        }
        Commands::List { config } => {
            let config = load_config(config)?;
            let output = OutputManager::new(config.catalog.output.clone());
            let artifacts = output.list()?;
            tracing::info!(command = "list", count = artifacts.len(), "Listed catalogs");
            for artifact in artifacts {
                println!(
                    "{}\t{}",
                    artifact.filename,
                    format_file_size(artifact.size_bytes)
                );
            }
            Ok(())
        }
    }
}

async fn generate(
    config: &CliConfig,
    title: &str,
    filename: Option<&str>,
    selection: Option<&Path>,
) -> Result<GeneratedArtifact, GenerationError> {
    let pipeline = CatalogPipeline::from_config(&config.catalog)
        .map_err(|e| GenerationError::new(Stage::Compile, e))?;

    match selection {
        Some(path) => {
            let products = read_selection(path)
                .map_err(|e| GenerationError::new(Stage::Select, e))?;
            pipeline.generate(&products, title, filename)
        }
        None => {
            let notion = config.notion_config().map_err(|e| {
                GenerationError::new(
                    Stage::Fetch,
                    CatalogError::Config(e.to_string()),
                )
            })?;
            let source = NotionSource::new(notion)
                .map_err(|e| GenerationError::new(Stage::Fetch, e))?;
            pipeline.generate_from_source(&source, title, filename).await
        }
    }
}

/// Reads a JSON array of products, as printed by the `products` command.
fn read_selection(path: &Path) -> Result<Vec<Product>, CatalogError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CatalogError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        CatalogError::Validation(format!(
            "invalid selection file {}: {e}",
            path.display()
        ))
    })
}
