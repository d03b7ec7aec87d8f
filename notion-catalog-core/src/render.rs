//! HTML rendering of a product selection through a minijinja template.
//!
//! The template directory is only ever read. Two filters are registered on
//! the environment:
//!
//! - `format_price`: `1234.5` -> `R$ 1.234,50`, none -> the "price on
//!   request" label.
//! - `fallback_image`: none/empty -> [`PLACEHOLDER_IMAGE`], otherwise the
//!   URL untouched.

use chrono::{DateTime, Local};
use minijinja::{Environment, ErrorKind};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::RenderConfig;
use crate::error::CatalogError;
use crate::product::Product;

/// 120x120 light-gray SVG with a centered "Sem imagem" caption.
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' width='120' height='120' viewBox='0 0 120 120'%3E%3Crect width='120' height='120' fill='%23f0f0f0'/%3E%3Ctext x='60' y='60' text-anchor='middle' dy='0.35em' fill='%23999' font-family='Arial' font-size='12'%3ESem imagem%3C/text%3E%3C/svg%3E";

pub fn fallback_image(image_url: Option<&str>) -> &str {
    match image_url {
        Some(url) if !url.is_empty() => url,
        _ => PLACEHOLDER_IMAGE,
    }
}

/// Brazilian-style currency formatting with a configurable label and marker.
#[derive(Debug, Clone)]
pub struct PriceFormatter {
    price_on_request: String,
    currency: String,
}

impl PriceFormatter {
    pub fn new(price_on_request: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            price_on_request: price_on_request.into(),
            currency: currency.into(),
        }
    }

    pub fn format(&self, price: Option<f64>) -> String {
        match price {
            None => self.price_on_request.clone(),
            Some(value) => format!("{} {}", self.currency, format_decimal(value)),
        }
    }
}

/// Two decimals, `.` between thousands and `,` before the cents.
fn format_decimal(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let Some((units, cents)) = fixed.split_once('.') else {
        // NaN / inf
        return fixed;
    };

    let digits = units.as_bytes();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*digit as char);
    }

    let sign = if value.is_sign_negative() && fixed != "0.00" {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped},{cents}")
}

#[derive(Serialize)]
struct RenderContext<'a> {
    products: &'a [Product],
    title: &'a str,
    generation_date: String,
    generated_at: String,
    total_products: usize,
}

/// Renders catalogs from the configured template directory.
pub struct CatalogRenderer {
    env: Environment<'static>,
    config: RenderConfig,
}

impl CatalogRenderer {
    pub fn new(config: RenderConfig) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(config.template_dir.clone()));

        let formatter = PriceFormatter::new(&config.price_on_request, &config.currency);
        env.add_filter("format_price", move |price: Option<f64>| formatter.format(price));
        env.add_filter("fallback_image", |url: Option<String>| {
            fallback_image(url.as_deref()).to_string()
        });

        debug!(
            template_dir = %config.template_dir.display(),
            template_name = %config.template_name,
            "Template environment initialised"
        );
        Self { env, config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render(&self, products: &[Product], title: &str) -> Result<String, CatalogError> {
        self.render_at(products, title, Local::now())
    }

    /// Same as [`render`](Self::render) with an explicit generation instant.
    pub fn render_at(
        &self,
        products: &[Product],
        title: &str,
        generated_at: DateTime<Local>,
    ) -> Result<String, CatalogError> {
        let name = self.config.template_name.as_str();
        let template = self.env.get_template(name).map_err(|e| {
            if matches!(e.kind(), ErrorKind::TemplateNotFound) {
                error!(
                    template = name,
                    template_dir = %self.config.template_dir.display(),
                    "Template not found"
                );
                CatalogError::TemplateNotFound {
                    name: name.to_string(),
                    searched: self.config.template_dir.clone(),
                }
            } else {
                error!(error = %e, template = name, "Failed to load template");
                CatalogError::Render(e.to_string())
            }
        })?;

        let context = RenderContext {
            products,
            title,
            generation_date: generated_at.format("%d/%m/%Y %H:%M").to_string(),
            generated_at: generated_at.to_rfc3339(),
            total_products: products.len(),
        };

        let markup = template.render(&context).map_err(|e| {
            error!(error = %e, template = name, "Error rendering template");
            CatalogError::Render(e.to_string())
        })?;
        info!(
            products = products.len(),
            bytes = markup.len(),
            "Rendered catalog markup"
        );
        Ok(markup)
    }
}
