use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canonical catalog item, independent of the store's property schema.
///
/// Immutable once built: fields are only reachable through accessors.
/// `price == None` means "price on request" and is never treated as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProductFields")]
pub struct Product {
    name: String,
    price: Option<f64>,
    sku: String,
    barcode: String,
    image_url: Option<String>,
    source_id: Option<String>,
}

/// Wire shape used when a selection is handed back in as JSON; converted
/// through [`Product::new`] so the non-empty name rule still holds.
#[derive(Deserialize)]
struct ProductFields {
    name: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    barcode: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
}

impl TryFrom<ProductFields> for Product {
    type Error = String;

    fn try_from(fields: ProductFields) -> Result<Self, Self::Error> {
        let product = Product::new(fields.name).ok_or("product name must not be empty")?;
        Ok(product
            .with_price(fields.price)
            .with_sku(fields.sku)
            .with_barcode(fields.barcode)
            .with_image_url(fields.image_url)
            .with_source_id(fields.source_id))
    }
}

impl Product {
    /// Returns `None` when the name is empty after trimming, which is the
    /// only condition that keeps a record out of the catalog.
    ///
    /// The name is stored trimmed, so a name made only of whitespace counts
    /// as empty and the record is excluded. A catalog entry with a blank
    /// heading is never useful, and the same rule applies to records read
    /// from the store and to selections submitted by callers.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            price: None,
            sku: String::new(),
            barcode: String::new(),
            image_url: None,
            source_id: None,
        })
    }

    pub fn with_price(mut self, price: Option<f64>) -> Self {
        self.price = price;
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into().trim().to_string();
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = barcode.into().trim().to_string();
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|url| !url.is_empty());
        self
    }

    pub fn with_source_id(mut self, source_id: Option<String>) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn barcode(&self) -> &str {
        &self.barcode
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }
}

/// An ordered selection of products to render. Duplicates are allowed.
#[derive(Debug, Clone)]
pub struct CatalogRequest {
    pub products: Vec<Product>,
    pub title: String,
    pub filename: Option<String>,
}

impl CatalogRequest {
    pub fn new(products: Vec<Product>, title: impl Into<String>) -> Self {
        Self {
            products,
            title: title.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A persisted catalog document. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        assert!(Product::new("   ").is_none());
        assert!(Product::new("").is_none());
        assert!(Product::new(" \t\n ").is_none());
    }

    #[test]
    fn name_is_stored_trimmed() {
        let p = Product::new("  Cabo USB \n").unwrap();
        assert_eq!(p.name(), "Cabo USB");
    }

    #[test]
    fn empty_image_url_is_absent() {
        let p = Product::new("Cabo USB")
            .unwrap()
            .with_image_url(Some(String::new()));
        assert_eq!(p.image_url(), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let p: Product = serde_json::from_str(r#"{"name":"Capa"}"#).unwrap();
        assert_eq!(p.name(), "Capa");
        assert_eq!(p.price(), None);
        assert_eq!(p.sku(), "");
    }

    #[test]
    fn deserializing_blank_name_fails() {
        assert!(serde_json::from_str::<Product>(r#"{"name":"  "}"#).is_err());
    }
}
