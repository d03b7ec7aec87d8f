//! # contract: the seams of the catalog pipeline
//!
//! Two collaborators are swappable: where products come from
//! ([`ProductSource`]) and how markup becomes a document
//! ([`DocumentCompiler`]). Concrete implementations are
//! [`crate::source::NotionSource`] and [`crate::compile::PdfCompiler`].
//!
//! Both traits carry `mockall` mocks (`MockProductSource`,
//! `MockDocumentCompiler`) in tests and behind the `test-export-mocks`
//! feature so downstream crates can drive the pipeline deterministically.

use std::path::Path;

use async_trait::async_trait;
use mockall::automock;

use crate::error::CatalogError;
use crate::product::Product;

/// Pull-only supplier of active catalog products.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// All active products in the store's natural order. Individually broken
    /// records are skipped; only a failure of the query itself is an error.
    async fn fetch_active_products(&self) -> Result<Vec<Product>, CatalogError>;
}

/// Converts rendered markup into a binary document.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DocumentCompiler: Send + Sync {
    /// Relative resource references in `markup` resolve against `base_dir`.
    fn compile(&self, markup: &str, base_dir: &Path) -> Result<Vec<u8>, CatalogError>;
}
