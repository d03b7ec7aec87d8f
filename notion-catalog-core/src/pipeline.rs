//! Catalog generation pipeline: select -> render -> compile -> persist.
//!
//! Each call to [`CatalogPipeline::generate`] is one sequential run with its
//! own [`PipelineState`] progression:
//!
//! ```text
//! Requested -> Fetched -> Normalized -> Selected -> Rendered -> Compiled -> Persisted
//!     |                                       |           |           |
//!     +-> Rejected (empty selection)          +-----------+-----------+-> Failed
//! ```
//!
//! `generate` starts from a caller-made selection, so it goes straight from
//! `Requested` to `Selected`; [`CatalogPipeline::generate_from_source`] walks
//! the fetch states as well. Failures carry the [`Stage`] they occurred in.
//! Nothing is retried; retry policy belongs to whoever calls this.

use std::fmt;

use tracing::{debug, error, info};

use crate::compile::PdfCompiler;
use crate::config::CatalogConfig;
use crate::contract::{DocumentCompiler, ProductSource};
use crate::error::{CatalogError, GenerationError, Stage};
use crate::output::OutputManager;
use crate::product::{CatalogRequest, GeneratedArtifact, Product};
use crate::render::CatalogRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Requested,
    Fetched,
    Normalized,
    Selected,
    Rendered,
    Compiled,
    Persisted,
    Rejected,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Persisted | PipelineState::Rejected | PipelineState::Failed
        )
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Requested, Fetched)
                | (Requested, Selected)
                | (Requested, Rejected)
                | (Fetched, Normalized)
                | (Normalized, Selected)
                | (Normalized, Rejected)
                | (Selected, Rendered)
                | (Rendered, Compiled)
                | (Compiled, Persisted)
                | (Requested, Failed)
                | (Fetched, Failed)
                | (Selected, Failed)
                | (Rendered, Failed)
                | (Compiled, Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State of one pipeline invocation; records every state it passed through.
#[derive(Debug)]
pub struct Run {
    history: Vec<PipelineState>,
}

impl Run {
    fn start() -> Self {
        info!("[CATALOG] Generation requested");
        Self {
            history: vec![PipelineState::Requested],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Requested)
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn advance(&mut self, next: PipelineState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "illegal pipeline transition {current} -> {next}"
        );
        info!(from = %current, to = %next, "[CATALOG] State transition");
        self.history.push(next);
    }

    fn fail(&mut self, stage: Stage, source: CatalogError) -> GenerationError {
        let terminal = if matches!(source, CatalogError::Validation(_)) {
            PipelineState::Rejected
        } else {
            PipelineState::Failed
        };
        error!(stage = %stage, error = %source, "[CATALOG][ERROR] Generation stopped");
        self.advance(terminal);
        GenerationError::new(stage, source)
    }
}

/// Render/compile/persist wired together. Construct once and share; every
/// call is independent.
pub struct CatalogPipeline<C: DocumentCompiler> {
    renderer: CatalogRenderer,
    compiler: C,
    output: OutputManager,
}

impl CatalogPipeline<PdfCompiler> {
    /// Pipeline with the built-in PDF compiler.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(
            CatalogRenderer::new(config.render.clone()),
            PdfCompiler::new()?,
            OutputManager::new(config.output.clone()),
        ))
    }
}

impl<C: DocumentCompiler> CatalogPipeline<C> {
    pub fn new(renderer: CatalogRenderer, compiler: C, output: OutputManager) -> Self {
        Self {
            renderer,
            compiler,
            output,
        }
    }

    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    /// Renders `products` (in the given order, duplicates kept) into a PDF
    /// and persists it. An empty selection is rejected before any work.
    pub fn generate(
        &self,
        products: &[Product],
        title: &str,
        filename: Option<&str>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let mut run = Run::start();
        self.generate_selected(&mut run, products, title, filename)
    }

    pub fn generate_request(
        &self,
        request: &CatalogRequest,
    ) -> Result<GeneratedArtifact, GenerationError> {
        self.generate(&request.products, &request.title, request.filename.as_deref())
    }

    /// Fetches every active product from `source` and generates a catalog
    /// containing all of them.
    pub async fn generate_from_source<S>(
        &self,
        source: &S,
        title: &str,
        filename: Option<&str>,
    ) -> Result<GeneratedArtifact, GenerationError>
    where
        S: ProductSource + ?Sized,
    {
        let mut run = Run::start();
        let products = match source.fetch_active_products().await {
            Ok(products) => products,
            Err(e) => return Err(run.fail(Stage::Fetch, e)),
        };
        run.advance(PipelineState::Fetched);
        info!(count = products.len(), "[CATALOG][FETCH] Active products fetched");
        run.advance(PipelineState::Normalized);

        if products.is_empty() {
            return Err(run.fail(
                Stage::Select,
                CatalogError::Validation(
                    "No active products found in the store; nothing to put in the catalog"
                        .to_string(),
                ),
            ));
        }
        self.generate_selected(&mut run, &products, title, filename)
    }

    fn generate_selected(
        &self,
        run: &mut Run,
        products: &[Product],
        title: &str,
        filename: Option<&str>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        if products.is_empty() {
            return Err(run.fail(
                Stage::Select,
                CatalogError::Validation("No products provided for catalog generation".to_string()),
            ));
        }
        run.advance(PipelineState::Selected);
        info!(count = products.len(), title, "[CATALOG][SELECT] Generating catalog");

        let markup = self
            .renderer
            .render(products, title)
            .map_err(|e| run.fail(Stage::Render, e))?;
        run.advance(PipelineState::Rendered);
        debug!(bytes = markup.len(), "[CATALOG][RENDER] Markup ready");

        let base_dir = &self.renderer.config().template_dir;
        let bytes = self
            .compiler
            .compile(&markup, base_dir)
            .map_err(|e| run.fail(Stage::Compile, e))?;
        run.advance(PipelineState::Compiled);
        info!(bytes = bytes.len(), "[CATALOG][COMPILE] Document compiled");

        let artifact = self
            .output
            .persist(&bytes, filename)
            .map_err(|e| run.fail(Stage::Persist, e))?;
        run.advance(PipelineState::Persisted);

        info!(
            path = %artifact.path.display(),
            products = products.len(),
            "[CATALOG][PERSIST] Catalog generated successfully"
        );
        Ok(artifact)
    }
}
