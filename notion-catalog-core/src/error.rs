//! Error taxonomy for the catalog pipeline.
//!
//! Record-level problems are *not* errors: they surface as
//! [`crate::normalize::ExclusionReason`] values and never abort a batch.
//! Everything here is request-level and aborts the stage it occurs in.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// User-correctable input problem, surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// The store could not be queried (network, auth, malformed query or response).
    #[error("upstream store error: {0}")]
    Upstream(String),

    #[error("template '{name}' not found in {}", searched.display())]
    TemplateNotFound { name: String, searched: PathBuf },

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("document compilation failed: {0}")]
    Compilation(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Pipeline stage a request-level failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Select,
    Render,
    Compile,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Select => "select",
            Stage::Render => "render",
            Stage::Compile => "compile",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed `generate` call, tagged with the stage that aborted it.
#[derive(Debug, thiserror::Error)]
#[error("[{stage}] {source}")]
pub struct GenerationError {
    pub stage: Stage,
    #[source]
    pub source: CatalogError,
}

impl GenerationError {
    pub fn new(stage: Stage, source: CatalogError) -> Self {
        Self { stage, source }
    }

    /// True when the request was rejected before any work was done
    /// (empty selection) rather than failing part way through.
    pub fn is_rejected(&self) -> bool {
        matches!(self.source, CatalogError::Validation(_))
    }
}
