//! Persisting compiled catalogs to the output directory.
//!
//! Writes go to a temp file inside the output directory first and are then
//! renamed into place, so a reader never sees a half-written PDF.
//!
//! Auto-generated names (`catalogo_<YYYYMMDD_HHMMSS>_<tag>.pdf`) only have
//! second resolution. Instead of letting two same-second requests overwrite
//! each other, the rename is no-clobber and a `_2`, `_3`, ... suffix is tried
//! until a free name is found. Explicitly requested names do overwrite.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::config::OutputConfig;
use crate::error::CatalogError;
use crate::product::GeneratedArtifact;

const PDF_EXTENSION: &str = ".pdf";
const MAX_FILENAME_LEN: usize = 200;
const MAX_DISAMBIGUATOR: usize = 1000;

/// Replaces characters that are invalid on common filesystems, trims
/// leading/trailing dots and spaces and caps the length, keeping the
/// extension intact.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ').to_string();

    if trimmed.chars().count() <= MAX_FILENAME_LEN {
        return trimmed;
    }
    let (stem, extension) = match trimmed.rfind('.') {
        Some(dot) if dot > 0 => (&trimmed[..dot], &trimmed[dot..]),
        _ => (trimmed.as_str(), ""),
    };
    let keep = MAX_FILENAME_LEN.saturating_sub(extension.chars().count());
    let stem: String = stem.chars().take(keep).collect();
    format!("{stem}{extension}")
}

/// Ensures the name ends in lowercase `.pdf`. An existing extension in any
/// case (`.PDF`, `.Pdf`) is replaced rather than doubled, so whatever is
/// persisted can later be found by [`OutputManager::list`] and
/// [`OutputManager::locate`].
pub fn with_pdf_extension(name: &str) -> String {
    let split = name.len().saturating_sub(PDF_EXTENSION.len());
    let stem = match name.get(split..) {
        Some(tail) if tail.eq_ignore_ascii_case(PDF_EXTENSION) => &name[..split],
        _ => name,
    };
    format!("{stem}{PDF_EXTENSION}")
}

/// `catalogo_<YYYYMMDD_HHMMSS>_<tag>` without extension.
pub fn auto_filename_stem(generated_at: DateTime<Local>, source_tag: &str) -> String {
    format!(
        "catalogo_{}_{}",
        generated_at.format("%Y%m%d_%H%M%S"),
        sanitize_filename(source_tag)
    )
}

/// Human-readable size: B, KB, MB or GB with one decimal.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{bytes} B")
    } else if size < KB * KB {
        format!("{:.1} KB", size / KB)
    } else if size < KB * KB * KB {
        format!("{:.1} MB", size / (KB * KB))
    } else {
        format!("{:.1} GB", size / (KB * KB * KB))
    }
}

pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn persist(
        &self,
        bytes: &[u8],
        requested_name: Option<&str>,
    ) -> Result<GeneratedArtifact, CatalogError> {
        self.persist_at(bytes, requested_name, Local::now())
    }

    /// Same as [`persist`](Self::persist) with an explicit generation instant
    /// for auto-naming.
    pub fn persist_at(
        &self,
        bytes: &[u8],
        requested_name: Option<&str>,
        generated_at: DateTime<Local>,
    ) -> Result<GeneratedArtifact, CatalogError> {
        let dir = self.output_dir();
        fs::create_dir_all(dir).map_err(|e| {
            error!(error = ?e, path = %dir.display(), "Failed to create output directory");
            CatalogError::io(dir, e)
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
            error!(error = ?e, path = %dir.display(), "Failed to create temp file for PDF output");
            CatalogError::io(dir, e)
        })?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| {
                error!(error = ?e, path = %tmp.path().display(), "Failed to write PDF bytes");
                CatalogError::io(tmp.path(), e)
            })?;

        let (filename, path) = match requested_name {
            Some(requested) => {
                let sanitized = sanitize_filename(requested);
                if sanitized.is_empty() {
                    warn!(requested, "Requested filename is empty after sanitising");
                    return Err(CatalogError::InvalidFilename(requested.to_string()));
                }
                let filename = with_pdf_extension(&sanitized);
                let path = dir.join(&filename);
                tmp.persist(&path).map_err(|e| {
                    error!(error = ?e.error, path = %path.display(), "Failed to move PDF into place");
                    CatalogError::io(&path, e.error)
                })?;
                (filename, path)
            }
            None => self.persist_auto_named(tmp, generated_at)?,
        };

        let artifact = GeneratedArtifact {
            path,
            filename,
            size_bytes: bytes.len() as u64,
        };
        info!(
            path = %artifact.path.display(),
            size = %format_file_size(artifact.size_bytes),
            "Catalog written"
        );
        Ok(artifact)
    }

    fn persist_auto_named(
        &self,
        mut tmp: NamedTempFile,
        generated_at: DateTime<Local>,
    ) -> Result<(String, PathBuf), CatalogError> {
        let stem = auto_filename_stem(generated_at, &self.config.source_tag);
        for attempt in 1..=MAX_DISAMBIGUATOR {
            let filename = if attempt == 1 {
                format!("{stem}{PDF_EXTENSION}")
            } else {
                format!("{stem}_{attempt}{PDF_EXTENSION}")
            };
            let path = self.output_dir().join(&filename);
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok((filename, path)),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Auto-generated filename taken, trying next");
                    tmp = e.file;
                }
                Err(e) => {
                    error!(error = ?e.error, path = %path.display(), "Failed to move PDF into place");
                    return Err(CatalogError::io(&path, e.error));
                }
            }
        }
        Err(CatalogError::InvalidFilename(format!(
            "no free filename for {stem} after {MAX_DISAMBIGUATOR} attempts"
        )))
    }

    /// Resolves a previously generated catalog by its bare filename.
    pub fn locate(&self, filename: &str) -> Result<PathBuf, CatalogError> {
        let valid = filename.ends_with(PDF_EXTENSION)
            && !filename.contains("..")
            && !filename.contains('/')
            && !filename.contains('\\');
        if !valid {
            warn!(filename, "Rejected artifact lookup");
            return Err(CatalogError::InvalidFilename(filename.to_string()));
        }
        let path = self.output_dir().join(filename);
        if !path.is_file() {
            return Err(CatalogError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    /// Generated PDFs in the output directory, newest first. A missing
    /// directory simply means nothing has been generated yet.
    pub fn list(&self) -> Result<Vec<GeneratedArtifact>, CatalogError> {
        let dir = self.output_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir).map_err(|e| CatalogError::io(dir, e))?;

        let mut found: Vec<(SystemTime, GeneratedArtifact)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CatalogError::io(dir, e))?;
            let path = entry.path();
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !filename.ends_with(PDF_EXTENSION) || !path.is_file() {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| CatalogError::io(&path, e))?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                GeneratedArtifact {
                    filename: filename.to_string(),
                    size_bytes: metadata.len(),
                    path: path.clone(),
                },
            ));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.filename.cmp(&a.1.filename)));
        Ok(found.into_iter().map(|(_, artifact)| artifact).collect())
    }
}
