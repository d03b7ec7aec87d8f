//! Property extraction: one type-tagged store property in, one plain scalar out.
//!
//! The store (Notion) tags every property with a `"type"` field and nests the
//! payload under a key of the same name. Each tag we understand is a variant
//! of [`RawProperty`]; every other tag lands in [`RawProperty::Unsupported`].
//! Adding a store field type means adding a variant and one match arm in
//! [`extract`].

use serde::Deserialize;

/// One run of formatted text. Only the plain text matters for the catalog.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileUrl {
    pub url: String,
}

/// A single attachment of a `files` property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileEntry {
    /// Linked from outside the store.
    External { external: FileUrl },
    /// Uploaded to and hosted by the store.
    File { file: FileUrl },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawProperty {
    Title {
        #[serde(default)]
        title: Vec<TextRun>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<TextRun>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Files {
        #[serde(default)]
        files: Vec<FileEntry>,
    },
    #[serde(other)]
    Unsupported,
}

/// Result of extracting one property.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Url(String),
    /// The property holds no value, or its type is not one we read.
    Empty,
}

impl Scalar {
    /// Text view; empty string for anything that isn't text.
    pub fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            _ => String::new(),
        }
    }

    pub fn into_number(self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_url(self) -> Option<String> {
        match self {
            Scalar::Url(url) => Some(url),
            _ => None,
        }
    }
}

/// Maps a raw property to its scalar value. Never fails.
pub fn extract(property: &RawProperty) -> Scalar {
    match property {
        RawProperty::Title { title } => Scalar::Text(concat_runs(title)),
        RawProperty::RichText { rich_text } => Scalar::Text(concat_runs(rich_text)),
        RawProperty::Number { number } => number.map_or(Scalar::Empty, Scalar::Number),
        // Only the first attachment is used.
        RawProperty::Files { files } => files
            .first()
            .and_then(file_url)
            .map_or(Scalar::Empty, Scalar::Url),
        RawProperty::Unsupported => Scalar::Empty,
    }
}

fn concat_runs(runs: &[TextRun]) -> String {
    runs.iter().map(|run| run.plain_text.as_str()).collect()
}

fn file_url(entry: &FileEntry) -> Option<String> {
    match entry {
        FileEntry::External { external } => Some(external.url.clone()),
        FileEntry::File { file } => Some(file.url.clone()),
        FileEntry::Unsupported => None,
    }
}
