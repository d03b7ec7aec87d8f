//! Turns raw store records into canonical [`Product`]s.
//!
//! A record that can't produce a product is *excluded*, not failed: the
//! reason is returned as a value and the rest of the batch carries on.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extract::{extract, RawProperty, Scalar};
use crate::product::Product;

/// Store property names for each canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub name: String,
    pub price: String,
    pub sku: String,
    pub barcode: String,
    pub image: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            name: "Name".to_string(),
            price: "Valor".to_string(),
            sku: "SKU".to_string(),
            barcode: "Código de Barras".to_string(),
            image: "Files & media".to_string(),
        }
    }
}

/// One page object as returned by the store, properties still undecoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    MissingName,
    MalformedProperty { field: String, message: String },
    MalformedRecord(String),
}

impl ExclusionReason {
    /// Stable short label used when aggregating reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            ExclusionReason::MissingName => "missing_name",
            ExclusionReason::MalformedProperty { .. } => "malformed_property",
            ExclusionReason::MalformedRecord(_) => "malformed_record",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingName => write!(f, "record has no name"),
            ExclusionReason::MalformedProperty { field, message } => {
                write!(f, "property '{field}' could not be decoded: {message}")
            }
            ExclusionReason::MalformedRecord(message) => {
                write!(f, "record could not be decoded: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub source_id: Option<String>,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Product(Product),
    Excluded(Exclusion),
}

/// Normalizes one record using the given field mapping.
pub fn normalize(raw: &RawRecord, fields: &FieldMap) -> Normalized {
    let excluded = |reason| {
        Normalized::Excluded(Exclusion {
            source_id: raw.id.clone(),
            reason,
        })
    };

    let name = match read(raw, &fields.name) {
        Ok(value) => value.into_text(),
        Err(reason) => return excluded(reason),
    };
    let price = match read(raw, &fields.price) {
        Ok(value) => value.into_number(),
        Err(reason) => return excluded(reason),
    };
    let sku = match read(raw, &fields.sku) {
        Ok(value) => value.into_text(),
        Err(reason) => return excluded(reason),
    };
    let barcode = match read(raw, &fields.barcode) {
        Ok(value) => value.into_text(),
        Err(reason) => return excluded(reason),
    };
    let image_url = match read(raw, &fields.image) {
        Ok(value) => value.into_url(),
        Err(reason) => return excluded(reason),
    };

    match Product::new(name) {
        Some(product) => Normalized::Product(
            product
                .with_price(price)
                .with_sku(sku)
                .with_barcode(barcode)
                .with_image_url(image_url)
                .with_source_id(raw.id.clone()),
        ),
        None => excluded(ExclusionReason::MissingName),
    }
}

/// Missing properties read as [`Scalar::Empty`]; present but undecodable
/// ones exclude the record.
fn read(raw: &RawRecord, field: &str) -> Result<Scalar, ExclusionReason> {
    let Some(value) = raw.properties.get(field) else {
        return Ok(Scalar::Empty);
    };
    let property = RawProperty::deserialize(value).map_err(|e| {
        ExclusionReason::MalformedProperty {
            field: field.to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(extract(&property))
}

/// Products and exclusions from one batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub products: Vec<Product>,
    pub exclusions: Vec<Exclusion>,
}

impl NormalizedBatch {
    /// Count of exclusions per reason kind.
    pub fn exclusion_summary(&self) -> BTreeMap<&'static str, usize> {
        let mut summary = BTreeMap::new();
        for exclusion in &self.exclusions {
            *summary.entry(exclusion.reason.kind()).or_insert(0) += 1;
        }
        summary
    }

    pub fn push_excluded(&mut self, exclusion: Exclusion) {
        debug!(
            source_id = exclusion.source_id.as_deref().unwrap_or("<none>"),
            reason = %exclusion.reason,
            "Excluding record from catalog"
        );
        self.exclusions.push(exclusion);
    }

    pub fn push(&mut self, normalized: Normalized) {
        match normalized {
            Normalized::Product(product) => self.products.push(product),
            Normalized::Excluded(exclusion) => self.push_excluded(exclusion),
        }
    }

    pub fn extend(&mut self, other: NormalizedBatch) {
        self.products.extend(other.products);
        self.exclusions.extend(other.exclusions);
    }

    pub fn trace_summary(&self) {
        info!(
            products = self.products.len(),
            excluded = self.exclusions.len(),
            reasons = ?self.exclusion_summary(),
            "Normalized batch"
        );
    }
}

/// Normalizes raw JSON page objects. Values that aren't even record-shaped
/// become [`ExclusionReason::MalformedRecord`].
pub fn normalize_batch<'a, I>(records: I, fields: &FieldMap) -> NormalizedBatch
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let mut batch = NormalizedBatch::default();
    for value in records {
        match RawRecord::deserialize(value) {
            Ok(raw) => batch.push(normalize(&raw, fields)),
            Err(e) => batch.push_excluded(Exclusion {
                source_id: value
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(str::to_string),
                reason: ExclusionReason::MalformedRecord(e.to_string()),
            }),
        }
    }
    batch
}
