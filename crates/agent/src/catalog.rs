//! Review catalog loading and index-time enrichment.

use std::fs;
use std::path::{Path, PathBuf};

use ridematch_core::attributes::{parse_amount_cents, AttributeExtractor, META_ENGINE_CC, META_PRICE};
use ridematch_core::domain::document::{
    RetrievedDocument, META_BRAND, META_MODEL, META_SOURCE, META_YEAR,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub documents: Vec<RetrievedDocument>,
    /// Records dropped because they carried no review text.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Records(Vec<CatalogRecord>),
    Wrapped { reviews: Vec<CatalogRecord> },
}

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    id: Option<Value>,
    brand: Option<String>,
    model: Option<String>,
    year: Option<Value>,
    #[serde(alias = "text", alias = "review", alias = "notes")]
    comment: Option<String>,
    #[serde(alias = "price_usd_estimate", alias = "msrp")]
    price: Option<Value>,
    engine_cc: Option<Value>,
    source: Option<String>,
}

pub fn load_catalog(path: &Path, extractor: &AttributeExtractor) -> Result<Catalog, CatalogError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
    parse_catalog(&raw, extractor)
        .map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source })
}

pub fn parse_catalog(
    raw: &str,
    extractor: &AttributeExtractor,
) -> Result<Catalog, serde_json::Error> {
    let records = match serde_json::from_str::<CatalogFile>(raw)? {
        CatalogFile::Records(records) | CatalogFile::Wrapped { reviews: records } => records,
    };

    let mut catalog = Catalog::default();
    for (index, record) in records.into_iter().enumerate() {
        match record_to_document(index, record) {
            Some(document) => catalog.documents.push(enrich_document(document, extractor)),
            None => catalog.skipped += 1,
        }
    }
    Ok(catalog)
}

/// Writes extracted attributes into the document metadata. Values already
/// present, such as a dedicated catalog price, are kept.
pub fn enrich_document(
    mut document: RetrievedDocument,
    extractor: &AttributeExtractor,
) -> RetrievedDocument {
    let attributes = extractor.extract(&document.raw_text);
    attributes.fill_metadata(&mut document.metadata);
    document
}

fn record_to_document(index: usize, record: CatalogRecord) -> Option<RetrievedDocument> {
    let text = record.comment.as_deref().map(str::trim).filter(|text| !text.is_empty())?;
    let id = record.id.as_ref().and_then(scalar_text).unwrap_or_else(|| (index + 1).to_string());

    let mut document = RetrievedDocument::new(id, text);
    let fields = [
        (META_BRAND, record.brand.clone()),
        (META_MODEL, record.model.clone()),
        (META_YEAR, record.year.as_ref().and_then(scalar_text)),
        (META_SOURCE, record.source.clone()),
        (META_PRICE, record.price.as_ref().and_then(price_text)),
        (META_ENGINE_CC, record.engine_cc.as_ref().and_then(engine_cc_text)),
    ];
    for (key, value) in fields {
        if let Some(value) = value.map(|value| value.trim().to_string()).filter(|v| !v.is_empty()) {
            document.metadata.insert(key.to_string(), value);
        }
    }
    Some(document)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn price_text(value: &Value) -> Option<String> {
    let cents = match value {
        Value::Number(number) => number.as_f64().map(|dollars| (dollars * 100.0).round() as i64),
        Value::String(text) => parse_amount_cents(text),
        _ => None,
    }?;
    (cents > 0).then(|| match cents % 100 {
        0 => (cents / 100).to_string(),
        remainder => format!("{}.{remainder:02}", cents / 100),
    })
}

fn engine_cc_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => number.as_u64().map(|cc| cc.to_string()),
        Value::String(text) => {
            let digits = text.trim().trim_end_matches("cc").trim();
            digits.parse::<u32>().ok().map(|cc| cc.to_string())
        }
        _ => None,
    }
}
