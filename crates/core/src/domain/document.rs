use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::recommendation::ItemIdentity;

pub const META_BRAND: &str = "brand";
pub const META_MODEL: &str = "model";
pub const META_YEAR: &str = "year";
pub const META_SOURCE: &str = "source";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A review document as returned by the retrieval store.
///
/// Metadata holds both the catalog fields (brand, model, year, source) and the
/// keys written by the attribute extractor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: DocumentId,
    pub raw_text: String,
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedDocument {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self { id: DocumentId(id.into()), raw_text: raw_text.into(), metadata: BTreeMap::new() }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
    }

    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity {
            brand: self.meta(META_BRAND).unwrap_or_default().to_string(),
            model: self.meta(META_MODEL).unwrap_or_default().to_string(),
            year: self.meta(META_YEAR).and_then(|year| year.trim().parse::<u16>().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RetrievedDocument, META_BRAND, META_MODEL, META_YEAR};

    #[test]
    fn identity_reads_catalog_metadata() {
        let document = RetrievedDocument::new("7", "great bike")
            .with_metadata(META_BRAND, "KTM")
            .with_metadata(META_MODEL, "890 Adventure R")
            .with_metadata(META_YEAR, "2023");

        let identity = document.identity();
        assert_eq!(identity.brand, "KTM");
        assert_eq!(identity.model, "890 Adventure R");
        assert_eq!(identity.year, Some(2023));
    }

    #[test]
    fn blank_metadata_values_read_as_absent() {
        let document = RetrievedDocument::new("1", "text").with_metadata(META_BRAND, "  ");
        assert_eq!(document.meta(META_BRAND), None);
        assert_eq!(document.identity().year, None);
    }
}
