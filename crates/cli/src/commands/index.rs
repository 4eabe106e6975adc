use std::collections::BTreeMap;
use std::path::PathBuf;

use ridematch_agent::catalog::{load_catalog, Catalog};
use ridematch_agent::embeddings::embedder_from_config;
use ridematch_agent::retrieval::InMemoryStore;
use ridematch_core::attributes::{AttributeExtractor, StructuredAttributes, TrackedAttribute};
use ridematch_core::config::LoadOptions;
use serde::Serialize;

use crate::commands::{
    async_runtime, load_config, CommandResult, EXIT_CATALOG, EXIT_CONFIG, EXIT_TRANSIENT_UPSTREAM,
};

const COMMAND: &str = "index";

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct IndexSummary {
    pub catalog_path: String,
    pub documents: usize,
    pub skipped: usize,
    pub embedder: String,
    pub with_price: usize,
    pub with_engine_cc: usize,
    pub notes: BTreeMap<String, usize>,
    pub category_tags: BTreeMap<String, usize>,
}

/// Loads and enriches the catalog, embeds it, and summarizes the extracted
/// attributes.
pub fn run(catalog: Option<PathBuf>, mut options: LoadOptions) -> CommandResult {
    if catalog.is_some() {
        options.overrides.catalog_path = catalog;
    }
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let path = config.retrieval.catalog_path.clone();
    let loaded = match load_catalog(&path, &AttributeExtractor::new()) {
        Ok(loaded) => loaded,
        Err(error) => {
            return CommandResult::failure(COMMAND, "catalog", error.to_string(), EXIT_CATALOG)
        }
    };
    let mut summary = summarize(&loaded);
    summary.catalog_path = path.display().to_string();

    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let indexed = runtime.block_on(async {
        let embedder = embedder_from_config(&config)?;
        InMemoryStore::build(embedder, loaded.documents).await.map_err(|error| error.into_application())
    });

    let store = match indexed {
        Ok(store) => store,
        Err(error) => {
            let exit_code =
                if error.is_transient() { EXIT_TRANSIENT_UPSTREAM } else { EXIT_CONFIG };
            return CommandResult::failure(COMMAND, error.class(), error.to_string(), exit_code);
        }
    };
    summary.embedder = store.embedder_name().to_string();

    let message = format!(
        "indexed {} review(s) from {} with {} embeddings",
        store.len(),
        summary.catalog_path,
        summary.embedder
    );
    match serde_json::to_value(&summary) {
        Ok(details) => CommandResult::success_with(COMMAND, message, Some(details)),
        Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 1),
    }
}

pub fn summarize(catalog: &Catalog) -> IndexSummary {
    let mut summary = IndexSummary {
        documents: catalog.documents.len(),
        skipped: catalog.skipped,
        ..IndexSummary::default()
    };

    for document in &catalog.documents {
        let attributes = StructuredAttributes::from_metadata(&document.metadata);
        summary.with_price += usize::from(attributes.price_estimate_cents.is_some());
        summary.with_engine_cc += usize::from(attributes.engine_cc.is_some());
        for attribute in TrackedAttribute::ALL {
            if attributes.note(attribute).is_some() {
                *summary.notes.entry(attribute.metadata_key().to_string()).or_default() += 1;
            }
        }
        for tag in &attributes.category_tags {
            *summary.category_tags.entry(tag.clone()).or_default() += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use ridematch_agent::catalog::parse_catalog;
    use ridematch_core::attributes::AttributeExtractor;

    use super::summarize;

    #[test]
    fn summary_counts_extracted_attributes() -> Result<(), String> {
        let catalog = parse_catalog(
            r#"[
                {"brand": "KTM", "model": "890 Adventure R", "price": 15499,
                 "comment": "Adventure bike with long-travel WP suspension and an 889cc twin."},
                {"brand": "Honda", "model": "Rebel 500", "comment": "Comfortable cruiser."},
                {"brand": "Yamaha", "model": "MT-07", "comment": ""}
            ]"#,
            &AttributeExtractor::new(),
        )
        .map_err(|err| err.to_string())?;

        let summary = summarize(&catalog);
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.with_price, 1);
        assert_eq!(summary.with_engine_cc, 1);
        assert_eq!(summary.notes.get("suspension_notes"), Some(&1));
        assert_eq!(summary.category_tags.get("cruiser"), Some(&1));
        assert_eq!(summary.category_tags.get("adventure"), Some(&1));
        Ok(())
    }
}
