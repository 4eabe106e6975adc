use ridematch_agent::catalog::{load_catalog, Catalog};
use ridematch_agent::embeddings::embedder_from_config;
use ridematch_agent::retrieval::InMemoryStore;
use ridematch_core::attributes::AttributeExtractor;
use ridematch_core::config::{AppConfig, EmbeddingProvider, LlmProvider, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, options: LoadOptions) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_readiness(&config));
            match check_catalog(&config) {
                Ok((check, catalog)) => {
                    checks.push(check);
                    checks.push(check_index_build(&config, catalog));
                }
                Err(check) => {
                    checks.push(check);
                    checks.push(DoctorCheck::skipped("index_build", "the catalog did not load"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_readiness", "catalog_readiness", "index_build"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    // Skipped network checks do not fail the report.
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let endpoint = config.llm.base_url.as_deref().unwrap_or("the default endpoint");
    let details = match config.llm.provider {
        LlmProvider::Ollama => {
            format!("ollama model `{}` at {endpoint} (not contacted)", config.llm.model)
        }
        LlmProvider::OpenAi => {
            format!("openai model `{}` with api key present (not contacted)", config.llm.model)
        }
    };
    DoctorCheck { name: "llm_readiness", status: CheckStatus::Pass, details }
}

fn check_catalog(config: &AppConfig) -> Result<(DoctorCheck, Catalog), DoctorCheck> {
    let path = &config.retrieval.catalog_path;
    match load_catalog(path, &AttributeExtractor::new()) {
        Ok(catalog) if catalog.documents.is_empty() => Err(DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Fail,
            details: format!("`{}` contains no usable reviews", path.display()),
        }),
        Ok(catalog) => Ok((
            DoctorCheck {
                name: "catalog_readiness",
                status: CheckStatus::Pass,
                details: format!(
                    "{} review(s) loaded from `{}` ({} skipped)",
                    catalog.documents.len(),
                    path.display(),
                    catalog.skipped
                ),
            },
            catalog,
        )),
        Err(error) => Err(DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        }),
    }
}

/// Builds the in-memory index, but only offline: remote embedders are not
/// called from a readiness check.
fn check_index_build(config: &AppConfig, catalog: Catalog) -> DoctorCheck {
    let provider = config.effective_embedding_provider();
    if provider != EmbeddingProvider::Dummy {
        return DoctorCheck::skipped(
            "index_build",
            &format!("{} embeddings need the network; run `ridematch index`", provider.as_str()),
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "index_build",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let embedder = embedder_from_config(config).map_err(|error| error.to_string())?;
        InMemoryStore::build(embedder, catalog.documents).await.map_err(|error| error.to_string())
    });

    match result {
        Ok(store) => DoctorCheck {
            name: "index_build",
            status: CheckStatus::Pass,
            details: format!("indexed {} review(s) with {} embeddings", store.len(), store.embedder_name()),
        },
        Err(error) => DoctorCheck { name: "index_build", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
