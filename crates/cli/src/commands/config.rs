use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ridematch_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(explicit_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let rows = [
        ("llm.provider", config.llm.provider.as_str().to_string(), &["RIDEMATCH_LLM_PROVIDER"][..]),
        ("llm.model", config.llm.model.clone(), &["RIDEMATCH_LLM_MODEL"][..]),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["RIDEMATCH_LLM_BASE_URL"][..],
        ),
        ("llm.api_key", api_key, &["RIDEMATCH_LLM_API_KEY"][..]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["RIDEMATCH_LLM_TIMEOUT_SECS"][..]),
        (
            "embeddings.provider",
            config.effective_embedding_provider().as_str().to_string(),
            &["RIDEMATCH_EMBEDDINGS_PROVIDER"][..],
        ),
        ("embeddings.model", config.embeddings.model.clone(), &["RIDEMATCH_EMBEDDINGS_MODEL"][..]),
        (
            "embeddings.dimensions",
            config.embeddings.dimensions.to_string(),
            &["RIDEMATCH_EMBEDDINGS_DIMENSIONS"][..],
        ),
        ("retrieval.top_k", config.retrieval.top_k.to_string(), &["RIDEMATCH_RETRIEVAL_TOP_K"][..]),
        (
            "retrieval.catalog_path",
            config.retrieval.catalog_path.display().to_string(),
            &["RIDEMATCH_CATALOG_PATH"][..],
        ),
        (
            "agent.dummy_embeddings",
            config.agent.dummy_embeddings.to_string(),
            &["RIDEMATCH_USE_DUMMY_EMBEDDINGS", "CI", "GITHUB_ACTIONS"][..],
        ),
        ("agent.debug", config.agent.debug.to_string(), &["RIDEMATCH_DEBUG"][..]),
        ("agent.retry_budget", config.agent.retry_budget.to_string(), &["RIDEMATCH_RETRY_BUDGET"][..]),
        (
            "agent.max_query_words",
            config.agent.max_query_words.to_string(),
            &["RIDEMATCH_MAX_QUERY_WORDS"][..],
        ),
        (
            "logging.level",
            config.effective_log_level().to_string(),
            &["RIDEMATCH_LOGGING_LEVEL", "RIDEMATCH_LOG_LEVEL"][..],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["RIDEMATCH_LOGGING_FORMAT", "RIDEMATCH_LOG_FORMAT"][..],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.extend(
        rows.iter()
            .map(|&(key, ref value, env_keys)| render_line(key, value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a key's vendor prefix (`sk-`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
