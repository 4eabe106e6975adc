use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "ridematch.toml";
pub const MAX_RETRY_BUDGET: u32 = 1;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub catalog_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Forces the network-free hashing embedder regardless of `embeddings.provider`.
    pub dummy_embeddings: bool,
    pub debug: bool,
    pub retry_budget: u32,
    pub max_query_words: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Dummy,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub dummy_embeddings: Option<bool>,
    pub debug: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
            },
            embeddings: EmbeddingsConfig {
                provider: EmbeddingProvider::Ollama,
                model: "nomic-embed-text".to_string(),
                dimensions: 256,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                catalog_path: PathBuf::from("data/reviews.json"),
            },
            agent: AgentConfig {
                dummy_embeddings: false,
                debug: false,
                retry_budget: 1,
                max_query_words: 12,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dummy" => Ok(Self::Dummy),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported embeddings provider `{other}` (expected dummy|ollama|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl EmbeddingProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Embedding backend actually used once dummy mode is taken into account.
    pub fn effective_embedding_provider(&self) -> EmbeddingProvider {
        if self.agent.dummy_embeddings {
            EmbeddingProvider::Dummy
        } else {
            self.embeddings.provider
        }
    }

    /// Log level after the `agent.debug` switch is applied.
    pub fn effective_log_level(&self) -> &str {
        if self.agent.debug {
            "debug"
        } else {
            self.logging.level.as_str()
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(embeddings) = patch.embeddings {
            if let Some(provider) = embeddings.provider {
                self.embeddings.provider = provider;
            }
            if let Some(model) = embeddings.model {
                self.embeddings.model = model;
            }
            if let Some(dimensions) = embeddings.dimensions {
                self.embeddings.dimensions = dimensions;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(top_k) = retrieval.top_k {
                self.retrieval.top_k = top_k;
            }
            if let Some(catalog_path) = retrieval.catalog_path {
                self.retrieval.catalog_path = catalog_path;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(dummy_embeddings) = agent.dummy_embeddings {
                self.agent.dummy_embeddings = dummy_embeddings;
            }
            if let Some(debug) = agent.debug {
                self.agent.debug = debug;
            }
            if let Some(retry_budget) = agent.retry_budget {
                self.agent.retry_budget = retry_budget;
            }
            if let Some(max_query_words) = agent.max_query_words {
                self.agent.max_query_words = max_query_words;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RIDEMATCH_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("RIDEMATCH_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RIDEMATCH_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("RIDEMATCH_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("RIDEMATCH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RIDEMATCH_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RIDEMATCH_EMBEDDINGS_PROVIDER") {
            self.embeddings.provider = value.parse()?;
        }
        if let Some(value) = read_env("RIDEMATCH_EMBEDDINGS_MODEL") {
            self.embeddings.model = value;
        }
        if let Some(value) = read_env("RIDEMATCH_EMBEDDINGS_DIMENSIONS") {
            self.embeddings.dimensions = parse_usize("RIDEMATCH_EMBEDDINGS_DIMENSIONS", &value)?;
        }

        if let Some(value) = read_env("RIDEMATCH_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = parse_usize("RIDEMATCH_RETRIEVAL_TOP_K", &value)?;
        }
        if let Some(value) = read_env("RIDEMATCH_CATALOG_PATH") {
            self.retrieval.catalog_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("RIDEMATCH_USE_DUMMY_EMBEDDINGS") {
            self.agent.dummy_embeddings = parse_flag("RIDEMATCH_USE_DUMMY_EMBEDDINGS", &value)?;
        }
        if running_in_ci() {
            self.agent.dummy_embeddings = true;
        }
        if let Some(value) = read_env("RIDEMATCH_DEBUG") {
            self.agent.debug = parse_flag("RIDEMATCH_DEBUG", &value)?;
        }
        if let Some(value) = read_env("RIDEMATCH_RETRY_BUDGET") {
            self.agent.retry_budget = parse_u32("RIDEMATCH_RETRY_BUDGET", &value)?;
        }
        if let Some(value) = read_env("RIDEMATCH_MAX_QUERY_WORDS") {
            self.agent.max_query_words = parse_usize("RIDEMATCH_MAX_QUERY_WORDS", &value)?;
        }

        let log_level =
            read_env("RIDEMATCH_LOGGING_LEVEL").or_else(|| read_env("RIDEMATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RIDEMATCH_LOGGING_FORMAT").or_else(|| read_env("RIDEMATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.retrieval.catalog_path = catalog_path;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(dummy_embeddings) = overrides.dummy_embeddings {
            self.agent.dummy_embeddings = dummy_embeddings;
        }
        if let Some(debug) = overrides.debug {
            self.agent.debug = debug;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_embeddings(self)?;
        validate_retrieval(&self.retrieval)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// CI runners never have a local embedding service available.
pub fn running_in_ci() -> bool {
    ["CI", "GITHUB_ACTIONS"]
        .into_iter()
        .filter_map(read_env)
        .any(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/ridematch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn api_key_missing(llm: &LlmConfig) -> bool {
    llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            if api_key_missing(llm) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set RIDEMATCH_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_embeddings(config: &AppConfig) -> Result<(), ConfigError> {
    let embeddings = &config.embeddings;
    if embeddings.dimensions < 8 || embeddings.dimensions > 4096 {
        return Err(ConfigError::Validation(
            "embeddings.dimensions must be in range 8..=4096".to_string(),
        ));
    }

    match config.effective_embedding_provider() {
        EmbeddingProvider::Dummy => {}
        EmbeddingProvider::Ollama => {
            if embeddings.model.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "embeddings.model is required unless dummy embeddings are enabled".to_string(),
                ));
            }
        }
        EmbeddingProvider::OpenAi => {
            if api_key_missing(&config.llm) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai embeddings (or set RIDEMATCH_USE_DUMMY_EMBEDDINGS=1)"
                        .to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.top_k == 0 || retrieval.top_k > 50 {
        return Err(ConfigError::Validation("retrieval.top_k must be in range 1..=50".to_string()));
    }

    if retrieval.catalog_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "retrieval.catalog_path must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.retry_budget > MAX_RETRY_BUDGET {
        return Err(ConfigError::Validation(format!(
            "agent.retry_budget must be 0 or {MAX_RETRY_BUDGET}; a turn never retries more than once"
        )));
    }

    if agent.max_query_words == 0 || agent.max_query_words > 64 {
        return Err(ConfigError::Validation(
            "agent.max_query_words must be in range 1..=64".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    embeddings: Option<EmbeddingsPatch>,
    retrieval: Option<RetrievalPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingsPatch {
    provider: Option<EmbeddingProvider>,
    model: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    top_k: Option<usize>,
    catalog_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    dummy_embeddings: Option<bool>,
    debug: Option<bool>,
    retry_budget: Option<u32>,
    max_query_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EmbeddingProvider, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const CI_VARS: [&str; 2] = ["CI", "GITHUB_ACTIONS"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    /// Runs `body` with the CI markers removed, restoring them afterwards.
    fn without_ci<T>(body: impl FnOnce() -> T) -> T {
        let saved = CI_VARS.map(|var| (var, env::var(var).ok()));
        clear_vars(&CI_VARS);
        let result = body();
        for (var, value) in saved {
            if let Some(value) = value {
                env::set_var(var, value);
            }
        }
        result
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RIDEMATCH_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ridematch.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_RIDEMATCH_OPENAI_KEY}"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_RIDEMATCH_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_LOG_LEVEL", "warn");
        env::set_var("RIDEMATCH_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["RIDEMATCH_LOG_LEVEL", "RIDEMATCH_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_LLM_MODEL", "mistral");
        env::set_var("RIDEMATCH_RETRIEVAL_TOP_K", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ridematch.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "llama3.2"

[retrieval]
top_k = 3
catalog_path = "from-file.json"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    catalog_path: Some("from-override.json".into()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.retrieval.catalog_path.to_string_lossy() == "from-override.json",
                "override catalog path should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "mistral", "env model should win over file and defaults")?;
            ensure(config.retrieval.top_k == 7, "env top_k should win over file")?;
            Ok(())
        })();

        clear_vars(&["RIDEMATCH_LLM_MODEL", "RIDEMATCH_RETRIEVAL_TOP_K"]);
        result
    }

    #[test]
    fn openai_provider_without_key_is_a_configuration_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["RIDEMATCH_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn retry_budget_above_one_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_RETRY_BUDGET", "3");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("retry budget of 3 should be rejected".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("agent.retry_budget"), "message should name the field")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["RIDEMATCH_RETRY_BUDGET"]);
        result
    }

    #[test]
    fn ci_environment_forces_dummy_embeddings() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = without_ci(|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.effective_embedding_provider() == EmbeddingProvider::Ollama,
                "outside CI the configured provider should be used",
            )?;

            env::set_var("CI", "true");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            env::remove_var("CI");
            ensure(config.agent.dummy_embeddings, "CI=true should enable dummy embeddings")?;
            ensure(
                config.effective_embedding_provider() == EmbeddingProvider::Dummy,
                "dummy mode should override the configured provider",
            )
        });

        result
    }

    #[test]
    fn debug_flag_raises_effective_log_level() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_DEBUG", "1");
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.agent.debug, "RIDEMATCH_DEBUG=1 should enable debug")?;
            ensure(config.effective_log_level() == "debug", "debug should raise the log level")
        })();

        clear_vars(&["RIDEMATCH_DEBUG"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RIDEMATCH_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["RIDEMATCH_LLM_API_KEY"]);
        result
    }
}
