use std::sync::Arc;
use std::time::Duration;

use ridematch_core::attributes::AttributeExtractor;
use ridematch_core::config::AppConfig;
use ridematch_core::domain::conversation::Conversation;
use ridematch_core::domain::recommendation::{format_usd, ClarifyingQuestion, Pick};
use ridematch_core::errors::ApplicationError;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::load_catalog;
use crate::conversation::{clarifying_question, is_vague, QueryGenerator};
use crate::embeddings::embedder_from_config;
use crate::enrichment::{enrich_retrieved, ground_picks};
use crate::guardrails::{ConstraintValidator, TurnConstraints, ValidationOutcome};
use crate::llm::{client_from_config, CompletionError, LlmClient};
use crate::parser::{parse_response, ParsedResponse};
use crate::prompt::PromptBuilder;
use crate::retrieval::{DocumentStore, InMemoryStore};

const COMPLETION_UPSTREAM: &str = "completion";

/// Per-turn states, logged as `agent.turn.<phase>` events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingInput,
    AskClarifying,
    Retrieving,
    Enriching,
    Prompting,
    Parsing,
    Validating,
    Retrying,
    Done,
}

impl TurnPhase {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::AwaitingInput => "agent.turn.awaiting_input",
            Self::AskClarifying => "agent.turn.ask_clarifying",
            Self::Retrieving => "agent.turn.retrieving",
            Self::Enriching => "agent.turn.enriching",
            Self::Prompting => "agent.turn.prompting",
            Self::Parsing => "agent.turn.parsing",
            Self::Validating => "agent.turn.validating",
            Self::Retrying => "agent.turn.retry_requested",
            Self::Done => "agent.turn.done",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub top_k: usize,
    pub timeout: Duration,
    pub retry_budget: u32,
    pub max_query_words: usize,
    pub debug: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            timeout: Duration::from_secs(60),
            retry_budget: 1,
            max_query_words: 12,
            debug: false,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            timeout: Duration::from_secs(config.llm.timeout_secs),
            retry_budget: config.agent.retry_budget,
            max_query_words: config.agent.max_query_words,
            debug: config.agent.debug,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Vague input, or the model asked for more detail.
    Clarifying(ClarifyingQuestion),
    Validated(ValidationOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub used_fallback_query: bool,
    pub retries: u32,
    pub correlation_id: String,
    pub query: Option<String>,
    pub retrieved: usize,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn DocumentStore>,
    extractor: AttributeExtractor,
    queries: QueryGenerator,
    prompts: PromptBuilder,
    validator: ConstraintValidator,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn DocumentStore>,
        settings: RuntimeSettings,
    ) -> Result<Self, ApplicationError> {
        let prompts = PromptBuilder::new()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self {
            llm,
            store,
            extractor: AttributeExtractor::new(),
            queries: QueryGenerator::new(settings.max_query_words),
            prompts,
            validator: ConstraintValidator::new(settings.retry_budget),
            settings,
        })
    }

    /// Loads and indexes the configured catalog, then wires the configured
    /// completion client.
    pub async fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let extractor = AttributeExtractor::new();
        let catalog = load_catalog(&config.retrieval.catalog_path, &extractor)
            .map_err(|error| ApplicationError::Catalog(error.to_string()))?;
        info!(
            event_name = "agent.catalog.loaded",
            documents = catalog.documents.len(),
            skipped = catalog.skipped,
            "review catalog loaded"
        );

        let embedder = embedder_from_config(config)?;
        let store = InMemoryStore::build(embedder, catalog.documents)
            .await
            .map_err(|error| error.into_application())?;
        let llm = client_from_config(&config.llm)?;

        Self::new(llm, Arc::new(store), RuntimeSettings::from_config(config))
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub async fn handle_turn(&self, conversation: &Conversation) -> Result<TurnReport, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.phase(TurnPhase::AwaitingInput, &correlation_id);

        let latest = conversation.latest_user_message().unwrap_or_default();
        if is_vague(latest) {
            self.phase(TurnPhase::AskClarifying, &correlation_id);
            return Ok(TurnReport {
                outcome: TurnOutcome::Clarifying(clarifying_question()),
                used_fallback_query: false,
                retries: 0,
                correlation_id,
                query: None,
                retrieved: 0,
            });
        }

        let query = self.queries.generate(conversation, self.llm.as_ref(), self.settings.timeout).await;
        info!(
            event_name = "agent.query.generated",
            correlation_id = %correlation_id,
            used_fallback_query = query.used_fallback,
            query = %query.text,
            "retrieval query ready"
        );

        self.phase(TurnPhase::Retrieving, &correlation_id);
        let mut documents =
            match tokio::time::timeout(self.settings.timeout, self.store.search(&query.text, self.settings.top_k))
                .await
            {
                Ok(Ok(documents)) => documents,
                Ok(Err(error)) => return Err(error.into_application()),
                Err(_) => {
                    return Err(ApplicationError::transient(
                        "retrieval",
                        format!("search timed out after {}s", self.settings.timeout.as_secs()),
                    ))
                }
            };

        self.phase(TurnPhase::Enriching, &correlation_id);
        let added = enrich_retrieved(&mut documents, &self.extractor);
        debug!(
            event_name = "agent.turn.enriched",
            correlation_id = %correlation_id,
            documents = documents.len(),
            metadata_added = added,
            "retrieved documents enriched"
        );

        let constraints = TurnConstraints::from_conversation(conversation);
        let mut attempt = 0_u32;
        let mut feedback: Option<String> = None;

        let outcome = loop {
            self.phase(TurnPhase::Prompting, &correlation_id);
            let prompt = self
                .prompts
                .render(conversation, &documents, &constraints, feedback.as_deref())
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
            let raw = self.complete(&prompt).await?;
            if self.settings.debug {
                debug!(
                    event_name = "agent.model.raw_output",
                    correlation_id = %correlation_id,
                    attempt,
                    raw = %raw,
                    "model output"
                );
            }

            self.phase(TurnPhase::Parsing, &correlation_id);
            let parsed = match parse_response(&raw) {
                ParsedResponse::Recommendation { picks, note } => ParsedResponse::Recommendation {
                    picks: ground_picks(picks, &documents, constraints.focus),
                    note,
                },
                other => other,
            };

            self.phase(TurnPhase::Validating, &correlation_id);
            match self.validator.validate_with(parsed, &constraints, attempt) {
                ValidationOutcome::RetryRequested { feedback: next } => {
                    warn!(
                        event_name = TurnPhase::Retrying.event_name(),
                        correlation_id = %correlation_id,
                        attempt,
                        feedback = %next,
                        "model output failed validation, re-prompting"
                    );
                    feedback = Some(next);
                    attempt += 1;
                }
                ValidationOutcome::Clarify(question) => break TurnOutcome::Clarifying(question),
                settled => break TurnOutcome::Validated(settled),
            }
        };

        info!(
            event_name = TurnPhase::Done.event_name(),
            correlation_id = %correlation_id,
            outcome = outcome_kind(&outcome),
            used_fallback_query = query.used_fallback,
            retries = attempt,
            retrieved = documents.len(),
            "turn complete"
        );

        Ok(TurnReport {
            outcome,
            used_fallback_query: query.used_fallback,
            retries: attempt,
            correlation_id,
            query: Some(query.text),
            retrieved: documents.len(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, ApplicationError> {
        match tokio::time::timeout(self.settings.timeout, self.llm.complete(prompt)).await {
            Ok(result) => result.map_err(|error| error.into_application(COMPLETION_UPSTREAM)),
            Err(_) => Err(CompletionError::Timeout { after_secs: self.settings.timeout.as_secs() }
                .into_application(COMPLETION_UPSTREAM)),
        }
    }

    fn phase(&self, phase: TurnPhase, correlation_id: &str) {
        debug!(event_name = phase.event_name(), correlation_id, "turn phase");
    }
}

fn outcome_kind(outcome: &TurnOutcome) -> &'static str {
    match outcome {
        TurnOutcome::Clarifying(_) => "clarifying",
        TurnOutcome::Validated(validated) => validated.kind(),
    }
}

/// One rider's conversation. Each turn borrows the session mutably, so a
/// session never has two turns in flight.
pub struct Session {
    runtime: Arc<AgentRuntime>,
    conversation: Conversation,
}

impl Session {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime, conversation: Conversation::new() }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Appends the user message, runs the turn, and appends the rendered
    /// reply. A failed turn leaves only the user message behind.
    pub async fn send(&mut self, message: impl Into<String>) -> Result<TurnReport, ApplicationError> {
        self.conversation.push_user(message);
        let report = self.runtime.handle_turn(&self.conversation).await?;
        self.conversation.push_assistant(render_outcome(&report.outcome));
        Ok(report)
    }
}

pub fn render_outcome(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::Clarifying(question)
        | TurnOutcome::Validated(ValidationOutcome::Clarify(question)) => question.question.clone(),
        TurnOutcome::Validated(ValidationOutcome::Filtered { note }) => note.clone(),
        TurnOutcome::Validated(ValidationOutcome::Accepted { picks, note }) => {
            render_picks(picks, note.as_deref())
        }
        TurnOutcome::Validated(ValidationOutcome::RetryRequested { .. }) => {
            "No recommendation could be produced for this request.".to_string()
        }
    }
}

fn render_picks(picks: &[Pick], note: Option<&str>) -> String {
    let mut lines = Vec::new();
    let mut picks = picks.iter();

    if let Some(primary) = picks.next() {
        lines.push(format!("Top pick: {}", render_pick(primary)));
    }
    let alternatives = picks.map(|pick| format!("  - {}", render_pick(pick))).collect::<Vec<_>>();
    if !alternatives.is_empty() {
        lines.push("Alternatives:".to_string());
        lines.extend(alternatives);
    }
    if let Some(note) = note {
        lines.push(format!("Note: {note}"));
    }
    lines.join("\n")
}

fn render_pick(pick: &Pick) -> String {
    let price = pick
        .price_estimate_cents
        .map(|cents| format!(", about {}", format_usd(cents)))
        .unwrap_or_default();
    format!("{}{price}. {} (evidence: {})", pick.identity, pick.reason, pick.evidence.as_str())
}
