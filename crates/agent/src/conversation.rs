use std::collections::BTreeSet;
use std::time::Duration;

use ridematch_core::attributes::{correct_typos, matched_keywords};
use ridematch_core::domain::conversation::Conversation;
use ridematch_core::domain::recommendation::ClarifyingQuestion;
use tracing::debug;

use crate::llm::LlmClient;

pub const FALLBACK_DEFAULT_QUERY: &str = "motorcycle review";
const MIN_MEANINGFUL_TOKENS: usize = 3;
const QUERY_CONTEXT_MESSAGES: usize = 4;

const FILLER_WORDS: &[&str] = &[
    "hi", "hello", "hey", "yo", "sup", "hiya", "thanks", "thank", "ok", "okay", "please", "pls",
    "the", "an", "and", "or", "is", "it", "me", "my", "you", "your", "there", "what", "how",
    "help", "want", "need", "like", "good", "morning", "evening", "anyone", "here", "can", "do",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "are", "was", "but", "not", "you", "your",
    "have", "has", "want", "need", "looking", "something", "would", "like", "really", "some",
    "any", "can", "could", "should", "about", "into", "from", "what", "which", "prioritize",
    "priority", "please", "also", "more", "most", "less", "very", "much", "its", "it's", "bike",
    "motorcycle", "one", "get", "got", "under", "below", "budget", "max", "around", "than",
];

/// True when a message is too thin to retrieve on: fewer than three
/// meaningful tokens and no tracked-attribute keyword.
pub fn is_vague(message: &str) -> bool {
    meaningful_tokens(message).len() < MIN_MEANINGFUL_TOKENS && matched_keywords(message).is_empty()
}

pub fn clarifying_question() -> ClarifyingQuestion {
    ClarifyingQuestion {
        question: "What kind of riding do you have in mind (commuting, touring, off-road), and do \
                   you have a budget or a must-have like suspension or engine size?"
            .to_string(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '-' || ch == '\''))
        .map(|token| token.trim_matches(|ch: char| ch == '-' || ch == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn meaningful_tokens(message: &str) -> Vec<String> {
    tokenize(message)
        .into_iter()
        .filter(|token| token.chars().count() >= 2 && !FILLER_WORDS.contains(&token.as_str()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub text: String,
    pub used_fallback: bool,
}

#[derive(Clone, Debug)]
pub struct QueryGenerator {
    max_query_words: usize,
}

impl Default for QueryGenerator {
    fn default() -> Self {
        Self::new(12)
    }
}

impl QueryGenerator {
    pub fn new(max_query_words: usize) -> Self {
        Self { max_query_words: max_query_words.max(1) }
    }

    pub fn max_query_words(&self) -> usize {
        self.max_query_words
    }

    /// Asks the model for a query and falls back to a keyword query when the
    /// call fails, times out, or the reply is empty or too long.
    pub async fn generate(
        &self,
        conversation: &Conversation,
        llm: &dyn LlmClient,
        timeout: Duration,
    ) -> GeneratedQuery {
        let prompt = self.query_prompt(conversation);
        let proposed = match tokio::time::timeout(timeout, llm.complete(&prompt)).await {
            Ok(Ok(text)) => self.accept_model_query(&text),
            Ok(Err(error)) => {
                debug!(event_name = "agent.query.model_failed", error = %error, "query model call failed");
                None
            }
            Err(_) => {
                debug!(
                    event_name = "agent.query.model_timeout",
                    timeout_secs = timeout.as_secs(),
                    "query model call timed out"
                );
                None
            }
        };

        match proposed {
            Some(text) => GeneratedQuery { text, used_fallback: false },
            None => GeneratedQuery { text: self.fallback_query(conversation), used_fallback: true },
        }
    }

    pub fn query_prompt(&self, conversation: &Conversation) -> String {
        let history = conversation
            .recent_user_messages(QUERY_CONTEXT_MESSAGES)
            .into_iter()
            .map(|message| format!("User: {}", message.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Rewrite the rider's preferences below as a motorcycle review search query of at \
             most {} words. Reply with the query only, no punctuation or explanation.\n\n{history}",
            self.max_query_words
        )
    }

    /// Normalizes a model-proposed query; `None` when it is empty or over budget.
    pub fn accept_model_query(&self, raw: &str) -> Option<String> {
        let first_line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
        let unquoted = first_line.trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`')).trim();
        let unlabeled = unquoted
            .strip_prefix("Query:")
            .or_else(|| unquoted.strip_prefix("query:"))
            .unwrap_or(unquoted);

        let words = unlabeled.split_whitespace().collect::<Vec<_>>();
        let spilled = raw.lines().filter(|line| !line.trim().is_empty()).count() > 1;
        if words.is_empty() || words.len() > self.max_query_words || spilled {
            return None;
        }
        Some(words.join(" "))
    }

    /// Deterministic query from the latest user message: tracked-attribute
    /// keywords first, then other informative tokens.
    pub fn fallback_query(&self, conversation: &Conversation) -> String {
        let message = correct_typos(conversation.latest_user_message().unwrap_or_default());

        let mut seen = BTreeSet::new();
        let mut words = Vec::new();
        let keyword_words =
            matched_keywords(&message).into_iter().flat_map(str::split_whitespace).map(str::to_string);
        let informative = tokenize(&message).into_iter().filter(|token| is_informative(token));

        for word in keyword_words.chain(informative) {
            if words.len() == self.max_query_words {
                break;
            }
            if seen.insert(word.clone()) {
                words.push(word);
            }
        }

        if words.is_empty() {
            FALLBACK_DEFAULT_QUERY.to_string()
        } else {
            words.join(" ")
        }
    }
}

fn is_informative(token: &str) -> bool {
    if token.chars().count() <= 2 || STOPWORDS.contains(&token) || FILLER_WORDS.contains(&token) {
        return false;
    }
    let digits_only = token.chars().all(|ch| ch.is_ascii_digit());
    !digits_only
}
