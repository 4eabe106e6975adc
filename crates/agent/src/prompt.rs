//! Recommendation prompt assembly.

use std::collections::HashMap;

use ridematch_core::attributes::{parse_amount_cents, META_PRICE};
use ridematch_core::domain::conversation::Conversation;
use ridematch_core::domain::document::{RetrievedDocument, META_BRAND, META_MODEL, META_YEAR};
use ridematch_core::domain::recommendation::format_usd;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::guardrails::TurnConstraints;

const TEMPLATE_NAME: &str = "recommend_prompt.txt";
const MAX_ALTERNATIVES: usize = 2;
/// Catalog identity fields are rendered in the title, not repeated as metadata.
const TITLE_KEYS: &[&str] = &[META_BRAND, META_MODEL, META_YEAR, META_PRICE];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Serialize)]
struct ReviewView<'a> {
    title: String,
    text: &'a str,
    price_cents: Option<i64>,
    metadata: Vec<MetadataEntry<'a>>,
}

#[derive(Serialize)]
struct MetadataEntry<'a> {
    key: &'a str,
    value: &'a str,
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("usd", tera_usd_filter);
}

/// Renders integer cents as `$8,999`.
fn tera_usd_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let cents = match value {
        tera::Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| tera::Error::msg("usd filter expects integer cents"))?,
        other => return Err(tera::Error::msg(format!("usd filter expects a number, got {other}"))),
    };
    Ok(tera::Value::String(format_usd(cents)))
}

#[derive(Clone, Debug)]
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../templates/recommend_prompt.tera"))?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        conversation: &Conversation,
        documents: &[RetrievedDocument],
        constraints: &TurnConstraints,
        retry_feedback: Option<&str>,
    ) -> Result<String, PromptError> {
        let reviews = documents.iter().map(review_view).collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("conversation", conversation.turns());
        context.insert("reviews", &reviews);
        context.insert("budget_cents", &constraints.budget_cents);
        context.insert("focus", &constraints.focus.map(|focus| focus.label()));
        context.insert(
            "focus_keywords",
            &constraints.focus.map(|focus| focus.keywords().iter().take(6).collect::<Vec<_>>()),
        );
        context.insert("retry_feedback", &retry_feedback);
        context.insert("max_alternatives", &MAX_ALTERNATIVES);

        Ok(self.tera.render(TEMPLATE_NAME, &context)?)
    }
}

fn review_view(document: &RetrievedDocument) -> ReviewView<'_> {
    let identity = document.identity();
    let title = match identity.to_string() {
        name if name.is_empty() => format!("review {}", document.id),
        name => name,
    };

    ReviewView {
        title,
        text: document.raw_text.trim(),
        price_cents: document.meta(META_PRICE).and_then(parse_amount_cents),
        metadata: document
            .metadata
            .iter()
            .filter(|(key, value)| !TITLE_KEYS.contains(&key.as_str()) && !value.trim().is_empty())
            .map(|(key, value)| MetadataEntry { key, value: value.trim() })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use ridematch_core::attributes::TrackedAttribute;
    use ridematch_core::domain::conversation::Conversation;
    use ridematch_core::domain::document::{RetrievedDocument, META_BRAND, META_MODEL};

    use super::PromptBuilder;
    use crate::guardrails::TurnConstraints;

    fn document() -> RetrievedDocument {
        RetrievedDocument::new("1", "Long-travel WP suspension. ")
            .with_metadata(META_BRAND, "KTM")
            .with_metadata(META_MODEL, "890 Adventure R")
            .with_metadata("price_usd_estimate", "8999")
            .with_metadata("suspension_notes", "Long-travel WP suspension")
    }

    #[test]
    fn prompt_carries_budget_focus_and_metadata() -> Result<(), String> {
        let builder = PromptBuilder::new().map_err(|err| err.to_string())?;
        let mut conversation = Conversation::from_user_messages(["adventure bike, budget $8000"]);
        conversation.push_assistant("Any priority?");
        conversation.push_user("suspension");
        let constraints = TurnConstraints {
            budget_cents: Some(800_000),
            focus: Some(TrackedAttribute::Suspension),
        };

        let prompt = builder
            .render(&conversation, &[document()], &constraints, None)
            .map_err(|err| err.to_string())?;

        assert!(prompt.contains("$8,000"), "prompt: {prompt}");
        assert!(prompt.contains("price_usd_estimate: $8,999"));
        assert!(prompt.contains("suspension_notes: Long-travel WP suspension"));
        assert!(prompt.contains("- KTM 890 Adventure R: Long-travel WP suspension."));
        assert!(prompt.contains("Assistant: Any priority?"));
        assert!(prompt.contains("emphasizes suspension"));
        assert!(!prompt.contains("RETRY_INSTRUCTION"));
        Ok(())
    }

    #[test]
    fn retry_feedback_is_appended() -> Result<(), String> {
        let builder = PromptBuilder::new().map_err(|err| err.to_string())?;
        let prompt = builder
            .render(
                &Conversation::from_user_messages(["touring"]),
                &[],
                &TurnConstraints::default(),
                Some("Reply with JSON only."),
            )
            .map_err(|err| err.to_string())?;

        assert!(prompt.contains("RETRY_INSTRUCTION:\nReply with JSON only."));
        assert!(prompt.contains("(no matching reviews were found)"));
        assert!(!prompt.contains("Budget:"));
        Ok(())
    }
}
