//! Budget and evidence constraints over parsed model picks.
//!
//! The validator is a pure function of the parsed response, the constraints
//! derived from the conversation, and the attempt number within the turn. The
//! attempt number is what bounds the retry loop: a retry is only ever
//! requested while `attempt < retry_budget`, and the budget is at most one.

use ridematch_core::attributes::{
    extract_budget_cents, mentions_attribute, prioritized_attribute, TrackedAttribute,
};
use ridematch_core::config::MAX_RETRY_BUDGET;
use ridematch_core::domain::conversation::Conversation;
use ridematch_core::domain::recommendation::{format_usd, ClarifyingQuestion, Pick};
use serde::Serialize;

use crate::parser::ParsedResponse;

pub const NO_PICKS_NOTE: &str = "No suitable motorcycles were found in the dataset for this request.";
pub const MALFORMED_NOTE: &str =
    "The recommendation service returned an unreadable answer, so no picks could be validated. \
     Try rephrasing your request.";
const MALFORMED_FEEDBACK: &str = "Your previous reply was not a valid JSON object. Reply with \
     exactly one JSON object following the response format and nothing else.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accepted { picks: Vec<Pick>, note: Option<String> },
    /// No pick survived; the note says why.
    Filtered { note: String },
    RetryRequested { feedback: String },
    Clarify(ClarifyingQuestion),
}

impl ValidationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Filtered { .. } => "filtered",
            Self::RetryRequested { .. } => "retry_requested",
            Self::Clarify(_) => "clarify",
        }
    }
}

/// Constraints a turn's picks must satisfy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnConstraints {
    pub budget_cents: Option<i64>,
    pub focus: Option<TrackedAttribute>,
}

impl TurnConstraints {
    /// Budget comes from the most recent user message that states one; the
    /// focus attribute only from the latest user message.
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            budget_cents: conversation.user_messages().rev().find_map(extract_budget_cents),
            focus: conversation.latest_user_message().and_then(prioritized_attribute),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintValidator {
    retry_budget: u32,
}

impl Default for ConstraintValidator {
    fn default() -> Self {
        Self::new(MAX_RETRY_BUDGET)
    }
}

impl ConstraintValidator {
    pub fn new(retry_budget: u32) -> Self {
        Self { retry_budget: retry_budget.min(MAX_RETRY_BUDGET) }
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn validate(
        &self,
        parsed: ParsedResponse,
        conversation: &Conversation,
        attempt: u32,
    ) -> ValidationOutcome {
        self.validate_with(parsed, &TurnConstraints::from_conversation(conversation), attempt)
    }

    pub fn validate_with(
        &self,
        parsed: ParsedResponse,
        constraints: &TurnConstraints,
        attempt: u32,
    ) -> ValidationOutcome {
        let can_retry = attempt < self.retry_budget;

        let (picks, note) = match parsed {
            ParsedResponse::Clarify(question) => return ValidationOutcome::Clarify(question),
            ParsedResponse::Malformed { .. } if can_retry => {
                return ValidationOutcome::RetryRequested { feedback: MALFORMED_FEEDBACK.to_string() }
            }
            ParsedResponse::Malformed { .. } => {
                return ValidationOutcome::Filtered { note: MALFORMED_NOTE.to_string() }
            }
            ParsedResponse::Recommendation { picks, note } => (picks, note),
        };

        if picks.is_empty() {
            return ValidationOutcome::Filtered {
                note: note.unwrap_or_else(|| NO_PICKS_NOTE.to_string()),
            };
        }

        let within_budget = match constraints.budget_cents {
            Some(budget) => {
                let kept = picks
                    .into_iter()
                    .filter(|pick| pick.price_estimate_cents.map_or(true, |price| price <= budget))
                    .collect::<Vec<_>>();
                if kept.is_empty() {
                    return ValidationOutcome::Filtered {
                        note: format!(
                            "No picks at or below the stated budget of {} were found in the dataset.",
                            format_usd(budget)
                        ),
                    };
                }
                kept
            }
            None => picks,
        };

        let Some(focus) = constraints.focus else {
            return ValidationOutcome::Accepted { picks: within_budget, note };
        };

        let (supported, unsupported): (Vec<_>, Vec<_>) =
            within_budget.into_iter().partition(|pick| cites_attribute(pick, focus));

        if !supported.is_empty() {
            return ValidationOutcome::Accepted { picks: supported, note };
        }

        if can_retry {
            ValidationOutcome::RetryRequested { feedback: attribute_feedback(focus, &unsupported) }
        } else {
            ValidationOutcome::Filtered {
                note: format!(
                    "None of the candidate picks had {} evidence in the dataset, so nothing could \
                     be recommended with confidence.",
                    focus.label()
                ),
            }
        }
    }
}

fn cites_attribute(pick: &Pick, focus: TrackedAttribute) -> bool {
    pick.evidence.is_sentinel()
        || mentions_attribute(&pick.reason, focus)
        || mentions_attribute(pick.evidence.as_str(), focus)
}

fn attribute_feedback(focus: TrackedAttribute, dropped: &[Pick]) -> String {
    let examples = focus.keywords().iter().take(4).copied().collect::<Vec<_>>().join(", ");
    let names =
        dropped.iter().map(|pick| pick.identity.to_string()).collect::<Vec<_>>().join("; ");
    format!(
        "The rider prioritized {label}. Every pick must cite {label} evidence from the reviews in \
         its reason or evidence (for example: {examples}), or set evidence to \"none in dataset\" \
         when the reviews say nothing about it. Rejected picks: {names}.",
        label = focus.label()
    )
}
