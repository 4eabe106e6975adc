//! Agent runtime - turns a rider's conversation into validated motorcycle picks
//!
//! One turn runs a constrained loop:
//! 1. **Vagueness check** (`conversation`) - terse input gets a clarifying question
//! 2. **Query generation** (`conversation`) - model-written query with keyword fallback
//! 3. **Retrieval** (`retrieval`, `embeddings`, `catalog`) - ranked review documents
//! 4. **Enrichment** (`enrichment`) - extracted attributes filled into document metadata
//! 5. **Prompting and parsing** (`prompt`, `llm`, `parser`)
//! 6. **Validation** (`guardrails`) - budget and evidence constraints, at most one retry
//!
//! `AgentRuntime::handle_turn` in `runtime` drives the loop; `Session` owns the
//! conversation across turns.
//!
//! # Safety Principle
//!
//! Model output is untrusted text. Prices come from the catalog when a pick can
//! be matched to a review, and no pick above the rider's budget is ever accepted.

pub mod catalog;
pub mod conversation;
pub mod embeddings;
pub mod enrichment;
pub mod guardrails;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod retrieval;
pub mod runtime;

pub use guardrails::{ConstraintValidator, TurnConstraints, ValidationOutcome};
pub use runtime::{render_outcome, AgentRuntime, RuntimeSettings, Session, TurnOutcome, TurnReport};
