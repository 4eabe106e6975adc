pub mod attributes;
pub mod config;
pub mod domain;
pub mod errors;

pub use attributes::{
    extract_budget_cents, mentions_attribute, prioritized_attribute, AttributeExtractor,
    StructuredAttributes, TrackedAttribute,
};
pub use domain::conversation::{Conversation, ConversationTurn, Role};
pub use domain::document::{DocumentId, RetrievedDocument};
pub use domain::recommendation::{
    format_usd, ClarifyingQuestion, Evidence, ItemIdentity, Pick, NONE_IN_DATASET,
};
pub use errors::{ApplicationError, InterfaceError};
