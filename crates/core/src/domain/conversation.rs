use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Append-only log of the turns exchanged in one session.
///
/// Turns are never edited or removed once pushed; the only mutation is
/// appending, which requires `&mut self` and therefore a single writer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_user_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut conversation = Self::new();
        for message in messages {
            conversation.push_user(message);
        }
        conversation
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(ConversationTurn { role: Role::User, text: text.into() });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(ConversationTurn { role: Role::Assistant, text: text.into() });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn user_messages(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.turns.iter().filter(|turn| turn.role == Role::User).map(|turn| turn.text.as_str())
    }

    pub fn latest_user_message(&self) -> Option<&str> {
        self.user_messages().next_back()
    }

    /// The last `limit` user messages, oldest first.
    pub fn recent_user_messages(&self, limit: usize) -> Vec<&str> {
        let mut recent = self.user_messages().rev().take(limit).collect::<Vec<_>>();
        recent.reverse();
        recent
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, Role};

    #[test]
    fn latest_user_message_skips_assistant_turns() {
        let mut conversation = Conversation::from_user_messages(["hi", "touring bike please"]);
        conversation.push_assistant("Here are some picks");

        assert_eq!(conversation.latest_user_message(), Some("touring bike please"));
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.turns()[2].role, Role::Assistant);
    }

    #[test]
    fn recent_user_messages_keeps_chronological_order() {
        let conversation = Conversation::from_user_messages(["one", "two", "three"]);
        assert_eq!(conversation.recent_user_messages(2), vec!["two", "three"]);
        assert_eq!(conversation.recent_user_messages(10).len(), 3);
    }

    #[test]
    fn empty_conversation_has_no_latest_message() {
        assert_eq!(Conversation::new().latest_user_message(), None);
    }
}
