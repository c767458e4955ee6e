use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
}

/// Ordered chat history supplied by the caller for one request.
///
/// Append-only: the pipeline pushes the incoming user turn and, at the end, the assistant
/// reply. Nothing is kept once the reply has been returned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationState {
    turns: Vec<ChatTurn>,
}

impl ConversationState {
    pub fn new(history: Vec<ChatTurn>) -> Self {
        Self { turns: history }
    }

    /// Prior history with the incoming user message appended, so the last turn is
    /// always a user turn when processing starts.
    pub fn with_user_message(history: Vec<ChatTurn>, message: impl Into<String>) -> Self {
        let mut state = Self::new(history);
        state.turns.push(ChatTurn::user(message));
        state
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn latest_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::User)
            .map(|turn| turn.content.as_str())
    }

    pub fn with_assistant_reply(&self, reply: impl Into<String>) -> Self {
        let mut turns = self.turns.clone();
        turns.push(ChatTurn::assistant(reply));
        Self { turns }
    }

    pub fn into_turns(self) -> Vec<ChatTurn> {
        self.turns
    }
}
