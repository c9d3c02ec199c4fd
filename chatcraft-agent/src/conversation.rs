//! Conversation state - an append-only list of turns

use chatcraft_model::{Role, Turn};

/// Ordered turns of one conversation.
///
/// Turns are only ever appended. A bounded *view* can be taken for sending to
/// the model, but the state itself keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a system prompt
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.push(Turn::system(prompt));
        conversation
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_with_role(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }

    pub fn last_user(&self) -> Option<&Turn> {
        self.last_with_role(Role::User)
    }

    pub fn last_assistant(&self) -> Option<&Turn> {
        self.last_with_role(Role::Assistant)
    }

    /// The lone user message, if it is the only non-system turn so far
    pub fn opening_message(&self) -> Option<&Turn> {
        let mut rest = self.turns.iter().filter(|t| t.role != Role::System);
        match (rest.next(), rest.next()) {
            (Some(first), None) if first.role == Role::User => Some(first),
            _ => None,
        }
    }

    /// Turns to send to the model.
    ///
    /// `window == 0` sends everything. Otherwise system turns are always kept
    /// and only the last `window` other turns follow them.
    pub fn view(&self, window: usize) -> Vec<Turn> {
        if window == 0 {
            return self.turns.clone();
        }

        let others = self.turns.iter().filter(|t| t.role != Role::System).count();
        let skip = others.saturating_sub(window);

        let mut seen = 0;
        self.turns
            .iter()
            .filter(|t| {
                if t.role == Role::System {
                    return true;
                }
                seen += 1;
                seen > skip
            })
            .cloned()
            .collect()
    }
}
