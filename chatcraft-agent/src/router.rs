//! Emotional / logical router
//!
//! A classifier call labels the last user message, a pure mapping picks the
//! persona, and the persona answers that one message. No retry, no loop.

use crate::conversation::Conversation;
use chatcraft_model::{InvokeOptions, LlmProvider, ModelClient, Result, Turn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

pub const CLASSIFIER_PROMPT: &str = "Classify the user message as either:
- 'emotional': if it asks for emotional support, therapy, deals with feelings, or personal problems
- 'logical': if it asks for facts, information, logical analysis, or practical solutions";

pub const NO_MARKDOWN: &str = "Do not use markdown formatting in your responses.";

pub const THERAPIST_PERSONA: &str = "You are a compassionate therapist. Focus on the emotional aspects of the user's message.
Show empathy, validate their feelings, and help them process their emotions.
Ask thoughtful questions to help them explore their feelings more deeply.
Avoid giving logical solutions unless explicitly asked.";

pub const LOGICAL_PERSONA: &str = "You are a purely logical assistant. Focus only on facts and information.
Provide clear, concise answers based on logic and evidence.
Do not address emotions or provide emotional support.
Be direct and straightforward in your responses.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Emotional,
    Logical,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Emotional => "emotional",
            MessageType::Logical => "logical",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "emotional" => Some(MessageType::Emotional),
            "logical" => Some(MessageType::Logical),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persona handler chosen for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Therapist,
    Logical,
}

impl Branch {
    pub fn name(&self) -> &'static str {
        match self {
            Branch::Therapist => "therapist_agent",
            Branch::Logical => "logical_agent",
        }
    }

    pub fn persona(&self) -> &'static str {
        match self {
            Branch::Therapist => THERAPIST_PERSONA,
            Branch::Logical => LOGICAL_PERSONA,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unlabelled messages go to the logical persona.
pub fn route(label: Option<MessageType>) -> Branch {
    match label {
        Some(MessageType::Emotional) => Branch::Therapist,
        Some(MessageType::Logical) | None => Branch::Logical,
    }
}

/// JSON schema the classifier reply must follow
pub fn classifier_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "message_type": {
                "type": "string",
                "enum": ["emotional", "logical"],
                "description": "Classify if the message requires an emotional (therapist) or logical response."
            }
        },
        "required": ["message_type"]
    })
}

#[derive(Deserialize)]
struct Classification {
    message_type: String,
}

/// Read a label out of a classifier reply.
///
/// Accepts bare JSON, JSON inside a ```` ```json ```` fence, or JSON embedded
/// in surrounding text. Anything else yields `None`.
pub fn parse_label(reply: &str) -> Option<MessageType> {
    let body = strip_fence(reply.trim());
    let parsed = serde_json::from_str::<Classification>(body).ok().or_else(|| {
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Classification>(&body[start..=end]).ok()
    })?;
    MessageType::from_label(&parsed.message_type)
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (`json`) on the opening line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// What one routed turn produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub label: Option<MessageType>,
    pub branch: Branch,
    pub answer: String,
}

pub struct RouterAgent<'a, P> {
    client: &'a ModelClient<P>,
}

impl<'a, P: LlmProvider> RouterAgent<'a, P> {
    pub fn new(client: &'a ModelClient<P>) -> Self {
        Self { client }
    }

    /// Label `text`. Unparseable output is `Ok(None)`, model failures are errors.
    pub async fn classify(&self, text: &str) -> Result<Option<MessageType>> {
        let turns = [Turn::system(CLASSIFIER_PROMPT), Turn::user(text)];
        let reply = self
            .client
            .invoke(&turns, &InvokeOptions::structured(classifier_schema()))
            .await?;

        let label = parse_label(&reply.content);
        if label.is_none() {
            tracing::warn!(reply = %reply.content, "classifier reply not understood; using default branch");
        }
        Ok(label)
    }

    /// Persona answer for a single message
    pub async fn respond(&self, branch: Branch, message: &str) -> Result<Turn> {
        let turns = [
            Turn::system(NO_MARKDOWN),
            Turn::system(branch.persona()),
            Turn::user(message),
        ];
        self.client.invoke(&turns, &InvokeOptions::new()).await
    }

    /// Append `message`, classify it, route it, append the persona's reply.
    pub async fn run(&self, conversation: &mut Conversation, message: &str) -> Result<RouteOutcome> {
        conversation.push(Turn::user(message));

        let label = self.classify(message).await?;
        let branch = route(label);
        tracing::info!(label = ?label, branch = branch.name(), "message routed");

        let reply = self.respond(branch, message).await?;
        let answer = reply.content.clone();
        conversation.push(reply);

        Ok(RouteOutcome { label, branch, answer })
    }
}
