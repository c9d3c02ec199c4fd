//! # chatcraft agents
//!
//! Three conversational workflows over a [`ModelClient`](chatcraft_model::ModelClient):
//! 1. **Chatbot**: system prompt, user message, one model reply
//! 2. **Router**: a classifier labels the message `emotional` or `logical`
//!    and the matching persona answers it
//! 3. **Orchestrator**: the model decides whether to call an action, the
//!    executor runs it, and the result is observed and answered
//!
//! Model output is never evaluated. Calls are parsed with a strict grammar and
//! looked up in an [`ActionRegistry`].

pub mod action;
pub mod chatbot;
pub mod conversation;
pub mod executor;
pub mod extract;
pub mod orchestrator;
pub mod prompt;
pub mod router;

pub use action::{get_weather, weather_action, ActionRegistry, ActionSpec, Handler, HandlerError};
pub use chatbot::{Chatbot, CHATBOT_SYSTEM_PROMPT};
pub use conversation::Conversation;
pub use executor::{Executor, Observation};
pub use extract::{extract, Extraction, MalformedCall, MalformedReason, ParsedCall};
pub use orchestrator::{
    AgentConfig, AgentMode, MalformedPolicy, Orchestrator, State, TraceStep, TurnReport,
};
pub use prompt::compose_initial_prompt;
pub use router::{route, Branch, MessageType, RouteOutcome, RouterAgent};
