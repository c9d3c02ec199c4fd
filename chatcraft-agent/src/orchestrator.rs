//! Orchestrator - the Think-Act-Observe state machine
//!
//! ```text
//!            NoCall / malformed (answer)
//!   Decide ───────────────────────────────────────────► Done
//!     │ Call                                             ▲
//!     ▼                direct                            │
//!    Act ────────────────────────────────────────────────┤
//!     │ summarize / self-correct ok / budget spent       │
//!     ▼                                                  │
//!  Respond ──────────────────────────────────────────────┘
//! ```
//!
//! In `self-correct` mode a failed observation sends the machine back to
//! `Decide` while the retry budget lasts.

use crate::action::ActionRegistry;
use crate::conversation::Conversation;
use crate::executor::{Executor, Observation};
use crate::extract::{extract, Extraction, ParsedCall};
use crate::prompt::{compose_initial_prompt, direct_answer, RESPOND_INSTRUCTION};
use chatcraft_model::{Error, InvokeOptions, LlmProvider, ModelClient, Result, Role, Turn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens after an action runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentMode {
    /// Answer with the action output, no second model call
    #[default]
    Direct,
    /// Always ask the model to phrase the final answer
    Summarize,
    /// Feed failures back to the model and let it try again
    SelfCorrect,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Direct => "direct",
            AgentMode::Summarize => "summarize",
            AgentMode::SelfCorrect => "self-correct",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(AgentMode::Direct),
            "summarize" => Ok(AgentMode::Summarize),
            "self-correct" | "self_correct" => Ok(AgentMode::SelfCorrect),
            other => Err(Error::config_invalid(format!(
                "unknown agent mode '{}'; expected direct, summarize or self-correct",
                other
            ))
            .with_context("mode", other)),
        }
    }
}

/// How to treat a `tool_code` block that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Treat the reply as the final answer
    #[default]
    Answer,
    /// Tell the model what was wrong
    Reprompt,
}

impl MalformedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedPolicy::Answer => "answer",
            MalformedPolicy::Reprompt => "reprompt",
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MalformedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "answer" => Ok(MalformedPolicy::Answer),
            "reprompt" => Ok(MalformedPolicy::Reprompt),
            other => Err(Error::config_invalid(format!(
                "unknown malformed-call policy '{}'; expected answer or reprompt",
                other
            ))
            .with_context("on_malformed", other)),
        }
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub mode: AgentMode,
    /// Automatic retries per user turn (self-correct only)
    pub max_retries: usize,
    pub on_malformed: MalformedPolicy,
    /// Non-system turns sent to the model; 0 sends the whole conversation
    pub history_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::Direct,
            max_retries: 1,
            on_malformed: MalformedPolicy::Answer,
            history_window: 0,
        }
    }
}

impl AgentConfig {
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_on_malformed(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Decide,
    Act(ParsedCall),
    Respond,
    Done,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Decide => "decide",
            State::Act(_) => "act",
            State::Respond => "respond",
            State::Done => "done",
        }
    }
}

/// One visited state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub state: &'static str,
    pub detail: String,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.state, self.detail)
    }
}

/// Result of one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub answer: String,
    pub trace: Vec<TraceStep>,
    pub model_calls: usize,
    pub actions_executed: usize,
    pub retries: usize,
}

/// Drives one user turn through Decide / Act / Respond
pub struct Orchestrator<'a, P> {
    client: &'a ModelClient<P>,
    executor: Executor,
    config: AgentConfig,
}

impl<'a, P: LlmProvider> Orchestrator<'a, P> {
    pub fn new(client: &'a ModelClient<P>, registry: ActionRegistry) -> Self {
        Self::with_config(client, registry, AgentConfig::default())
    }

    pub fn with_config(client: &'a ModelClient<P>, registry: ActionRegistry, config: AgentConfig) -> Self {
        Self {
            client,
            executor: Executor::new(registry),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// One decision call. The conversation is not touched.
    ///
    /// While the conversation holds a single non-system turn, that turn is
    /// sent as the composed tool prompt instead of the raw message.
    pub async fn decide(&self, conversation: &Conversation) -> Result<Turn> {
        let mut turns = conversation.view(self.config.history_window);

        if let Some(opening) = conversation.opening_message() {
            let prompt = compose_initial_prompt(&opening.content, self.executor.registry().specs());
            if let Some(turn) = turns.iter_mut().find(|t| t.role == Role::User) {
                turn.content = prompt;
            }
        }

        self.client.invoke(&turns, &InvokeOptions::new()).await
    }

    /// Append `message` as a user turn and run the machine to `Done`.
    ///
    /// Model errors abort the turn and propagate; everything appended so far
    /// stays in the conversation.
    pub async fn run(&self, conversation: &mut Conversation, message: &str) -> Result<TurnReport> {
        conversation.push(Turn::user(message));

        let mut report = TurnReport {
            answer: String::new(),
            trace: Vec::new(),
            model_calls: 0,
            actions_executed: 0,
            retries: 0,
        };

        let mut state = State::Decide;
        loop {
            tracing::debug!(state = state.name(), mode = %self.config.mode, "agent step");
            state = match state {
                State::Decide => {
                    let reply = self.decide(conversation).await?;
                    report.model_calls += 1;
                    conversation.push(reply.clone());

                    match extract(&reply.content) {
                        Extraction::NoCall => {
                            record(&mut report, &State::Decide, "no call; reply is the answer");
                            State::Done
                        }
                        Extraction::Call(call) => {
                            record(&mut report, &State::Decide, format!("call {}", call));
                            State::Act(call)
                        }
                        Extraction::Malformed(malformed) => {
                            tracing::warn!(
                                reason = ?malformed.reason,
                                block = %malformed.block,
                                "malformed call in model reply"
                            );
                            if !malformed.reason.is_unsafe()
                                && self.config.on_malformed == MalformedPolicy::Answer
                            {
                                record(
                                    &mut report,
                                    &State::Decide,
                                    format!("malformed call ({}); reply is the answer", malformed.reason.describe()),
                                );
                                State::Done
                            } else {
                                record(
                                    &mut report,
                                    &State::Decide,
                                    format!("call not executed: {}", malformed.to_error()),
                                );
                                conversation.push(self.executor.reject(&malformed).to_turn());
                                self.after_failure(&mut report)
                            }
                        }
                    }
                }

                State::Act(call) => {
                    let observation = self.executor.execute(&call);
                    report.actions_executed += 1;
                    conversation.push(observation.to_turn());
                    record(&mut report, &State::Act(call.clone()), observation_detail(&observation));

                    match self.config.mode {
                        AgentMode::Direct => {
                            let prefix = self
                                .executor
                                .registry()
                                .lookup(&call.action_name)
                                .ok()
                                .and_then(|spec| spec.answer_prefix.as_deref());
                            let answer = direct_answer(&call.action_name, prefix, &observation);
                            conversation.push(Turn::assistant(answer));
                            State::Done
                        }
                        AgentMode::Summarize => State::Respond,
                        AgentMode::SelfCorrect if !observation.succeeded => self.after_failure(&mut report),
                        AgentMode::SelfCorrect => State::Respond,
                    }
                }

                State::Respond => {
                    let mut turns = conversation.view(self.config.history_window);
                    turns.push(Turn::system(RESPOND_INSTRUCTION));

                    let reply = self.client.invoke(&turns, &InvokeOptions::new()).await?;
                    report.model_calls += 1;
                    conversation.push(reply);
                    record(&mut report, &State::Respond, "final answer phrased by the model");
                    State::Done
                }

                State::Done => break,
            };
        }

        report.answer = conversation
            .last_assistant()
            .map(|t| t.content.clone())
            .unwrap_or_default();

        tracing::debug!(
            model_calls = report.model_calls,
            actions = report.actions_executed,
            retries = report.retries,
            "turn complete"
        );
        Ok(report)
    }

    /// Where a failed or refused call leads
    fn after_failure(&self, report: &mut TurnReport) -> State {
        if self.config.mode == AgentMode::SelfCorrect && report.retries < self.config.max_retries {
            report.retries += 1;
            tracing::info!(retry = report.retries, max = self.config.max_retries, "retrying after failure");
            State::Decide
        } else {
            State::Respond
        }
    }
}

fn record(report: &mut TurnReport, state: &State, detail: impl Into<String>) {
    report.trace.push(TraceStep {
        state: state.name(),
        detail: detail.into(),
    });
}

fn observation_detail(observation: &Observation) -> String {
    if observation.succeeded {
        format!("ok: {}", observation.text)
    } else {
        format!("failed: {}", observation.text)
    }
}
