//! Call executor - runs a parsed call against the registry

use crate::action::ActionRegistry;
use crate::extract::{MalformedCall, ParsedCall};
use crate::prompt::format_observation;
use chatcraft_model::Turn;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What came back from running (or refusing) a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub succeeded: bool,
    pub text: String,
}

impl Observation {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            text: text.into(),
        }
    }

    /// The `tool` turn that carries this observation
    pub fn to_turn(&self) -> Turn {
        Turn::tool(format_observation(self))
    }
}

/// Executes calls by table lookup. Arguments are passed through as plain strings.
#[derive(Debug, Clone)]
pub struct Executor {
    registry: ActionRegistry,
}

impl Executor {
    pub fn new(registry: ActionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn execute(&self, call: &ParsedCall) -> Observation {
        let spec = match self.registry.lookup(&call.action_name) {
            Ok(spec) => spec,
            Err(_) => {
                tracing::warn!(action = %call.action_name, "unknown action");
                return Observation::failure(format!(
                    "Error: unknown action '{}'; available actions: {}",
                    call.action_name,
                    self.registry.names().join(", ")
                ));
            }
        };

        if let Some(keyword) = &call.keyword {
            if keyword != &spec.argument_name {
                tracing::warn!(action = %spec.name, keyword = %keyword, "unexpected keyword");
                return Observation::failure(format!(
                    "Error: action '{}' got an unexpected keyword argument '{}'; expected '{}'",
                    spec.name, keyword, spec.argument_name
                ));
            }
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| spec.call(&call.argument)));
        match outcome {
            Ok(Ok(text)) => {
                tracing::info!(action = %spec.name, argument = %call.argument, "action executed");
                Observation::success(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(action = %spec.name, error = %e, "action failed");
                Observation::failure(format!("Error: action '{}' failed: {}", spec.name, e))
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                tracing::warn!(action = %spec.name, panic = %message, "action panicked");
                Observation::failure(format!("Error: action '{}' failed: {}", spec.name, message))
            }
        }
    }

    /// Observation explaining why a block was not executed
    pub fn reject(&self, malformed: &MalformedCall) -> Observation {
        let verb = if malformed.reason.is_unsafe() {
            "rejected"
        } else {
            "could not be parsed"
        };
        Observation::failure(format!(
            "Error: the tool_code block {}: {}. Write exactly one call such as {}(\"...\") using one of: {}",
            verb,
            malformed.reason.describe(),
            self.registry.names().first().copied().unwrap_or("function_name"),
            self.registry.names().join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionSpec, HandlerError};
    use crate::extract::MalformedReason;
    use chatcraft_model::Role;

    fn executor() -> Executor {
        Executor::new(ActionRegistry::builtin())
    }

    #[test]
    fn test_weather_calls() {
        let exec = executor();
        assert_eq!(
            exec.execute(&ParsedCall::new("get_weather", "San Francisco")),
            Observation::success("It's 60 degrees and foggy.")
        );
        assert_eq!(
            exec.execute(&ParsedCall::new("get_weather", "Oslo")),
            Observation::success("It's 90 degrees and sunny.")
        );
        assert!(
            exec.execute(&ParsedCall::new("get_weather", "SF").with_keyword("location"))
                .succeeded
        );
    }

    #[test]
    fn test_unknown_action() {
        let observation = executor().execute(&ParsedCall::new("caps_lock_button", "x"));
        assert!(!observation.succeeded);
        assert_eq!(
            observation.text,
            "Error: unknown action 'caps_lock_button'; available actions: get_weather"
        );
    }

    #[test]
    fn test_wrong_keyword() {
        let observation =
            executor().execute(&ParsedCall::new("get_weather", "SF").with_keyword("city"));
        assert!(!observation.succeeded);
        assert!(observation.text.contains("'city'"));
    }

    #[test]
    fn test_handler_error_and_panic() {
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionSpec::new("flaky", "x", |_| Err(HandlerError::new("backend down"))))
            .unwrap();
        registry
            .register(ActionSpec::new("boom", "x", |_| panic!("kaboom")))
            .unwrap();
        let exec = Executor::new(registry);

        let observation = exec.execute(&ParsedCall::new("flaky", "a"));
        assert_eq!(observation, Observation::failure("Error: action 'flaky' failed: backend down"));

        let observation = exec.execute(&ParsedCall::new("boom", "a"));
        assert_eq!(observation, Observation::failure("Error: action 'boom' failed: kaboom"));
    }

    #[test]
    fn test_reject_and_turn() {
        let malformed = MalformedCall {
            block: "os.system(\"ls\")".into(),
            reason: MalformedReason::QualifiedCallee,
        };
        let observation = executor().reject(&malformed);
        assert!(!observation.succeeded);
        assert!(observation.text.contains("rejected"));

        let turn = observation.to_turn();
        assert_eq!(turn.role, Role::Tool);
        assert!(turn.content.starts_with("```tool_output\nError: the tool_code block rejected"));
        assert!(turn.content.ends_with("\n```"));
    }
}
