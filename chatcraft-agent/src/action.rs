//! Action registry - statically known single-argument functions

use chatcraft_model::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Failure reported by an action handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

pub type Handler = Arc<dyn Fn(&str) -> std::result::Result<String, HandlerError> + Send + Sync>;

/// A named action the model may call with one string argument
#[derive(Clone)]
pub struct ActionSpec {
    pub name: String,
    pub argument_name: String,
    pub argument_description: String,
    pub description: String,
    /// Lead-in for answers built straight from this action's output
    pub answer_prefix: Option<String>,
    handler: Handler,
}

impl ActionSpec {
    pub fn new<F>(name: impl Into<String>, argument_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            argument_name: argument_name.into(),
            argument_description: String::new(),
            description: String::new(),
            answer_prefix: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_argument_description(mut self, description: impl Into<String>) -> Self {
        self.argument_description = description.into();
        self
    }

    pub fn with_answer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.answer_prefix = Some(prefix.into());
        self
    }

    pub fn call(&self, argument: &str) -> std::result::Result<String, HandlerError> {
        (self.handler)(argument)
    }

    /// `name(argument: str) -> str`
    pub fn signature(&self) -> String {
        format!("{}({}: str) -> str", self.name, self.argument_name)
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .field("argument_name", &self.argument_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Name → action table, filled once at start-up.
///
/// Iteration is ordered by name so prompts built from it are reproducible.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionSpec>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in actions (`get_weather`)
    pub fn builtin() -> Self {
        let actions = [weather_action()]
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        Self { actions }
    }

    pub fn register(&mut self, spec: ActionSpec) -> Result<()> {
        if self.actions.contains_key(&spec.name) {
            return Err(Error::duplicate_action(&spec.name).with_operation("registry::register"));
        }
        self.actions.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ActionSpec> {
        self.actions
            .get(name)
            .ok_or_else(|| Error::action_not_found(name).with_operation("registry::lookup"))
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

pub fn get_weather(location: &str) -> String {
    match location.trim().to_lowercase().as_str() {
        "sf" | "san francisco" => "It's 60 degrees and foggy.".to_string(),
        _ => "It's 90 degrees and sunny.".to_string(),
    }
}

pub fn weather_action() -> ActionSpec {
    ActionSpec::new("get_weather", "location", |location| Ok(get_weather(location)))
        .with_description("Returns weather info for a location.")
        .with_argument_description("city or place name, e.g. \"San Francisco\"")
        .with_answer_prefix("The weather information")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcraft_model::ErrorKind;

    #[test]
    fn test_weather_cases() {
        assert_eq!(get_weather("San Francisco"), "It's 60 degrees and foggy.");
        assert_eq!(get_weather(" SF "), "It's 60 degrees and foggy.");
        assert_eq!(get_weather("Oslo"), "It's 90 degrees and sunny.");
        assert_eq!(get_weather(""), "It's 90 degrees and sunny.");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ActionRegistry::builtin();
        let err = registry.register(weather_action()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateAction);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup() {
        let registry = ActionRegistry::builtin();
        assert_eq!(registry.names(), vec!["get_weather"]);
        assert_eq!(registry.lookup("get_weather").unwrap().argument_name, "location");

        let err = registry.lookup("caps_lock_button").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ActionNotFound);
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = ActionRegistry::new();
        registry.register(ActionSpec::new("zeta", "x", |x| Ok(x.to_string()))).unwrap();
        registry.register(ActionSpec::new("alpha", "x", |x| Ok(x.to_string()))).unwrap();

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.lookup("alpha").unwrap().signature(), "alpha(x: str) -> str");
    }
}
