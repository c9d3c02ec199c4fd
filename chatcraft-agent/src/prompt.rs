//! Prompt text for the tool-calling agent

use crate::action::ActionSpec;
use crate::executor::Observation;

pub const CALL_FENCE: &str = "```tool_code";
pub const OUTPUT_FENCE: &str = "```tool_output";

/// Appended as a system turn before the final phrasing pass
pub const RESPOND_INSTRUCTION: &str = "Using the conversation above, answer the user's \
question naturally in plain language. Summarize any tool results in your own words. \
Do not include tool_code or tool_output blocks, function calls, or other raw tool markup.";

/// Build the tool-aware prompt that replaces the first user message.
pub fn compose_initial_prompt<'a>(
    user_message: &str,
    actions: impl IntoIterator<Item = &'a ActionSpec>,
) -> String {
    let mut definitions = Vec::new();
    let mut example = None;

    for action in actions {
        let mut def = format!("def {}:\n    \"\"\"{}", action.signature(), action.description);
        if !action.argument_description.is_empty() {
            def.push_str(&format!("\n\n    {}: {}", action.argument_name, action.argument_description));
        }
        def.push_str("\"\"\"");
        definitions.push(def);

        if example.is_none() {
            example = Some(format!("{}(\"San Francisco\")", action.name));
        }
    }

    let example = example.unwrap_or_else(|| "function_name(\"argument\")".to_string());

    format!(
        r#"You are a helpful assistant with access to predefined Python functions. Think step by step why and how these functions should be used.

Available functions:
```python
{}
```

Instructions:
- Only use the predefined functions listed above
- Every function takes exactly one string argument
- When you need to call a function, wrap your function call in {}``` tags
- Call at most one function per reply
- Think about whether the user's request requires using a function
- If a function is needed, generate the appropriate function call
- Do not invent or hallucinate additional information

Example:
{}
{}
```

User: {}

Think step by step: Does this request require using one of the available functions? If yes, which function and with what parameters?"#,
        definitions.join("\n"),
        CALL_FENCE,
        CALL_FENCE,
        example,
        user_message
    )
}

/// Content of the turn that carries an observation back to the model
pub fn format_observation(observation: &Observation) -> String {
    format!("{}\n{}\n```", OUTPUT_FENCE, observation.text)
}

/// Answer built directly from an action result, without another model call
pub fn direct_answer(action: &str, prefix: Option<&str>, observation: &Observation) -> String {
    match prefix {
        Some(prefix) => format!("{}: {}", prefix, observation.text),
        None => format!("The {} result: {}", action, observation.text),
    }
}
