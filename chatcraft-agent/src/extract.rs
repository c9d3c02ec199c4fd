//! Call extraction from free-text model output.
//!
//! Only the first ```` ```tool_code ```` block counts. Its body must be a single
//! call of the form
//!
//! ```text
//! call     := ws identifier ws "(" ws [identifier ws "=" ws] string ws [","] ws ")" ws
//! string   := '"' chars '"' | "'" chars "'"
//! ```
//!
//! Nothing in the block is ever evaluated. Anything outside this shape is
//! reported as a [`MalformedCall`], with unsafe shapes (qualified names,
//! dunder names, nested calls, several statements) told apart so the caller
//! can reject them outright.

use crate::prompt::CALL_FENCE;
use chatcraft_model::{Error, ErrorKind};
use std::fmt;

/// A call the model asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    pub action_name: String,
    pub argument: String,
    /// `Some("location")` for `get_weather(location="SF")`
    pub keyword: Option<String>,
}

impl ParsedCall {
    pub fn new(action_name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            argument: argument.into(),
            keyword: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
}

impl fmt::Display for ParsedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.keyword {
            Some(k) => write!(f, "{}({}={:?})", self.action_name, k, self.argument),
            None => write!(f, "{}({:?})", self.action_name, self.argument),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    EmptyBlock,
    UnterminatedBlock,
    MissingCallee,
    MissingOpenParen,
    MissingCloseParen,
    NoArguments,
    TooManyArguments,
    NotAStringLiteral,
    UnterminatedString,
    TrailingInput,
    // unsafe shapes
    QualifiedCallee,
    ReservedName,
    NestedCall,
    MultipleStatements,
}

impl MalformedReason {
    pub fn is_unsafe(&self) -> bool {
        matches!(
            self,
            MalformedReason::QualifiedCallee
                | MalformedReason::ReservedName
                | MalformedReason::NestedCall
                | MalformedReason::MultipleStatements
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MalformedReason::EmptyBlock => "the tool_code block is empty",
            MalformedReason::UnterminatedBlock => "the tool_code block is never closed",
            MalformedReason::MissingCallee => "expected a function name",
            MalformedReason::MissingOpenParen => "expected '(' after the function name",
            MalformedReason::MissingCloseParen => "expected ')' after the argument",
            MalformedReason::NoArguments => "the call has no argument; exactly one string is required",
            MalformedReason::TooManyArguments => "the call has more than one argument",
            MalformedReason::NotAStringLiteral => "the argument must be a quoted string",
            MalformedReason::UnterminatedString => "the string argument is never closed",
            MalformedReason::TrailingInput => "unexpected text after the call",
            MalformedReason::QualifiedCallee => "qualified names such as module.function are not allowed",
            MalformedReason::ReservedName => "reserved names are not allowed",
            MalformedReason::NestedCall => "nested calls are not allowed",
            MalformedReason::MultipleStatements => "only one call per block is allowed",
        }
    }
}

/// A `tool_code` block that is not an acceptable call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCall {
    pub block: String,
    pub reason: MalformedReason,
}

impl MalformedCall {
    pub fn kind(&self) -> ErrorKind {
        if self.reason.is_unsafe() {
            ErrorKind::UnsafeCallRejected
        } else {
            ErrorKind::MalformedCall
        }
    }

    pub fn to_error(&self) -> Error {
        Error::new(self.kind(), self.reason.describe())
            .with_operation("extract::extract")
            .with_context("block", self.block.clone())
    }
}

/// Outcome of scanning one model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// No `tool_code` block: the reply is a final answer
    NoCall,
    Call(ParsedCall),
    Malformed(MalformedCall),
}

pub fn extract(text: &str) -> Extraction {
    let Some(start) = text.find(CALL_FENCE) else {
        return Extraction::NoCall;
    };

    let after = &text[start + CALL_FENCE.len()..];
    let Some(end) = after.find("```") else {
        return Extraction::Malformed(MalformedCall {
            block: after.trim().to_string(),
            reason: MalformedReason::UnterminatedBlock,
        });
    };

    let block = after[..end].trim();
    match parse_call(block) {
        Ok(call) => Extraction::Call(call),
        Err(reason) => Extraction::Malformed(MalformedCall {
            block: block.to_string(),
            reason,
        }),
    }
}

/// Parse the body of a block as a single call
pub fn parse_call(source: &str) -> Result<ParsedCall, MalformedReason> {
    let mut cur = Cursor::new(source);
    cur.skip_ws();
    if cur.at_end() {
        return Err(MalformedReason::EmptyBlock);
    }

    let name = cur.ident().ok_or(MalformedReason::MissingCallee)?;
    if cur.peek() == Some('.') {
        return Err(MalformedReason::QualifiedCallee);
    }
    if name.starts_with("__") {
        return Err(MalformedReason::ReservedName);
    }

    cur.skip_ws();
    if !cur.eat('(') {
        return Err(MalformedReason::MissingOpenParen);
    }
    cur.skip_ws();

    match cur.peek() {
        None => return Err(MalformedReason::MissingCloseParen),
        Some(')') => return Err(MalformedReason::NoArguments),
        _ => {}
    }

    let mut keyword = None;
    if cur.peek().is_some_and(is_ident_start) {
        let checkpoint = cur.pos;
        let word = cur.ident().unwrap_or_default();
        cur.skip_ws();
        match cur.peek() {
            Some('=') => {
                cur.bump();
                cur.skip_ws();
                keyword = Some(word.to_string());
            }
            Some('(') => return Err(MalformedReason::NestedCall),
            _ => {
                cur.pos = checkpoint;
                return Err(MalformedReason::NotAStringLiteral);
            }
        }
    }

    let argument = match cur.peek() {
        Some(q @ ('"' | '\'')) => {
            cur.bump();
            cur.string_body(q)?
        }
        Some(c) if is_ident_start(c) => {
            cur.ident();
            cur.skip_ws();
            return Err(if cur.peek() == Some('(') {
                MalformedReason::NestedCall
            } else {
                MalformedReason::NotAStringLiteral
            });
        }
        None => return Err(MalformedReason::MissingCloseParen),
        Some(_) => return Err(MalformedReason::NotAStringLiteral),
    };

    cur.skip_ws();
    if cur.eat(',') {
        cur.skip_ws();
        if cur.peek().is_some_and(|c| c != ')') {
            return Err(MalformedReason::TooManyArguments);
        }
    }
    match cur.peek() {
        Some(')') => {
            cur.bump();
        }
        None => return Err(MalformedReason::MissingCloseParen),
        Some(_) => return Err(MalformedReason::NotAStringLiteral),
    }

    let rest = cur.rest().trim_start_matches([' ', '\t']);
    if !rest.trim().is_empty() {
        return Err(if rest.starts_with([';', '\n', '\r']) {
            MalformedReason::MultipleStatements
        } else {
            MalformedReason::TrailingInput
        });
    }

    Ok(ParsedCall {
        action_name: name.to_string(),
        argument,
        keyword,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        Some(&self.src[start..self.pos])
    }

    /// Raw text of a string literal; the opening quote is already consumed.
    /// A backslash only stops the next character from closing the literal,
    /// and both are kept as written.
    fn string_body(&mut self, quote: char) -> Result<String, MalformedReason> {
        let start = self.pos;
        loop {
            match self.bump().ok_or(MalformedReason::UnterminatedString)? {
                c if c == quote => {
                    return Ok(self.src[start..self.pos - quote.len_utf8()].to_string());
                }
                '\n' => return Err(MalformedReason::UnterminatedString),
                '\\' => {
                    if self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRegistry;
    use crate::prompt::compose_initial_prompt;

    fn block(body: &str) -> String {
        format!("Let me check.\n```tool_code\n{}\n```\nDone.", body)
    }

    fn reason_of(body: &str) -> MalformedReason {
        match extract(&block(body)) {
            Extraction::Malformed(m) => m.reason,
            other => panic!("expected malformed for {:?}, got {:?}", body, other),
        }
    }

    #[test]
    fn test_no_block_is_no_call() {
        assert_eq!(extract("It's sunny, no tools needed."), Extraction::NoCall);
        assert_eq!(extract("```python\nprint(1)\n```"), Extraction::NoCall);
    }

    #[test]
    fn test_simple_call() {
        assert_eq!(
            extract(&block("get_weather(\"San Francisco\")")),
            Extraction::Call(ParsedCall::new("get_weather", "San Francisco"))
        );
        assert_eq!(
            extract("```tool_code get_weather('Oslo, Norway')```"),
            Extraction::Call(ParsedCall::new("get_weather", "Oslo, Norway"))
        );
    }

    #[test]
    fn test_keyword_and_trailing_comma() {
        assert_eq!(
            extract(&block("get_weather(location = \"SF\")")),
            Extraction::Call(ParsedCall::new("get_weather", "SF").with_keyword("location"))
        );
        assert_eq!(
            extract(&block("get_weather(\"SF\",)")),
            Extraction::Call(ParsedCall::new("get_weather", "SF"))
        );
    }

    #[test]
    fn test_backslashes_are_kept_verbatim() {
        assert_eq!(
            extract(&block(r#"get_weather("C:\new\table")"#)),
            Extraction::Call(ParsedCall::new("get_weather", r"C:\new\table"))
        );
        assert_eq!(
            extract(&block(r#"echo("say \"hi\" now")"#)),
            Extraction::Call(ParsedCall::new("echo", r#"say \"hi\" now"#))
        );
        assert_eq!(
            extract(&block(r"echo('it\'s')")),
            Extraction::Call(ParsedCall::new("echo", r"it\'s"))
        );
    }

    #[test]
    fn test_first_block_only() {
        let text = "```tool_code\nget_weather(\"SF\")\n```\nand\n```tool_code\nget_weather(\"Oslo\")\n```";
        assert_eq!(extract(text), Extraction::Call(ParsedCall::new("get_weather", "SF")));

        let text = "```tool_code\noops\n```\n```tool_code\nget_weather(\"Oslo\")\n```";
        assert!(matches!(extract(text), Extraction::Malformed(_)));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(reason_of(""), MalformedReason::EmptyBlock);
        assert_eq!(reason_of("(\"SF\")"), MalformedReason::MissingCallee);
        assert_eq!(reason_of("get_weather"), MalformedReason::MissingOpenParen);
        assert_eq!(reason_of("get_weather(\"SF\""), MalformedReason::MissingCloseParen);
        assert_eq!(reason_of("get_weather()"), MalformedReason::NoArguments);
        assert_eq!(reason_of("get_weather(\"a\", \"b\")"), MalformedReason::TooManyArguments);
        assert_eq!(reason_of("get_weather(city)"), MalformedReason::NotAStringLiteral);
        assert_eq!(reason_of("get_weather(42)"), MalformedReason::NotAStringLiteral);
        assert_eq!(reason_of("get_weather(\"a\" + \"b\")"), MalformedReason::NotAStringLiteral);
        assert_eq!(reason_of("get_weather(\"SF)"), MalformedReason::UnterminatedString);
        assert_eq!(reason_of(r#"get_weather("SF\")"#), MalformedReason::UnterminatedString);
        assert_eq!(reason_of("get_weather(\"SF\") now"), MalformedReason::TrailingInput);

        match extract("```tool_code\nget_weather(\"SF\")") {
            Extraction::Malformed(m) => {
                assert_eq!(m.reason, MalformedReason::UnterminatedBlock);
                assert_eq!(m.kind(), ErrorKind::MalformedCall);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unsafe_shapes_are_flagged() {
        assert_eq!(reason_of("os.system(\"ls\")"), MalformedReason::QualifiedCallee);
        assert_eq!(
            reason_of("__import__(\"os\").system(\"rm -rf /\")"),
            MalformedReason::ReservedName
        );
        assert_eq!(reason_of("get_weather(open(\"/etc/passwd\"))"), MalformedReason::NestedCall);
        assert_eq!(
            reason_of("get_weather(\"a\"); get_weather(\"b\")"),
            MalformedReason::MultipleStatements
        );
        assert_eq!(
            reason_of("get_weather(\"a\")\nget_weather(\"b\")"),
            MalformedReason::MultipleStatements
        );

        let malformed = MalformedCall {
            block: "os.system(\"ls\")".into(),
            reason: MalformedReason::QualifiedCallee,
        };
        let err = malformed.to_error();
        assert_eq!(err.kind(), ErrorKind::UnsafeCallRejected);
        assert_eq!(err.context()[0].1, "os.system(\"ls\")");
    }

    #[test]
    fn test_round_trip_with_composed_prompt() {
        let registry = ActionRegistry::builtin();
        let prompt = compose_initial_prompt("weather?", registry.specs());
        assert!(prompt.contains("get_weather"));

        let arguments = [
            "X",
            "San Francisco",
            "Oslo, Norway",
            "",
            "  padded  ",
            "São Paulo",
            "a'b",
            "line1 (two)",
            r"C:\new\table",
            r"a\\b",
            r"tab\tnot decoded",
            r#"quoted \"inner\""#,
        ];
        for x in arguments {
            let reply = format!("```tool_code\nget_weather(\"{}\")\n```", x);
            assert_eq!(
                extract(&reply),
                Extraction::Call(ParsedCall::new("get_weather", x)),
                "argument {:?}",
                x
            );
        }
    }
}
