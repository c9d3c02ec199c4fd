//! # chatcraft CLI
//!
//! Command-line interface for the chatcraft workflows.
//!
//! Usage:
//!   chatcraft chat [MESSAGE...]
//!   chatcraft route
//!   chatcraft agent [--mode direct|summarize|self-correct] [MESSAGE...]
//!   chatcraft demo
//!   chatcraft actions
//!
//! Examples:
//!   chatcraft chat "Who are you?"
//!   chatcraft agent "What's the weather in SF?"
//!   chatcraft agent --mode self-correct --max-retries 2
//!   chatcraft --model gemma3:12b --log-file chatcraft.log route

mod config;

use chatcraft_agent::prompt::CALL_FENCE;
use chatcraft_agent::{
    extract, ActionRegistry, AgentConfig, Chatbot, Conversation, Extraction, Orchestrator,
    RouterAgent, TurnReport,
};
use chatcraft_model::{Error, ErrorKind, LlmProvider, ModelClient, Result, Role};
use clap::{Parser, Subcommand};
use config::{Overrides, Settings};
use std::io::{Stderr, Stdout, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

const LOG_ENV: &str = "CHATCRAFT_LOG";
const PROMPT: &str = "Enter a message: ";
const DEMO_QUESTIONS: [&str; 2] = ["What's the weather in SF?", "What's the weather in Oslo, Norway?"];

#[derive(Parser)]
#[command(name = "chatcraft")]
#[command(author, version, about = "chatcraft - conversational workflows on a local model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to chatcraft.toml (falls back to $CHATCRAFT_CONFIG, then ./chatcraft.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model backend (ollama or openai)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Backend base URL
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    base_url: Option<String>,

    /// Model name
    #[arg(short, long, global = true, env = "CHATCRAFT_MODEL")]
    model: Option<String>,

    /// API key for OpenAI-compatible backends
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-call model timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Append logs to this file and echo them to stdout
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print the whole conversation and the agent trace
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the chatbot one question
    Chat {
        /// The message (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Interactive emotional/logical router
    Route,
    /// Tool-calling agent, one-shot or interactive
    Agent {
        /// direct, summarize or self-correct
        #[arg(long)]
        mode: Option<String>,

        /// Automatic retries per turn in self-correct mode
        #[arg(long)]
        max_retries: Option<usize>,

        /// answer or reprompt
        #[arg(long)]
        on_malformed: Option<String>,

        /// Non-system turns sent to the model (0 = all)
        #[arg(long)]
        history_window: Option<usize>,

        /// The message (interactive loop when omitted)
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Run the two weather questions and print the conversation flow
    Demo,
    /// List registered actions
    Actions,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    match log_file {
        None => {
            let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::from(e)
                        .with_operation("logging::init")
                        .with_context("path", path.display().to_string())
                })?;
            let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::sync::Mutex::new(file))
                        .with_ansi(false),
                )
                .with(fmt::layer().with_writer(std::io::stdout))
                .init();
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut overrides = Overrides {
        provider: cli.provider.clone(),
        base_url: cli.base_url.clone(),
        model: cli.model.clone(),
        api_key: cli.api_key.clone(),
        timeout_secs: cli.timeout,
        ..Default::default()
    };
    if let Commands::Agent {
        mode,
        max_retries,
        on_malformed,
        history_window,
        ..
    } = &cli.command
    {
        overrides.mode = mode.clone();
        overrides.max_retries = *max_retries;
        overrides.on_malformed = on_malformed.clone();
        overrides.history_window = *history_window;
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(&overrides)?;

    let mut console = Console::stdio();
    match cli.command {
        Commands::Actions => {
            list_actions();
            Ok(())
        }
        Commands::Chat { message } => {
            let client = settings.build_client()?;
            console.chat(&client, message.join(" "), cli.verbose).await
        }
        Commands::Route => {
            let client = settings.build_client()?;
            console.route(&client).await.map(|_| ())
        }
        Commands::Agent { message, .. } => {
            let client = settings.build_client()?;
            let config = settings.agent_config();
            if message.is_empty() {
                console.agent_loop(&client, config, cli.verbose).await.map(|_| ())
            } else {
                console
                    .agent_once(&client, config, &message.join(" "), cli.verbose)
                    .await
            }
        }
        Commands::Demo => {
            let client = settings.build_client()?;
            console.demo(&client, settings.agent_config()).await
        }
    }
}

fn list_actions() {
    let registry = ActionRegistry::builtin();
    println!("Registered actions ({}):", registry.len());
    for spec in registry.specs() {
        println!("  {}", spec.signature());
        if !spec.description.is_empty() {
            println!("      {}", spec.description);
        }
    }
}

/// A line-oriented terminal: prompts and answers go to `out`, apologies to `err`
struct Console<R, O, E> {
    input: R,
    out: O,
    err: E,
}

impl Console<BufReader<Stdin>, Stdout, Stderr> {
    fn stdio() -> Self {
        Console {
            input: BufReader::new(tokio::io::stdin()),
            out: std::io::stdout(),
            err: std::io::stderr(),
        }
    }
}

impl<R, O, E> Console<R, O, E>
where
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    /// Prompt and read one line; `None` on EOF. Bytes that are not UTF-8
    /// are replaced rather than ending the session.
    async fn read_message(&mut self) -> Result<Option<String>> {
        write!(self.out, "{}", PROMPT)?;
        self.out.flush()?;

        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Per-turn failures never end an interactive session
    fn apologize(&mut self, error: &Error) -> Result<()> {
        tracing::error!(
            error = %error,
            kind = %error.kind(),
            status = %error.status(),
            "turn failed"
        );
        writeln!(self.err, "Sorry, I couldn't answer that: {}", error)?;
        if error.is_retryable() {
            writeln!(self.err, "The model backend may recover; try again.")?;
        }
        Ok(())
    }

    async fn chat<P: LlmProvider>(
        &mut self,
        client: &ModelClient<P>,
        message: String,
        verbose: bool,
    ) -> Result<()> {
        let message = if message.trim().is_empty() {
            match self.read_message().await? {
                Some(line) if !line.trim().is_empty() => line,
                _ => return Err(Error::new(ErrorKind::InvalidArgument, "no message given")),
            }
        } else {
            message
        };

        let bot = Chatbot::new(client);
        let mut conversation = Conversation::new();
        let reply = bot.reply(&mut conversation, message.trim()).await?;
        writeln!(self.out, "{}", reply.content)?;

        if verbose {
            print_conversation(&mut self.out, &conversation)?;
            writeln!(self.out, "\nUsage: {}", client.usage())?;
        }
        Ok(())
    }

    /// Emotional/logical loop until EOF or an exit word
    async fn route<P: LlmProvider>(&mut self, client: &ModelClient<P>) -> Result<Conversation> {
        let router = RouterAgent::new(client);
        let mut conversation = Conversation::new();

        loop {
            let Some(line) = self.read_message().await? else {
                writeln!(self.out)?;
                break;
            };
            if is_exit(&line) {
                writeln!(self.out, "Exiting the chatbot.")?;
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            match router.run(&mut conversation, line.trim()).await {
                Ok(outcome) => {
                    let label = outcome.label.map(|l| l.as_str()).unwrap_or("unknown");
                    writeln!(self.out, "Classifier result: {}", label)?;
                    writeln!(self.out, "{}", outcome.answer)?;
                }
                Err(e) => self.apologize(&e)?,
            }
        }
        Ok(conversation)
    }

    async fn agent_once<P: LlmProvider>(
        &mut self,
        client: &ModelClient<P>,
        config: AgentConfig,
        message: &str,
        verbose: bool,
    ) -> Result<()> {
        let agent = Orchestrator::with_config(client, ActionRegistry::builtin(), config);
        let mut conversation = Conversation::new();

        let report = agent.run(&mut conversation, message).await?;
        writeln!(self.out, "{}", report.answer)?;

        if verbose {
            print_trace(&mut self.out, &report)?;
            print_conversation(&mut self.out, &conversation)?;
            writeln!(self.out, "\nUsage: {}", client.usage())?;
        }
        Ok(())
    }

    /// One conversation across turns until EOF or an exit word
    async fn agent_loop<P: LlmProvider>(
        &mut self,
        client: &ModelClient<P>,
        config: AgentConfig,
        verbose: bool,
    ) -> Result<Conversation> {
        let agent = Orchestrator::with_config(client, ActionRegistry::builtin(), config);
        let mut conversation = Conversation::new();

        loop {
            let Some(line) = self.read_message().await? else {
                writeln!(self.out)?;
                break;
            };
            if is_exit(&line) {
                writeln!(self.out, "Exiting the agent.")?;
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            match agent.run(&mut conversation, line.trim()).await {
                Ok(report) => {
                    writeln!(self.out, "{}", report.answer)?;
                    if verbose {
                        print_trace(&mut self.out, &report)?;
                    }
                }
                Err(e) => self.apologize(&e)?,
            }
        }

        if verbose {
            print_conversation(&mut self.out, &conversation)?;
            writeln!(self.out, "\nUsage: {}", client.usage())?;
        }
        Ok(conversation)
    }

    async fn demo<P: LlmProvider>(&mut self, client: &ModelClient<P>, config: AgentConfig) -> Result<()> {
        let agent = Orchestrator::with_config(client, ActionRegistry::builtin(), config);

        for question in DEMO_QUESTIONS {
            let mut conversation = Conversation::new();
            if let Err(e) = agent.run(&mut conversation, question).await {
                self.apologize(&e)?;
            }
            print_flow(&mut self.out, &conversation)?;
            writeln!(self.out)?;
        }
        Ok(())
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "exit" | "quit" | "q")
}

fn print_conversation(out: &mut impl Write, conversation: &Conversation) -> std::io::Result<()> {
    writeln!(out, "\n--- Conversation ({} turns) ---\n", conversation.len())?;
    for turn in conversation.turns() {
        writeln!(out, "[{}]\n{}\n", turn.role.as_str().to_uppercase(), turn.content)?;
    }
    Ok(())
}

fn print_flow(out: &mut impl Write, conversation: &Conversation) -> std::io::Result<()> {
    writeln!(out, "=== CONVERSATION FLOW ===")?;
    let turns = conversation.turns();

    for (i, turn) in turns.iter().enumerate() {
        writeln!(out, "\n--- Message {} ---", i + 1)?;
        writeln!(out, "Role: {}", turn.role)?;
        writeln!(out, "Content: {}", turn.content)?;

        if turn.role == Role::Assistant && turn.content.contains(CALL_FENCE) {
            writeln!(out, "TOOL CALL DETECTED")?;
            match extract(&turn.content) {
                Extraction::Call(call) => writeln!(out, "Parsed call: {}", call)?,
                Extraction::Malformed(m) => writeln!(out, "Malformed call: {}", m.reason.describe())?,
                Extraction::NoCall => {}
            }
            if let Some(result) = turns.get(i + 1).filter(|t| t.role == Role::Tool) {
                writeln!(out, "Tool Result: {}", result.content)?;
            }
        }
    }
    Ok(())
}

fn print_trace(out: &mut impl Write, report: &TurnReport) -> std::io::Result<()> {
    writeln!(
        out,
        "\n--- Agent Trace ({} steps, {} model calls, {} retries) ---",
        report.trace.len(),
        report.model_calls,
        report.retries
    )?;
    for (i, step) in report.trace.iter().enumerate() {
        writeln!(out, "  {:3}. {}", i + 1, step)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcraft_model::{ProviderError, ScriptedProvider};

    fn console(input: &[u8]) -> Console<&[u8], Vec<u8>, Vec<u8>> {
        Console {
            input,
            out: Vec::new(),
            err: Vec::new(),
        }
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn user_turns(conversation: &Conversation) -> Vec<String> {
        conversation
            .turns()
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_router_loop_survives_failed_turns() {
        let client = ModelClient::new(ScriptedProvider::sequence(vec![
            Ok(r#"{"message_type": "emotional"}"#.into()),
            Ok("I'm sorry you feel that way.".into()),
            Err(ProviderError::Network("connection refused".into())),
            Ok(r#"{"message_type": "logical"}"#.into()),
            Ok("4".into()),
        ]));
        let mut console = console(b"I feel sad\n\xff\xfe hello\n\nWhat is 2+2?\n");

        let conversation = console.route(&client).await.unwrap();

        let out = text(&console.out);
        assert!(out.contains("Classifier result: emotional\nI'm sorry you feel that way."));
        assert!(out.contains("Classifier result: logical\n4"));
        assert_eq!(out.matches(PROMPT).count(), 5);
        let err = text(&console.err);
        assert!(err.starts_with("Sorry, I couldn't answer that: model unavailable"));
        assert!(err.contains("try again"));

        assert_eq!(
            user_turns(&conversation),
            ["I feel sad", "\u{FFFD}\u{FFFD} hello", "What is 2+2?"]
        );
        assert_eq!(conversation.last_assistant().unwrap().content, "4");
    }

    #[tokio::test]
    async fn test_agent_loop_keeps_history_and_stops_on_exit() {
        let client = ModelClient::new(ScriptedProvider::sequence(vec![
            Ok("```tool_code\nget_weather(\"SF\")\n```".into()),
            Err(ProviderError::Timeout),
            Ok("You're welcome!".into()),
        ]));
        let mut console = console(b"What's the weather in SF?\nand Oslo?\nthanks\n  QUIT \nnever read\n");

        let conversation = console
            .agent_loop(&client, AgentConfig::default(), false)
            .await
            .unwrap();

        let out = text(&console.out);
        assert!(out.contains("It's 60 degrees and foggy."));
        assert!(out.contains("You're welcome!"));
        assert!(out.ends_with("Exiting the agent.\n"));
        assert_eq!(text(&console.err).matches("Sorry, I couldn't answer that").count(), 1);

        assert_eq!(
            user_turns(&conversation),
            ["What's the weather in SF?", "and Oslo?", "thanks"]
        );
        assert_eq!(client.provider().call_count(), 3);
    }

    #[tokio::test]
    async fn test_eof_ends_loop_cleanly() {
        let client = ModelClient::new(ScriptedProvider::constant("unused"));
        let mut console = console(b"");

        let conversation = console.route(&client).await.unwrap();

        assert!(conversation.is_empty());
        assert!(console.err.is_empty());
        assert_eq!(client.provider().call_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_reads_stdin_when_no_message() {
        let client = ModelClient::new(ScriptedProvider::constant("I'm Tim."));
        let mut console = console(b"Who are you?\r\n");

        console.chat(&client, String::new(), false).await.unwrap();

        assert_eq!(text(&console.out), format!("{}I'm Tim.\n", PROMPT));
        let request = client.provider().requests().pop().unwrap();
        assert_eq!(request.messages.last().unwrap().content, "Who are you?");
    }

    #[test]
    fn test_empty_config_env_is_accepted() {
        std::env::set_var(config::CONFIG_ENV, "");
        let cli = Cli::try_parse_from(["chatcraft", "actions"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_exit_words() {
        for word in ["exit", "QUIT", "  q  ", "Exit\n"] {
            assert!(is_exit(word), "{:?}", word);
        }
        for word in ["", "quitting", "what's the weather?"] {
            assert!(!is_exit(word), "{:?}", word);
        }
    }

    #[test]
    fn test_cli_parses_agent_flags() {
        let cli = Cli::try_parse_from([
            "chatcraft",
            "agent",
            "--mode",
            "self-correct",
            "--max-retries",
            "2",
            "What's",
            "the",
            "weather?",
        ])
        .unwrap();

        match cli.command {
            Commands::Agent { mode, max_retries, message, .. } => {
                assert_eq!(mode.as_deref(), Some("self-correct"));
                assert_eq!(max_retries, Some(2));
                assert_eq!(message.join(" "), "What's the weather?");
            }
            _ => panic!("expected agent command"),
        }
    }
}
