//! `chatcraft.toml` loading and command-line overrides

use chatcraft_agent::{AgentConfig, AgentMode, MalformedPolicy};
use chatcraft_model::error::from_provider;
use chatcraft_model::provider::{DEFAULT_OLLAMA_MODEL, DEFAULT_OPENAI_MODEL};
use chatcraft_model::{
    AnyProvider, Error, InvokeOptions, ModelClient, ProviderConfig, ProviderType, Result,
};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "CHATCRAFT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "chatcraft.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub model: ModelSettings,
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub provider: ProviderType,
    pub base_url: Option<String>,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    pub num_ctx: usize,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderType::Ollama,
            base_url: None,
            model: None,
            num_ctx: 4096,
            temperature: None,
            timeout_secs: 120,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub mode: AgentMode,
    pub max_retries: usize,
    pub on_malformed: MalformedPolicy,
    pub history_window: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let config = AgentConfig::default();
        Self {
            mode: config.mode,
            max_retries: config.max_retries,
            on_malformed: config.on_malformed,
            history_window: config.history_window,
        }
    }
}

/// Values given on the command line (or their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub mode: Option<String>,
    pub max_retries: Option<usize>,
    pub on_malformed: Option<String>,
    pub history_window: Option<usize>,
}

/// Config file to read: explicit path, then `$CHATCRAFT_CONFIG`, then
/// `./chatcraft.toml` if it exists.
pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| path_from_env(std::env::var_os(CONFIG_ENV)))
        .or_else(|| {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.is_file().then_some(local)
        })
}

/// An empty variable counts as unset
fn path_from_env(value: Option<OsString>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}

impl Settings {
    /// Load settings, or defaults when no config file is found
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match resolve_path(explicit) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;
        tracing::debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&text).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text).map_err(|e| {
            Error::config_invalid(format!("invalid config: {}", e))
                .with_operation("config::parse")
                .set_source(e)
        })?;
        settings.validate()?;
        settings.model.base_url = settings.model.base_url.as_deref().map(normalize_url);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.num_ctx == 0 {
            return Err(Error::config_invalid("model.num_ctx must be greater than zero"));
        }
        if self.model.timeout_secs == 0 {
            return Err(Error::config_invalid("model.timeout_secs must be greater than zero"));
        }
        if let Some(t) = self.model.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::config_invalid(format!(
                    "model.temperature must be between 0 and 2, got {}",
                    t
                )));
            }
        }
        if let Some(url) = &self.model.base_url {
            if url.trim().is_empty() {
                return Err(Error::config_invalid("model.base_url must not be empty"));
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(provider) = &overrides.provider {
            self.model.provider = provider
                .parse()
                .map_err(|e: String| Error::config_invalid(e).with_context("provider", provider.clone()))?;
        }
        if let Some(url) = &overrides.base_url {
            self.model.base_url = Some(normalize_url(url));
        }
        if let Some(model) = &overrides.model {
            self.model.model = Some(model.clone());
        }
        if let Some(key) = &overrides.api_key {
            self.model.api_key = Some(key.clone());
        }
        if let Some(secs) = overrides.timeout_secs {
            self.model.timeout_secs = secs;
        }
        if let Some(mode) = &overrides.mode {
            self.agent.mode = mode.parse()?;
        }
        if let Some(n) = overrides.max_retries {
            self.agent.max_retries = n;
        }
        if let Some(policy) = &overrides.on_malformed {
            self.agent.on_malformed = policy.parse()?;
        }
        if let Some(window) = overrides.history_window {
            self.agent.history_window = window;
        }
        self.validate()
    }

    pub fn model_name(&self) -> String {
        self.model.model.clone().unwrap_or_else(|| {
            match self.model.provider {
                ProviderType::Ollama => DEFAULT_OLLAMA_MODEL,
                ProviderType::OpenAI => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        })
    }

    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let model = self.model_name();
        let config = match self.model.provider {
            ProviderType::Ollama => {
                let config = ProviderConfig::ollama(model);
                match &self.model.base_url {
                    Some(url) => config.with_base_url(url.clone()),
                    None => config,
                }
            }
            ProviderType::OpenAI => match (&self.model.api_key, &self.model.base_url) {
                (Some(key), Some(url)) => ProviderConfig::openai(key.clone())
                    .with_model(model)
                    .with_base_url(url.clone()),
                (Some(key), None) => ProviderConfig::openai(key.clone()).with_model(model),
                (None, Some(url)) => ProviderConfig::local(url.clone(), model),
                (None, None) => {
                    return Err(Error::config_invalid(
                        "the openai provider needs model.api_key (or OPENAI_API_KEY) or a model.base_url",
                    ))
                }
            },
        };
        Ok(config.with_timeout(self.model.timeout_secs))
    }

    pub fn invoke_defaults(&self) -> InvokeOptions {
        let options = InvokeOptions::new()
            .with_model(self.model_name())
            .with_num_ctx(self.model.num_ctx);
        match self.model.temperature {
            Some(t) => options.with_temperature(t),
            None => options,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.model.timeout_secs)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_mode(self.agent.mode)
            .with_max_retries(self.agent.max_retries)
            .with_on_malformed(self.agent.on_malformed)
            .with_history_window(self.agent.history_window)
    }

    pub fn build_client(&self) -> Result<ModelClient<AnyProvider>> {
        let config = self.provider_config()?;
        let provider = AnyProvider::from_config(config).map_err(|e| {
            from_provider(e, self.model.provider_name(), &self.model_name())
                .with_operation("config::build_client")
        })?;
        tracing::debug!(
            provider = self.model.provider_name(),
            model = %self.model_name(),
            timeout_secs = self.model.timeout_secs,
            "model client ready"
        );
        Ok(ModelClient::new(provider)
            .with_defaults(self.invoke_defaults())
            .with_timeout(self.timeout()))
    }
}

impl ModelSettings {
    fn provider_name(&self) -> &'static str {
        match self.provider {
            ProviderType::Ollama => "ollama",
            ProviderType::OpenAI => "openai",
        }
    }
}

/// Hosts are often given without a scheme (`127.0.0.1:11434`)
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcraft_model::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model.provider, ProviderType::Ollama);
        assert_eq!(settings.model_name(), "gemma3:4b");
        assert_eq!(settings.model.num_ctx, 4096);
        assert_eq!(settings.timeout(), Duration::from_secs(120));
        assert_eq!(settings.agent_config(), AgentConfig::default());

        let defaults = settings.invoke_defaults();
        assert_eq!(defaults.num_ctx, Some(4096));
        assert_eq!(defaults.temperature, None);
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [model]
            provider = "openai"
            base_url = "http://localhost:8000/v1"
            model = "qwen2.5:7b"
            num_ctx = 8192
            temperature = 0.2
            timeout_secs = 30

            [agent]
            mode = "self-correct"
            max_retries = 3
            on_malformed = "reprompt"
            history_window = 20
            "#,
        )
        .unwrap();

        assert_eq!(settings.model.provider, ProviderType::OpenAI);
        assert_eq!(settings.agent.mode, AgentMode::SelfCorrect);
        assert_eq!(settings.agent.on_malformed, MalformedPolicy::Reprompt);
        assert_eq!(settings.agent_config().max_retries, 3);

        let config = settings.provider_config().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(config.default_model.as_deref(), Some("qwen2.5:7b"));
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_toml_str("[agent]\nmode = \"summarize\"\n").unwrap();
        assert_eq!(settings.agent.mode, AgentMode::Summarize);
        assert_eq!(settings.agent.max_retries, 1);
        assert_eq!(settings.model, ModelSettings::default());
    }

    #[test]
    fn test_invalid_values() {
        for text in [
            "[model]\nprovider = \"anthropic\"\n",
            "[agent]\nmode = \"loop\"\n",
            "[agent]\non_malformed = \"ignore\"\n",
            "[model]\nnum_ctx = 0\n",
            "[model]\ntemperature = 5.0\n",
            "[model]\nunknown_key = 1\n",
            "not toml at all [",
        ] {
            let err = Settings::from_toml_str(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid, "config {:?}", text);
        }
    }

    #[test]
    fn test_openai_needs_key_or_url() {
        let mut settings = Settings::default();
        settings.model.provider = ProviderType::OpenAI;
        assert_eq!(
            settings.provider_config().unwrap_err().kind(),
            ErrorKind::ConfigInvalid
        );

        settings.model.api_key = Some("sk-test".into());
        let config = settings.provider_config().unwrap();
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        settings
            .apply(&Overrides {
                base_url: Some("127.0.0.1:11434/".into()),
                model: Some("llama3.2".into()),
                mode: Some("summarize".into()),
                max_retries: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(settings.model.base_url.as_deref(), Some("http://127.0.0.1:11434"));
        assert_eq!(settings.model_name(), "llama3.2");
        assert_eq!(settings.agent.mode, AgentMode::Summarize);
        assert_eq!(settings.agent.max_retries, 2);

        let err = settings
            .apply(&Overrides {
                provider: Some("bard".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\nmodel = \"gemma3:12b\"\ntimeout_secs = 5").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.model_name(), "gemma3:12b");
        assert_eq!(settings.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_file_base_url_is_normalized() {
        let settings = Settings::from_toml_str("[model]\nbase_url = \"127.0.0.1:11434/\"\n").unwrap();
        assert_eq!(settings.model.base_url.as_deref(), Some("http://127.0.0.1:11434"));

        let config = settings.provider_config().unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://127.0.0.1:11434"));
    }

    #[test]
    fn test_empty_env_path_is_unset() {
        assert_eq!(path_from_env(None), None);
        assert_eq!(path_from_env(Some(OsString::new())), None);
        assert_eq!(
            path_from_env(Some(OsString::from("/etc/chatcraft.toml"))),
            Some(PathBuf::from("/etc/chatcraft.toml"))
        );

        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("mine.toml");
        assert_eq!(resolve_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_build_client() {
        let client = Settings::default().build_client().unwrap();
        assert_eq!(client.defaults().num_ctx, Some(4096));
        assert_eq!(client.defaults().model.as_deref(), Some("gemma3:4b"));
    }
}
