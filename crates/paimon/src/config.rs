//! Configuration management for the Paimon CLI.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Command-line arguments
//! 2. Environment variables (`PAIMON_*`, nested keys split on `__`)
//! 3. Config file (`~/.config/paimon/config.toml` or `--config`)
//! 4. `OPENAI_API_KEY` for the model API key
//! 5. Default values

use std::path::{Path, PathBuf};

use beleth::{
    GuardrailConfig, InterviewQuestionConfig, McpConfig, DEFAULT_MAX_MESSAGES,
    DEFAULT_MAX_TOOL_ROUNDS,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use paimon_core::SamplingParams;
use paimon_openai::OpenAiConfig;
use paimon_server::ServerConfig;
use serde::{Deserialize, Serialize};
use stolas::KnowledgeBaseConfig;

/// Chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Endpoint, credentials and timeout.
    #[serde(flatten)]
    pub api: OpenAiConfig,
    /// Chat model name.
    pub chat_model: String,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum completion tokens.
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api: OpenAiConfig::default(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ModelSettings {
    /// Default sampling applied to every chat request.
    #[must_use]
    pub fn sampling(&self) -> SamplingParams {
        let mut sampling = SamplingParams::default();
        if let Some(temperature) = self.temperature {
            sampling = sampling.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            sampling = sampling.with_max_tokens(max_tokens);
        }
        sampling
    }
}

/// Which embedder indexes and queries the knowledge base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// The `/embeddings` endpoint of the model API.
    #[default]
    Openai,
    /// Offline feature hashing.
    Hashing,
}

/// Embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding backend.
    pub provider: EmbeddingProvider,
    /// Embedding model name (API provider only).
    pub model: String,
    /// Vector dimension.
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Messages kept per conversation.
    pub max_messages: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// Assistant behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// File holding the system prompt; the built-in prompt when unset.
    pub system_prompt_path: Option<PathBuf>,
    /// Tool rounds allowed per request.
    pub max_tool_rounds: u32,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            system_prompt_path: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Built-in interview question search.
    #[serde(flatten)]
    pub interview: InterviewQuestionConfig,
    /// Tools from an MCP server.
    pub mcp: McpConfig,
}

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model.
    pub model: ModelSettings,
    /// Embeddings.
    pub embedding: EmbeddingSettings,
    /// Knowledge base ingestion and retrieval.
    pub rag: KnowledgeBaseConfig,
    /// Conversation memory.
    pub memory: MemorySettings,
    /// Assistant behaviour.
    pub assistant: AssistantSettings,
    /// Input guardrail.
    pub guardrail: GuardrailConfig,
    /// Built-in and MCP tools.
    pub tools: ToolSettings,
    /// HTTP server.
    pub server: ServerConfig,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// Reports warnings for configuration errors but falls back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map_or_else(Self::config_path, Path::to_path_buf);

        match Self::figment(&config_path).extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Invalid configuration");
                eprintln!("\x1b[33mWarning:\x1b[0m Configuration error, using defaults");
                eprintln!("  Config file: {}", config_path.display());
                eprintln!("  Error: {e}");
                eprintln!();
                eprintln!("  To fix, edit or delete the config file:");
                eprintln!("    rm {}", config_path.display());
                eprintln!();
                Config::default()
            }
        }
    }

    /// Layers every configuration source.
    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(
                Env::raw()
                    .only(&["OPENAI_API_KEY"])
                    .map(|_| "model.api_key".into()),
            )
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("PAIMON_").split("__"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Returns the path to the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("paimon")
    }

    /// Renders the configuration as TOML with the API key masked.
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        let mut redacted = self.clone();
        if redacted.model.api.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            redacted.model.api.api_key = Some("********".to_string());
        }
        if redacted.tools.mcp.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            redacted.tools.mcp.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&redacted)
    }
}

/// Prints the current configuration and its sources.
pub fn show_config(path: Option<&Path>) {
    let config = Config::load(path);
    let config_path = path.map_or_else(Config::config_path, Path::to_path_buf);

    println!("Paimon Configuration");
    println!("====================\n");

    println!("Config file: {}", config_path.display());
    if config_path.exists() {
        println!("Status: Found\n");
    } else {
        println!("Status: Not found (using defaults)\n");
    }

    match config.to_redacted_toml() {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("Failed to render configuration: {e}"),
    }

    println!("Environment variables:");
    println!("  OPENAI_API_KEY");
    println!("  PAIMON_MODEL__API_KEY, PAIMON_MODEL__BASE_URL, PAIMON_MODEL__CHAT_MODEL");
    println!("  PAIMON_EMBEDDING__PROVIDER (openai | hashing)");
    println!("  PAIMON_RAG__DOCS_DIR, PAIMON_RAG__MIN_SCORE, PAIMON_RAG__ON_INGEST_FAILURE");
    println!("  PAIMON_TOOLS__MCP__ENABLED, PAIMON_TOOLS__MCP__URL, PAIMON_TOOLS__MCP__API_KEY");
    println!("  PAIMON_SERVER__HOST, PAIMON_SERVER__PORT");
}
