//! CLI command implementations.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use beleth::{
    Assistant, ChatMemoryStore, InterviewQuestionTool, McpToolProvider, Report, SafeInputGuardrail,
};
use color_eyre::eyre::{Result, WrapErr};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use paimon_core::ConversationId;
use paimon_openai::{OpenAiChatModel, OpenAiEmbedder};
use paimon_server::Server;
use stolas::{ContentRetriever, Embedder, HashingEmbedder, IngestStatus, KnowledgeBase};

use crate::config::{Config, EmbeddingProvider};

/// A ready assistant together with its knowledge base.
struct Runtime {
    assistant: Assistant,
    knowledge: KnowledgeBase,
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbeddingProvider::Openai => Arc::new(OpenAiEmbedder::new(
            &config.model.api,
            &config.embedding.model,
            config.embedding.dimension,
        )?),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.embedding.dimension)),
    };
    Ok(embedder)
}

async fn load_knowledge(config: &Config) -> Result<KnowledgeBase> {
    let progress = spinner(format!(
        "Indexing documents in {}...",
        config.rag.docs_dir.display()
    ));
    let knowledge = KnowledgeBase::bootstrap(config.rag.clone(), embedder(config)?).await;
    progress.finish_and_clear();

    let knowledge = knowledge.wrap_err("Failed to build the knowledge base")?;
    match knowledge.status() {
        IngestStatus::Ready {
            documents,
            segments,
        } => tracing::info!(documents, segments, "Knowledge base ready"),
        IngestStatus::Degraded { reason } => {
            eprintln!("\x1b[33mWarning:\x1b[0m Knowledge base unavailable: {reason}");
        }
    }
    Ok(knowledge)
}

async fn build_runtime(config: &Config) -> Result<Runtime> {
    let knowledge = load_knowledge(config).await?;

    let model = OpenAiChatModel::new(&config.model.api, config.model.chat_model.as_str())?
        .with_default_sampling(config.model.sampling());

    let mut builder = Assistant::builder()
        .model(Arc::new(model))
        .memory(Arc::new(ChatMemoryStore::new(config.memory.max_messages)))
        .retriever(knowledge.retriever())
        .guardrail(Arc::new(SafeInputGuardrail::from_config(&config.guardrail)))
        .max_tool_rounds(config.assistant.max_tool_rounds);

    if let Some(path) = &config.assistant.system_prompt_path {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read system prompt {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    if config.tools.interview.enabled {
        builder = builder.tool(Arc::new(InterviewQuestionTool::new(
            config.tools.interview.clone(),
        )?));
    }

    if config.tools.mcp.enabled {
        let provider = McpToolProvider::new(config.tools.mcp.clone())
            .wrap_err("Failed to configure the MCP tool server")?;
        tracing::info!(url = %config.tools.mcp.url, "MCP tools enabled");
        builder = builder.tool_provider(Arc::new(provider));
    }

    Ok(Runtime {
        assistant: builder.build()?,
        knowledge,
    })
}

/// Start the HTTP server.
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting Paimon server...");
    let runtime = build_runtime(&config).await?;
    let server = Server::new(
        config.server.clone(),
        runtime.assistant,
        runtime.knowledge.status().clone(),
    );
    server.run().await?;

    Ok(())
}

/// Answer a single message.
pub async fn ask(config: Config, memory_id: String, message: String) -> Result<()> {
    let runtime = build_runtime(&config).await?;
    let reply = runtime
        .assistant
        .chat(ConversationId::from(memory_id), &message)
        .await?;
    println!("{reply}");
    Ok(())
}

/// Produce a structured learning report.
pub async fn report(config: Config, message: String, json: bool) -> Result<()> {
    let runtime = build_runtime(&config).await?;

    let progress = spinner("Writing report...".to_string());
    let report = runtime.assistant.chat_for_report(&message).await;
    progress.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("\x1b[1m{}\x1b[0m\n", report.name);
    for (i, suggestion) in report.suggestion_list.iter().enumerate() {
        println!("  {}. {suggestion}", i + 1);
    }
}

/// Show the segments retrieved for a query without calling the model.
pub async fn search(config: Config, query: String) -> Result<()> {
    let knowledge = load_knowledge(&config).await?;
    let results = knowledge.retriever().retrieve(&query).await?;

    if results.is_empty() {
        println!(
            "No segments scored at least {} for this query.",
            knowledge.config().retrieval.min_score
        );
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "\x1b[36m[{}] score {:.3}\x1b[0m  {}",
            rank + 1,
            result.score,
            result.segment.file_name().unwrap_or("(unknown source)")
        );
        let preview: String = result.segment.text.chars().take(240).collect();
        println!("{}\n", preview.trim());
    }
    Ok(())
}

/// Start an interactive chat session.
pub async fn chat(config: Config, memory_id: String) -> Result<()> {
    let runtime = build_runtime(&config).await?;
    let assistant = runtime.assistant;
    let id = ConversationId::from(memory_id);

    println!("Paimon Interactive Chat");
    println!("=======================");
    println!("Model: {}", config.model.chat_model);
    println!("Conversation: {id}");
    println!("\nType 'exit' or 'quit' to end the session.");
    println!("Type '/clear' to clear conversation history.\n");

    loop {
        print!("\x1b[32mYou:\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            println!();
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("\nGoodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("/clear") {
            assistant.memory().clear(&id).await;
            println!("\nConversation cleared.\n");
            continue;
        }

        let mut stream = match assistant.chat_stream(id.clone(), input).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("\x1b[31mError:\x1b[0m {e}\n");
                continue;
            }
        };

        print!("\n\x1b[34mAssistant:\x1b[0m ");
        io::stdout().flush()?;

        while let Some(result) = stream.next().await {
            match result {
                Ok(chunk) => {
                    print!("{chunk}");
                    io::stdout().flush()?;
                }
                Err(e) => {
                    eprintln!("\n\x1b[31mError:\x1b[0m {e}");
                    break;
                }
            }
        }

        println!("\n");
    }

    Ok(())
}

/// Print the config file path.
pub fn config_path(path: Option<&Path>) {
    let path = path.map_or_else(Config::config_path, Path::to_path_buf);
    println!("{}", path.display());
}

/// Display version information.
pub fn version() {
    println!("Paimon {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Components:");
    println!("  Stolas     - Knowledge Engine");
    println!("  Beleth     - Assistant Framework");
    println!("  Dantalion  - Observability");
}
