//! # docmcp CLI
//!
//! Operational front end for the tool-server manager. Every command prints
//! JSON on stdout; logs go to `{data_dir}/docmcp.log`.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmcp servers` | List registered servers |
//! | `docmcp health` | Probe every server concurrently |
//! | `docmcp tools <server>` | List a server's tools |
//! | `docmcp call <server> <tool> [json]` | Invoke a tool with JSON object arguments |
//! | `docmcp upload <path>` | Store a file and send it to the document service |
//! | `docmcp search "<query>"` | Search stored documents |

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use docmcp::config::Settings;
use docmcp::documents::{self, DocumentStore};
use docmcp::mcp_client::{ClientManager, ToolCallResult};
use docmcp::services::{self, QueryMode, SearchRequest};

#[derive(Parser)]
#[command(
    name = "docmcp",
    about = "Manage and call MCP tool servers for document processing",
    version
)]
struct Cli {
    /// Path to a settings file (YAML). Overrides `DOCMCP_CONFIG` and the
    /// default lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Retry transient failures using the configured retry policy.
    #[arg(long, global = true)]
    retry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered servers in registration order.
    Servers,

    /// Probe every registered server.
    Health,

    /// List the tools a server exposes.
    Tools { server: String },

    /// Invoke a tool.
    Call {
        server: String,
        tool: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        arguments: String,
    },

    /// Store a file in the upload directory and process it.
    Upload {
        path: PathBuf,
        /// Save extracted text only, without vectorizing.
        #[arg(long)]
        text_only: bool,
    },

    /// Search stored documents.
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Global)]
        mode: ModeArg,
        /// Document id or collection id, depending on mode.
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value_t = services::DEFAULT_SEARCH_LIMIT)]
        limit: u32,
        #[arg(long, default_value_t = 0.0)]
        score_threshold: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    SingleDocument,
    Collection,
    Global,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SingleDocument => QueryMode::SingleDocument,
            ModeArg::Collection => QueryMode::Collection,
            ModeArg::Global => QueryMode::Global,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    docmcp::init_tracing();

    let settings = match &cli.config {
        Some(path) => Settings::from_path(path),
        None => Settings::load(),
    }
    .context("failed to load settings")?;

    let manager =
        ClientManager::from_settings(&settings).context("failed to create client manager")?;
    let outcome = run(&cli, &settings, &manager).await;
    manager.shutdown().await;
    outcome
}

async fn run(cli: &Cli, settings: &Settings, manager: &ClientManager) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Servers => {
            print_json(&manager.list_servers().await)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let report = manager.health_check_all().await;
            print_json(&report)?;
            Ok(exit_code(report.all_reachable()))
        }
        Commands::Tools { server } => match manager.list_tools(server).await {
            Ok(tools) => {
                print_json(&tools)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => {
                print_json(&ToolCallResult::Error(failure))?;
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Call {
            server,
            tool,
            arguments,
        } => {
            let parsed: serde_json::Value =
                serde_json::from_str(arguments).context("arguments must be valid JSON")?;
            let serde_json::Value::Object(arguments) = parsed else {
                bail!("arguments must be a JSON object");
            };

            let result = if cli.retry {
                let policy = settings.retry.to_policy();
                manager
                    .call_tool_with_retry(server, tool, arguments, &policy)
                    .await
            } else {
                manager.call_tool(server, tool, arguments).await
            };
            print_json(&result)?;
            Ok(exit_code(result.is_ok()))
        }
        Commands::Upload { path, text_only } => {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no file name", path.display()))?;
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;

            let store = DocumentStore::from_settings(settings);
            let outcome = if *text_only {
                documents::upload_document_text_only(manager, &store, &filename, &bytes).await?
            } else {
                documents::upload_document(manager, &store, &filename, &bytes).await?
            };
            print_json(&outcome)?;
            Ok(exit_code(outcome.processing_result.is_ok()))
        }
        Commands::Search {
            query,
            mode,
            target,
            limit,
            score_threshold,
        } => {
            let request = SearchRequest {
                query: query.clone(),
                mode: (*mode).into(),
                target_id: target.clone(),
                limit: *limit,
                score_threshold: *score_threshold,
            };
            let result = services::search_documents(manager, &request).await;
            print_json(&result)?;
            Ok(exit_code(result.is_ok()))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
