//! StudyBot CLI
//!
//! Command-line front end for the chat streaming client

mod config;
mod console;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::StudybotConfig;
use console::ConsoleHandler;
use std::{path::PathBuf, sync::Arc};
use studybot_auth::{HttpRefreshEndpoint, TokenManager};
use studybot_core::{CredentialRecord, StreamRequest};
use studybot_egress::{SessionController, TransportCapabilities, client::create_client};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "studybot")]
#[command(about = "StudyBot - streaming chat client", long_about = None)]
struct Cli {
    /// Path to a YAML or TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a chat message and stream the reply to stdout
    Chat {
        prompt: String,

        /// Identifier of the task/document the message is about
        #[arg(long)]
        context_id: Option<String>,

        /// Kind of the context entity
        #[arg(long)]
        context_type: Option<String>,

        /// Reuse a key to let the server deduplicate a resubmission
        #[arg(long)]
        idempotency_key: Option<String>,

        /// Force the progressive poll transport
        #[arg(long, default_value = "false")]
        poll: bool,
    },
    /// Manage the stored credential
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Store a credential record
    Set {
        #[arg(long)]
        access_token: String,

        #[arg(long)]
        refresh_token: String,

        /// Access token expiry in epoch milliseconds
        #[arg(long)]
        expires_at: Option<i64>,
    },
    /// Print the stored record with tokens redacted
    Show,
    /// Remove the stored record
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StudybotConfig::from_file(path)?,
        None => StudybotConfig::default(),
    };
    config.merge_env();
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config.logging.level)?;
    debug!("Using backend {}", config.base_url);

    let tokens = Arc::new(token_manager(&config)?);

    match cli.command {
        Commands::Chat {
            prompt,
            context_id,
            context_type,
            idempotency_key,
            poll,
        } => {
            let mut request = StreamRequest::new(prompt);
            request.context_id = context_id;
            request.context_type = context_type;
            if let Some(key) = idempotency_key {
                request = request.with_idempotency_key(key);
            }

            let mut controller =
                SessionController::from_config(tokens, config.stream_client_config())?;
            if poll {
                controller = controller.with_capabilities(TransportCapabilities {
                    incremental_body: false,
                });
            }

            chat(&controller, &request).await?;
        }
        Commands::Token { command } => match command {
            TokenCommands::Set {
                access_token,
                refresh_token,
                expires_at,
            } => {
                tokens
                    .store_credentials(&CredentialRecord {
                        access_token: Some(access_token),
                        refresh_token: Some(refresh_token),
                        expires_at,
                    })
                    .await?;
                info!("Credential stored");
            }
            TokenCommands::Show => {
                let record = tokens.current_record().await?;
                println!("access token:  {}", redact(record.access_token.as_deref()));
                println!("refresh token: {}", redact(record.refresh_token.as_deref()));
                println!("expires at:    {}", format_expiry(record.expires_at));
            }
            TokenCommands::Clear => {
                tokens.clear().await?;
                info!("Credential cleared");
            }
        },
    }

    Ok(())
}

async fn chat(controller: &SessionController, request: &StreamRequest) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut handler = ConsoleHandler::new(std::io::stdout());
    controller
        .send_message_with_cancel(request, &mut handler, cancel)
        .await;

    match handler.into_result() {
        Ok(_) => Ok(()),
        Err(e) if e.is_auth_error() => Err(anyhow::Error::new(e)
            .context("Not signed in or session expired; run `studybot token set`")),
        Err(e) => Err(anyhow::Error::new(e).context("Chat stream failed")),
    }
}

fn token_manager(config: &StudybotConfig) -> anyhow::Result<TokenManager> {
    let store = Arc::new(config.credential_store()?);
    let client = create_client(&config.http_client_config())?;
    let endpoint = Arc::new(HttpRefreshEndpoint::new(
        client,
        &config.base_url,
        &config.auth.refresh_path,
    ));
    Ok(TokenManager::new(store, endpoint, config.auth.token.clone()))
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!("{}", log_level));

    // Reply text owns stdout
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn redact(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("<{} chars>", token.chars().count()),
        None => "(none)".to_string(),
    }
}

fn format_expiry(expires_at: Option<i64>) -> String {
    match expires_at {
        Some(ms) => match chrono::DateTime::from_timestamp_millis(ms) {
            Some(at) => format!("{} ({})", at.to_rfc3339(), ms),
            None => ms.to_string(),
        },
        None => "(unknown)".to_string(),
    }
}
