#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use weekbot::config::Config;
use weekbot::gateway::{self, AppState};
use weekbot::reports::format::render_stats;
use weekbot::reports::ReportStore;
use weekbot::transport::{self, ConsoleTransport, InboundUpdate, Transport};
use weekbot::Bot;

/// `weekbot` - weekly status reports, one question at a time.
#[derive(Parser, Debug)]
#[command(name = "weekbot")]
#[command(version)]
#[command(about = "Collects weekly status reports over chat.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Talk to the bot in the terminal
    #[command(long_about = "\
Talk to the bot in the terminal.

Every line you type is sent to the bot as a chat message. Lines starting \
with '!' press an inline button: type the payload shown after the arrow, \
for example '!score:7' or '!done'. Press Ctrl-D to quit.

Examples:
  weekbot chat
  weekbot chat --user alice
  WEEKBOT_STORE_BACKEND=memory weekbot chat")]
    Chat {
        /// User id the messages are sent as
        #[arg(long, default_value = "console")]
        user: String,
    },

    /// Serve the Telegram webhook
    #[command(long_about = "\
Serve the Telegram webhook.

Starts the HTTP gateway with POST /webhook for Telegram updates and \
GET /health for monitoring. Replies go out through the Telegram Bot API, \
so telegram.bot_token (or WEEKBOT_TELEGRAM_TOKEN) must be set. Bind \
address defaults to gateway.host / gateway.port from the config file.

Examples:
  weekbot serve
  weekbot serve -p 9000
  weekbot serve --host 0.0.0.0")]
    Serve {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Show configuration and store status
    Status,

    /// Print report statistics for one user
    Stats {
        /// User id as stored in the reports sheet
        user_id: String,
    },

    /// Manage configuration
    #[command(long_about = "\
Manage weekbot configuration.

Use 'schema' to dump the JSON Schema for the config file, which documents \
every available key, type, and default value.

Examples:
  weekbot config schema
  weekbot config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("WEEKBOT_CONFIG_DIR", config_dir);
    }

    // Schema output must stay clean JSON.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    // Env overrides and validation are applied while loading.
    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Config { .. } => unreachable!(),

        Commands::Chat { user } => run_chat(&config, &user).await,

        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let transport = transport::create_telegram_transport(&config)?;
            let bot = Bot::build(&config, transport)?;
            info!("Starting weekbot gateway on {host}:{port}");
            let state = AppState::new(Arc::new(bot), config.gateway.webhook_secret.clone());
            gateway::run_gateway(&host, port, state).await
        }

        Commands::Status => {
            let bot = Bot::build(&config, Arc::new(ConsoleTransport))?;
            println!("weekbot status");
            println!();
            println!("Version:      {}", env!("CARGO_PKG_VERSION"));
            println!("Config:       {}", config.config_path.display());
            println!("Workspace:    {}", config.workspace_dir.display());
            println!();
            println!("Store:        {}", config.store.backend);
            println!("  Reports:    {}", config.store.reports_sheet);
            println!(
                "  Users:      {}",
                config.store.users_sheet().unwrap_or("(disabled)")
            );
            println!("  Cache TTL:  {}s", config.cache.ttl_secs);
            println!("  Retries:    {}", config.retry.max_retries);
            println!("Sessions:     {}", config.sessions.persistence);
            println!(
                "Telegram:     {}",
                if config.telegram.bot_token.is_some() {
                    "token set"
                } else {
                    "no token"
                }
            );
            println!(
                "Gateway:      {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!();
            match bot.store.get_next_week_number().await {
                Ok(week) => println!("Next week number: {week}"),
                Err(error) => println!("Store unreachable: {error}"),
            }
            Ok(())
        }

        Commands::Stats { user_id } => {
            let bot = Bot::build(&config, Arc::new(ConsoleTransport))?;
            let stats = bot
                .store
                .get_user_stats(&user_id)
                .await
                .with_context(|| format!("Failed to load stats for {user_id}"))?;
            println!("{}", render_stats(&stats));
            Ok(())
        }
    }
}

/// Feed stdin lines to the engine until EOF.
async fn run_chat(config: &Config, user: &str) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport);
    let bot = Bot::build(config, transport)?;
    println!("weekbot chat as '{user}'. Type /help to begin, Ctrl-D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut callback_seq = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let update = match line.strip_prefix('!') {
            Some(payload) => {
                callback_seq += 1;
                InboundUpdate::callback(user, user, &callback_seq.to_string(), payload.trim())
            }
            None => InboundUpdate::message(user, user, line),
        };
        bot.engine.handle_update(update).await;
    }
    Ok(())
}
