//! persona-chat — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags, load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config) and init logger
//!   4. Build the LLM provider and the chat agent
//!   5. Spawn Ctrl-C → shutdown watcher
//!   6. Run comms channels until shutdown or EOF

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use persona_chat::config::{self, Config};
use persona_chat::error::AppError;
use persona_chat::llm::providers;
use persona_chat::logger;
use persona_chat::subsystems::chat::ChatAgent;
use persona_chat::subsystems::comms;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        provider = %config.llm.provider,
        model = %config.llm.openai.model,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let agent = Arc::new(ChatAgent::new(provider, config.chat.clone()));

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    print_startup_summary(&config, agent.personas().list().len());

    let result = comms::run(&config, agent, shutdown.clone()).await;

    // Comms may have exited on EOF rather than Ctrl-C.
    shutdown.cancel();
    info!("shutdown complete");
    result
}

fn print_startup_summary(config: &Config, personas: usize) {
    let staged = if config.chat.split_output {
        format!(
            "on (delimiter={:?}, {}ms/char)",
            config.chat.delimiter, config.chat.char_interval_ms
        )
    } else {
        "off".to_string()
    };
    let retention = config
        .chat
        .history_cap
        .map(|cap| format!("last {cap} messages"))
        .unwrap_or_else(|| "unbounded".to_string());

    eprintln!("{} — provider={} model={}", config.bot_name, config.llm.provider, config.llm.openai.model);
    if config.llm.provider != "dummy" {
        eprintln!(
            "  endpoint : {} (timeout {}ms, temp {}, max_tokens {})",
            config.llm.openai.base_url,
            config.llm.openai.timeout_ms,
            config.llm.openai.temperature,
            config.llm.openai.max_tokens
        );
    }
    eprintln!("  staged   : {staged}");
    eprintln!("  history  : {retention}");
    eprintln!("  personas : {personas} configured");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: persona-chat [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_CONFIG_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (turn flow, request summaries)
    //   -vvvv+  → trace  (full request/response payloads)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
