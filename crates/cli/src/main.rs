use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "deputy")]
#[command(about = "Deputy CLI: auto-replies to your messages while you are away", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, workspace, POLICY.md).
    Init {
        /// Config file path (default: DEPUTY_CONFIG_PATH or ~/.deputy/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway (HTTP status/inbound API, Telegram channel, operator console).
    Gateway {
        /// Config file path (default: DEPUTY_CONFIG_PATH or ~/.deputy/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from PORT env, config or 3000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Do not read status commands from stdin.
        #[arg(long)]
        no_console: bool,
    },

    /// Show the owner status of a running gateway, or set it when TOKEN is given.
    Status {
        /// New status (e.g. busy, sleeping, available)
        token: Option<String>,

        /// Config file path (default: DEPUTY_CONFIG_PATH or ~/.deputy/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Generate one reply locally, without a gateway. Prints the reply or "(suppressed)".
    Reply {
        /// Sender display name
        #[arg(long, value_name = "NAME")]
        sender: String,

        /// Status to answer under (default: configured initial status)
        #[arg(long, value_name = "TOKEN")]
        status: Option<String>,

        /// JSON array of earlier messages: [{"isSelf": false, "text": "..."}]
        #[arg(long, value_name = "PATH")]
        history_file: Option<PathBuf>,

        /// Config file path (default: DEPUTY_CONFIG_PATH or ~/.deputy/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Incoming message text
        text: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("deputy {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("{}", failure_message("init", &e));
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway {
            config,
            port,
            no_console,
        }) => {
            if let Err(e) = run_gateway(config, port, !no_console).await {
                log::error!("{}", failure_message("gateway", &e));
                std::process::exit(1);
            }
        }
        Some(Commands::Status { token, config }) => {
            if let Err(e) = run_status(config, token).await {
                log::error!("{}", failure_message("status", &e));
                std::process::exit(1);
            }
        }
        Some(Commands::Reply {
            sender,
            status,
            history_file,
            config,
            text,
        }) => {
            if let Err(e) = run_reply(config, sender, status, history_file, text).await {
                log::error!("{}", failure_message("reply", &e));
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// One-line failure report that keeps the whole context chain.
fn failure_message(command: &str, e: &anyhow::Error) -> String {
    format!("{} failed: {:#}", command, e)
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(deputy::config::default_config_path);
    let dir = deputy::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    with_console: bool,
) -> anyhow::Result<()> {
    let (mut config, path) = deputy::config::load_config(config_path)?;
    deputy::config::apply_port_env(&mut config);
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    deputy::gateway::run_gateway(config, path, with_console).await
}

async fn run_status(config_path: Option<PathBuf>, token: Option<String>) -> anyhow::Result<()> {
    let (mut config, _) = deputy::config::load_config(config_path)?;
    deputy::config::apply_port_env(&mut config);
    let url = format!(
        "http://{}:{}/status",
        config.gateway.bind.trim(),
        config.gateway.port
    );
    let client = reqwest::Client::new();
    let mut req = match token {
        Some(ref t) => client
            .post(&url)
            .json(&deputy::gateway::SetStatusParams { status: t.clone() }),
        None => client.get(&url),
    };
    if let Some(auth) = deputy::config::resolve_gateway_token(&config) {
        req = req.bearer_auth(auth);
    }
    let resp = req
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("gateway not reachable at {}: {}", url, e))?;
    if !resp.status().is_success() {
        let code = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("gateway returned {}: {}", code, body);
    }
    let payload: deputy::gateway::StatusPayload = resp.json().await?;
    match payload.previous {
        Some(previous) => println!("status: {} (was {})", payload.status, previous),
        None => println!("status: {}", payload.status),
    }
    Ok(())
}

async fn run_reply(
    config_path: Option<PathBuf>,
    sender: String,
    status: Option<String>,
    history_file: Option<PathBuf>,
    text: String,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let (config, path) = deputy::config::load_config(config_path)?;
    let history: Vec<deputy::history::HistoryEntry> = match history_file {
        Some(ref p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading history from {}", p.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing history from {}", p.display()))?
        }
        None => Vec::new(),
    };

    let initial = status.unwrap_or_else(|| deputy::config::resolve_initial_status(&config));
    let store = Arc::new(deputy::status::StatusStore::new(initial));
    let completion = deputy::engine::completion_service_from_config(&config);
    let engine = deputy::engine::ReplyEngine::from_config(&config, &path, store, completion);

    let msg = deputy::engine::InboundMessage {
        channel: "cli".to_string(),
        sender_label: sender,
        text,
        history,
    };
    let decision = match config.agents.reply_deadline_secs {
        Some(secs) => {
            engine
                .process_message_with_deadline(&msg, std::time::Duration::from_secs(secs))
                .await?
        }
        None => engine.process_message(&msg).await?,
    };
    match decision.into_reply() {
        Some(reply) => println!("{}", reply),
        None => println!("(suppressed)"),
    }
    Ok(())
}
