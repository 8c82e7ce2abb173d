mod config_commands;
mod console;
mod demo;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    parley_config::ParleyConfig,
    parley_dispatch::Bot,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::{
    config_commands::ConfigAction,
    console::{ConsoleOutbound, ConsoleSource},
    demo::DemoEngine,
};

#[derive(Parser)]
#[command(name = "parley", about = "parley: chat command dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of searching the default locations.
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin and answer on stdout (default).
    Run {
        /// Treat input as coming from a guild channel with this ID.
        #[arg(long)]
        guild: Option<String>,

        /// Channel ID reported for console messages.
        #[arg(long, default_value = "console")]
        channel: String,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so replies on stdout stay readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ParleyConfig> {
    match &cli.config {
        Some(path) => Ok(parley_config::load_config(path)?),
        None => Ok(parley_config::discover_and_load()),
    }
}

async fn run(config: ParleyConfig, guild: Option<String>, channel: String) -> anyhow::Result<()> {
    let report = parley_config::validate(&config);
    if report.has_errors() {
        anyhow::bail!("invalid configuration, run `parley config check` for details");
    }
    for d in &report.diagnostics {
        warn!(path = %d.path, "{}", d.message);
    }

    let bot = Bot::builder(Arc::new(DemoEngine::new()))
        .with_config(config)
        .with_outbound(Arc::new(ConsoleOutbound))
        .build()?;

    let source = ConsoleSource::stdin(channel, guild);
    bot.start(source);

    let signal = bot.shutdown_signal().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal.cancel();
        }
    });

    bot.run_to_completion().await;
    info!("bye");

    if bot.shutdown_signal().is_cancelled() {
        // The blocking stdin reader keeps the runtime alive until the next line.
        std::process::exit(0);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    match cli.command {
        None => run(load_config(&cli)?, None, "console".into()).await,
        Some(Commands::Run {
            ref guild,
            ref channel,
        }) => run(load_config(&cli)?, guild.clone(), channel.clone()).await,
        Some(Commands::Config { ref action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
