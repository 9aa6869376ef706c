use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use opencode_cli::{commands, Command, Config};
use opencode_client::{PreferenceStore, TomlPreferenceStore};

#[derive(Debug, Parser)]
#[command(name = "opencode-cli", version, about = "Talk to an OpenCode server")]
struct Cli {
    /// Server address; overrides config and the saved server
    #[arg(long, global = true, env = "OPENCODE_URL")]
    url: Option<String>,

    /// Config file to load instead of config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preferences file
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(&config);

    if let Some(path) = cli.prefs {
        config.preferences_path = Some(path);
    }
    let store = TomlPreferenceStore::new(config.preferences_path());
    let preferences = store.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, path = %store.path().display(), "Ignoring unreadable preferences");
        Default::default()
    });

    if let Some(base_url) = config.resolve_base_url(cli.url.as_deref(), &preferences) {
        tracing::debug!(base_url, "Using server");
    }

    commands::run(cli.command, &config, &store).await
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match config.logging.format.as_str() {
        "json" => registry.with(layer.json()).init(),
        "pretty" => registry.with(layer.pretty()).init(),
        _ => registry.with(layer.compact()).init(),
    }
}
