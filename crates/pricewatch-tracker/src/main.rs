//! pricewatch binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `PRICEWATCH__*` environment variables, then either runs the background
//! refresh loops until Ctrl+C or checks a single product URL.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pricewatch_store_sqlite::SqliteStore;
use pricewatch_tracker::{AppConfig, Tracker, fcm::FcmNotifier, shopee::ShopeeProvider};
use tokio::{sync::broadcast, task::JoinSet};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Marketplace price tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Refresh every known item on a schedule until interrupted.
  Run,
  /// Fetch one product URL and print the normalised listing as JSON.
  Check { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("PRICEWATCH")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let app_cfg: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise AppConfig")?;

  let http = reqwest::Client::builder()
    .timeout(app_cfg.request_timeout())
    .build()
    .context("failed to build HTTP client")?;
  let provider = ShopeeProvider::new(http.clone(), app_cfg.shopee_base_url.clone());

  match cli.command {
    Command::Check { url } => {
      let item = pricewatch_tracker::check_url(&provider, &url)
        .await
        .with_context(|| format!("failed to check {url}"))?;
      println!("{}", serde_json::to_string_pretty(&item)?);
      Ok(())
    }
    Command::Run => run(app_cfg, http, provider).await,
  }
}

async fn run(
  app_cfg:  AppConfig,
  http:     reqwest::Client,
  provider: ShopeeProvider,
) -> anyhow::Result<()> {
  let fcm_key = app_cfg
    .fcm_key
    .clone()
    .context("fcm_key must be set to run the tracker")?;
  let notifier = FcmNotifier::new(http, app_cfg.fcm_endpoint.clone(), fcm_key);

  // Expand `~` in store path.
  let store_path = expand_tilde(&app_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let tracker = Tracker::new(store, provider, notifier, app_cfg.tracker)
    .context("invalid tracker configuration")?;

  let (shutdown_tx, _) = broadcast::channel::<()>(5);
  let mut tasks = JoinSet::new();
  let sites = tracker.spawn_site_loops(&mut tasks, &shutdown_tx);
  tracing::info!(?sites, "pricewatch running; press Ctrl+C to stop");

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for Ctrl+C")?;
  tracing::info!("shutdown requested, waiting for in-flight items");
  let _ = shutdown_tx.send(());

  while let Some(res) = tasks.join_next().await {
    if let Err(e) = res {
      tracing::error!(error = %e, "site loop panicked");
    }
  }

  tracing::info!("pricewatch stopped");
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
