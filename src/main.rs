use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use eventhub::config::Config;
use eventhub::hub::{EventHub, UpstreamClient};
use eventhub::{app, cache, logging};

#[derive(Parser, Debug)]
#[command(name = "eventhub")]
#[command(about = "Offline-first client for the EventHub campus platform")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/eventhub/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Upstream API base URL, overrides the config file
  #[arg(long, env = "EVENTHUB_URL")]
  url: Option<String>,

  /// User id for personal views and actions
  #[arg(short, long, env = "EVENTHUB_USER")]
  user: Option<String>,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override upstream if specified on command line
  if let Some(url) = args.url {
    config.upstream.url = url;
  }

  let _log_guard = logging::init(&config.log)?;

  let cache = cache::open(&config.cache);

  let hub = if args.command.is_local() || config.upstream.url.is_empty() {
    None
  } else {
    let client = UpstreamClient::new(&config.upstream, Config::get_api_token())?;
    Some(EventHub::new(client, cache.clone()))
  };

  let app = app::App::new(cache, hub, args.user);
  app.run(args.command).await
}
