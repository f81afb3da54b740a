mod config;
mod handlers;
mod http_server;
mod provider_cell;
mod relay;
mod state;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

use config::Config;
use state::State;

#[derive(Parser, Debug)]
#[command(version, about = "Streaming source resolver and HLS relay")]
struct Args {
    /// Path to the TOML config, created with defaults when missing
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Override the port of `listen_addr`
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    let log_config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("html5ever")
        .add_filter_ignore_str("selectors")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = &config.log_file {
        let file = File::options().create(true).append(true).open(path)?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, log_config, file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.set_port(port);
    }

    if let Err(e) = setup_logging(&config) {
        eprintln!("Failed to setup logging: {}", e);
    }
    log::info!(
        "Starting animeverse-relay {} with config {}",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );

    let state = match State::new(config) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to create state: {}", e);
            std::process::exit(1);
        }
    };

    // requests are served while the provider is still coming up
    state.provider.spawn_init(
        Arc::new(state.provider_connector()),
        state.config.init_retry_delay(),
    );

    http_server::api_server::start_api_server(state).await;
}
