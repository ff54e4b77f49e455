use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zb_cli::commands::{events, import, record, scan, stats, user_config};
use zb_cli::{Cli, Commands, Config, ConfigAction, server};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Serve { bind, no_watch } => {
            let bind = bind.clone().unwrap_or_else(|| config.bind.clone());
            let watch = config.watcher.autostart && !*no_watch;
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(server::serve(&config, &bind, watch))?;
        }
        Commands::Stats { json } => stats::run(&mut stdout, &config, *json)?,
        Commands::Events => events::run(&mut stdout, &config)?,
        Commands::Connected { device_name } => {
            record::run(&mut stdout, &config, true, device_name.as_deref())?;
        }
        Commands::Disconnected { device_name } => {
            record::run(&mut stdout, &config, false, device_name.as_deref())?;
        }
        Commands::Config(ConfigAction::Show) => user_config::show(&mut stdout, &config)?,
        Commands::Config(ConfigAction::SetTarget { minutes }) => {
            user_config::set_target(&mut stdout, &config, *minutes)?;
        }
        Commands::Import { file } => {
            import::run(&mut stdout, &config, file)?;
        }
        Commands::Scan { json } => scan::run(&mut stdout, &config, *json)?,
    }

    Ok(())
}
