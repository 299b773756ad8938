mod config;
mod declare;
mod drivers;
mod monitor;
mod replay;

use anyhow::Result;
use glidelink_core::{DriverRegistry, GlideConfig};

use crate::cli::{Cli, Commands};
use crate::output::OutputFormat;

pub async fn handle_command(cli: Cli) -> Result<()> {
    let format = OutputFormat::from_flag(cli.json);
    let registry = DriverRegistry::builtin();

    match cli.command {
        Commands::Drivers => drivers::handle_drivers(&registry, format),
        Commands::Replay {
            file,
            driver,
            limit,
        } => replay::handle_replay(registry, &file, &driver, limit, format).await,
        Commands::Monitor {
            count,
            period,
            mac_cready,
            bugs,
            ballast,
        } => {
            let config = GlideConfig::load_or_default(&cli.config)?;
            let settings = monitor::Settings {
                mac_cready,
                bugs,
                ballast,
            };
            monitor::handle_monitor(config, registry, count, period, settings, format).await
        }
        Commands::Declare { task, slot } => {
            let config = GlideConfig::load_or_default(&cli.config)?;
            declare::handle_declare(config, registry, &task, slot, format).await
        }
        Commands::Config { subcommand } => config::handle_config(&cli.config, subcommand, format),
    }
}
