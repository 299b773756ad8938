use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "glidelink")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Device configuration file
    #[arg(short, long, global = true, default_value = "glidelink.json")]
    pub config: PathBuf,

    /// Output in JSON format
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered device drivers
    Drivers,

    /// Feed a recorded NMEA log through a driver and print the fixes
    Replay {
        /// Log file, one sentence per line
        file: PathBuf,

        /// Driver used to interpret the log
        #[arg(short = 'D', long, default_value = "Generic")]
        driver: String,

        /// Stop after this many fixes
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Read live data from the configured devices
    Monitor {
        /// Stop after this many fixes (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: usize,

        /// Link check period in seconds
        #[arg(short = 'p', long, default_value = "1")]
        period: u64,

        /// MacCready setting to push to every slot, in m/s
        #[arg(long)]
        mac_cready: Option<f64>,

        /// Bug factor to push to every slot (1.0 = clean)
        #[arg(long)]
        bugs: Option<f64>,

        /// Water ballast fraction to push to every slot
        #[arg(long)]
        ballast: Option<f64>,
    },

    /// Upload a task declaration to a logger
    Declare {
        /// Task file (JSON)
        task: PathBuf,

        /// Slot the logger is bound to
        #[arg(short = 's', long, default_value = "0")]
        slot: usize,
    },

    /// Device configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get configuration value
    Get {
        /// Configuration key (e.g., slot0.port)
        #[arg(short = 'k', long)]
        key: String,
    },

    /// Set configuration value
    Set {
        /// Configuration key (e.g., link.timeout)
        #[arg(short = 'k', long)]
        key: String,

        /// Configuration value (empty to clear)
        #[arg(long)]
        value: String,
    },

    /// Show the whole configuration
    Show,
}
