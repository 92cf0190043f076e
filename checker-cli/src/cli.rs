use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(
    name = "tcheck",
    version,
    about = "Watch Twitch channels and report when they go live or offline",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Twitch application client id
    #[arg(long, global = true, env = "TWITCH_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Twitch application client secret
    #[arg(long, global = true, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// State file (defaults to the config value or the data directory)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single polling cycle and print every channel's status
    Check {
        /// Additional channels to monitor
        channels: Vec<String>,

        /// Override the offline cooldown in seconds
        #[arg(long)]
        cooldown: Option<u64>,

        /// Do not write the updated state back
        #[arg(long)]
        no_save: bool,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Poll on an interval until interrupted, printing transitions
    Watch {
        /// Additional channels to monitor
        channels: Vec<String>,

        /// Override the offline cooldown in seconds
        #[arg(long)]
        cooldown: Option<u64>,

        /// Seconds between polling cycles
        #[arg(short, long)]
        interval: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Report whether each login exists and is live, without tracking it
    Classify {
        /// Logins to classify
        #[arg(required = true)]
        logins: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Inspect or edit the state file without contacting Twitch
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Print the config file location
        #[arg(long)]
        path: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum StateAction {
    /// Print the tracked channels and their state
    Show {
        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },
    /// Start tracking channels
    Add {
        #[arg(required = true)]
        channels: Vec<String>,
    },
    /// Stop tracking channels and discard their history
    Remove {
        #[arg(required = true)]
        channels: Vec<String>,
    },
}

impl Commands {
    /// Output format explicitly requested on the command line.
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self {
            Commands::Check { output, .. }
            | Commands::Watch { output, .. }
            | Commands::Classify { output, .. }
            | Commands::State {
                action: StateAction::Show { output },
            } => *output,
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// Compact JSON output
    JsonCompact,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::JsonCompact)
    }
}
