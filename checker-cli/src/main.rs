mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::{CommandExecutor, Overrides},
    config::AppConfig,
    error::Result,
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let output_format = args.command.output_format();
    let result = run(args).await;

    if let Err(e) = result {
        match output_format {
            Some(format) if format.is_json() => {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{error_json}");
            }
            _ => {
                error!("Application error: {}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {}", e);
                }
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.json_logs);

    let config = AppConfig::load(args.config.as_deref())?;
    let executor = CommandExecutor::new(
        config,
        Overrides {
            client_id: args.client_id,
            client_secret: args.client_secret,
            state: args.state,
        },
    );

    match args.command {
        Commands::Check {
            channels,
            cooldown,
            no_save,
            output,
        } => {
            executor.check(&channels, cooldown, no_save, output).await?;
        }

        Commands::Watch {
            channels,
            cooldown,
            interval,
            output,
        } => {
            executor.watch(&channels, cooldown, interval, output).await?;
        }

        Commands::Classify { logins, output } => {
            executor.classify(&logins, output).await?;
        }

        Commands::State { action } => {
            executor.state(action)?;
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }

        Commands::Config { show, path, reset } => {
            if reset {
                let written = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults at {}", written.display());
            } else if path {
                match args.config.or_else(AppConfig::default_path) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("No config directory on this platform"),
                }
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration, --path to locate it or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so JSON results on stdout stay parseable.
    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
