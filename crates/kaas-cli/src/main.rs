//! KaaS build CLI.

use clap::{Parser, Subcommand};
use kaas_config::SystemConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kaas-build")]
#[command(about = "Build a container image from a git repository", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// System config file (kaas.kdl)
    #[arg(long, env = "KAAS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one repository and print the image name
    Build {
        /// Repository URL
        repo_url: String,
        /// Branch to build
        #[arg(short, long, default_value = kaas_core::request::DEFAULT_BRANCH)]
        branch: String,
        /// Deploy config path inside the repository
        #[arg(short = 'c', long)]
        deploy_config: Option<String>,
        /// Service config path inside the repository
        #[arg(short = 's', long)]
        service_config: Option<String>,
    },
    /// Run the HTTP build server
    Daemon {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the effective system configuration as JSON
    Config,
}

/// Log filter for a `-v` count. `RUST_LOG` takes precedence.
fn log_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity_level(verbose)))
}

fn verbosity_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let config = SystemConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            repo_url,
            branch,
            deploy_config,
            service_config,
        } => {
            commands::build::run(config, repo_url, branch, deploy_config, service_config).await?;
        }
        Commands::Daemon { port, bind } => {
            commands::daemon::run(config, port, bind).await?;
        }
        Commands::Config => {
            commands::config::show(&config)?;
        }
    }

    Ok(())
}
