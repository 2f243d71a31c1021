// AppForge - prompt-to-web-app generator
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use appforge::build::BuildService;
use appforge::config::load_config;
use appforge::server::ForgeServer;

#[derive(Parser, Debug)]
#[command(name = "appforge")]
#[command(about = "Generate, review, test and deploy small web apps from a prompt")]
struct Cli {
    /// Config file (defaults to ~/.appforge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP build service
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one build in-process and print the final session as JSON
    Build {
        prompt: String,
        /// Project id (defaults to a millisecond timestamp)
        #[arg(long)]
        id: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "appforge=debug,tower_http=debug"
    } else {
        "appforge=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
                config.validate().context("Invalid --bind address")?;
            }
            let service = BuildService::from_config(&config)?;
            ForgeServer::new(service, config.server.clone())
                .serve()
                .await
        }
        Commands::Build { prompt, id } => {
            let service = BuildService::from_config(&config)?;
            let session = service.build(&prompt, id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            if session.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
