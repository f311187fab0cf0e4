mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use embedviz::config::EmbedvizConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "embedviz", version, about = "Embed text and project it to 3D with PCA")]
struct Cli {
    /// Config file (defaults to ~/.embedviz/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Embed comma-separated text once and print the result as JSON
    Embed {
        /// Delimiter-separated texts, e.g. "cat, dog, car"
        text: String,
        /// Provider: openai, gemini or cloudflare
        #[arg(short, long)]
        model: String,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Report configuration and provider credentials
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EmbedvizConfig::load_from(path)?,
        None => EmbedvizConfig::load()?,
    };

    // Log to stderr so stdout stays clean for `embed` JSON output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            embedviz::server::serve(config).await?;
        }
        Command::Embed {
            text,
            model,
            pretty,
        } => {
            cli::embed::embed(&config, &model, &text, pretty).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config, cli.config.as_deref())?;
        }
    }

    Ok(())
}
