//! regcopy - copy images between container registries

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "regcopy")]
#[command(
    author,
    version,
    about = "Copy images between registries. If no destination image is given the source manifest is printed",
    long_about = None
)]
pub(crate) struct Cli {
    /// Source registry image
    #[arg(long)]
    pub src: String,

    /// Source user:password basic auth
    #[arg(long, default_value = "")]
    pub src_user: String,

    /// Source CA certificate (PEM)
    #[arg(long)]
    pub src_ca: Option<PathBuf>,

    /// Destination registry image
    #[arg(long)]
    pub dst: Option<String>,

    /// Destination user:password basic auth
    #[arg(long, default_value = "")]
    pub dst_user: String,

    /// Destination CA certificate (PEM)
    #[arg(long)]
    pub dst_ca: Option<PathBuf>,

    /// Instead of just copying the given tag copy all tags matching a regex pattern
    #[arg(long = "tag-pattern")]
    pub tag_patterns: Vec<String>,

    /// Path to Docker credential config file [default: ~/.docker/config.json]
    #[arg(long)]
    pub auth_config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for manifests and progress
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    commands::execute(cli).await
}
