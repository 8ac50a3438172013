use clap::Parser;
use tracing_subscriber::EnvFilter;

use feedbridge::cli::Args;
use feedbridge::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Verbose by default for this crate; RUST_LOG overrides.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,feedbridge=trace"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    server::serve(args.into_config()).await
}
