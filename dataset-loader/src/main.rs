use anyhow::Result;
use clap::Parser;
use dataset_loader::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries only the final summary line.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    tracing::debug!("CLI arguments parsed");
    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "dataset-loader exited with error");
    }
    result
}
