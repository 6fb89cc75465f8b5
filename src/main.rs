use anyhow::Result;
use clap::Parser;
use spendguard::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    spendguard::logging::init_tracing(cli.verbose);
    cli.run().await
}
