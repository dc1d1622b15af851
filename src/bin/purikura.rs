//! Purikura CLI
//!
//! Command-line host for the purikura editing engine.

#[cfg(feature = "cli")]
use purikura::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
