//! lxlab CLI entry point.

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lxlab::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for krate in ["lxlab", "lxlab_common", "lxlab_network"] {
        filter = filter.add_directive(format!("{krate}={level}").parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(cli.debug).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli.execute().await
}
