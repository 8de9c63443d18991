use clap::Parser;
use rdt_cli::{Cli, run};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    run(Cli::parse())
}
