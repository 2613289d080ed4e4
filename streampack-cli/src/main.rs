//! Streampack CLI - Command-line interface
//!
//! Drives files through the stream data packer for inspection and tuning.

mod commands;

use clap::Parser;
use streampack_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "streampack")]
#[command(about = "Stream data packer driver")]
struct Cli {
    /// Console log level
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.into(), None)?;

    commands::handle_command(cli.command)
}
