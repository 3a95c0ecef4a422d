//! CLI command definitions and dispatch

use clap::{Parser, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

mod copy;
mod version;

/// bcp - copy files and directories to and from S3
#[derive(Parser, Debug)]
#[command(name = "bcp", version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a file or directory between the local filesystem and S3
    #[command(visible_alias = "cp")]
    Copy(copy::CopyArgs),

    /// Print version information
    Version,
}

/// Run the selected command
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Copy(args) => copy::execute(args, output_config).await,
        Commands::Version => version::execute(output_config),
    }
}
