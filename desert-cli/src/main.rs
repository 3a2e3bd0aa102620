//! desert-cli - collect, export and correct desertification covariates.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "desert-cli",
    version,
    about = "Egyptian soil, vegetation and climate data toolkit"
)]
struct Cli {
    /// Debug output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for per-run log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: desert_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_dir = (!cli.no_log_file).then_some(cli.log_dir.as_path());
    if let Some(path) = desert_log::init(level, log_dir).map_err(|e| anyhow::anyhow!(e))? {
        log::info!("Logging to {}", path.display());
    }
    desert_cmd::run(cli.command).await
}
