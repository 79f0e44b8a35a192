use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "sharenote",
    version,
    about = "Files shared notes into an Org-mode datetree journal"
)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level unless SHARENOTE_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one ingest pass, or keep running on the configured period
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Show paths, effective config, pending notes and daemon state
    Status,
    /// Stop a running `watch --daemon` process
    Stop,
    /// Show the entry a note would produce without filing it
    Preview { file: PathBuf },
}

fn emit(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Watch { once, daemon } => {
            // plain `watch` behaves like `watch --once`
            let opts = commands::watch::WatchOptions {
                once: once || !daemon,
                daemon,
            };
            commands::watch::run(&opts)?
        }
        Command::Status => commands::status::run()?,
        Command::Stop => commands::stop::run()?,
        Command::Preview { file } => commands::preview::run(&file)?,
    };
    emit(&report, cli.json)
}
