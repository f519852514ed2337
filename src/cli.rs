use clap::Parser;

use colony::output::OutputMode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Task file to use
    #[arg(short = 'f', long = "file", default_value = "colony.toml")]
    pub file: String,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Override default command timeout (e.g., "5m", "30s", "1h30m")
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<String>,

    /// Show the execution order without running tasks
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// How to display command output in the terminal
    #[arg(long = "output", value_enum)]
    pub output: Option<OutputMode>,

    /// Do not turn Ctrl-C into an orderly shutdown
    #[arg(long = "no-interrupt")]
    pub no_interrupt: bool,

    /// Tasks to run; runs the default task or all tasks if none are given
    pub targets: Vec<String>,
}
