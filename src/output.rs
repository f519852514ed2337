use std::sync::OnceLock;

use clap::ValueEnum;
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Stream task output live.
    Stream,
    /// Print each task's output as a single block after it completes.
    #[default]
    Group,
}

static OUTPUT_PRINT_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes grouped output so blocks from parallel tasks don't interleave.
pub fn output_print_lock() -> &'static Mutex<()> {
    OUTPUT_PRINT_LOCK.get_or_init(|| Mutex::new(()))
}
