use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::TaskError,
    task::{Context, Task},
};

/// Sleeps for a fixed duration, or until cancelled.
#[derive(Debug, Clone, Copy)]
pub struct Wait(pub Duration);

#[async_trait]
impl Task for Wait {
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        tokio::select! {
            _ = tokio::time::sleep(self.0) => {
                debug!(duration = ?self.0, "waited");
            }
            _ = ctx.cancelled() => {
                debug!(duration = ?self.0, "aborted waiting");
            }
        }
        Ok(())
    }
}
