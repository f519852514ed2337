use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{
    error::TaskError,
    task::{Context, Task},
};

/// Reported by [`Interrupt`] when the run was interrupted from outside.
#[derive(Debug, Error)]
#[error("Aborting due to interrupt")]
pub struct Interrupted;

type Signal = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Blocks until an interrupt arrives, then fails with [`Interrupted`].
/// Returns cleanly if cancelled first.
pub struct Interrupt {
    signal: Signal,
}

impl Interrupt {
    /// Listens for Ctrl-C.
    pub fn ctrl_c() -> Self {
        Self::on(|| async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "unable to listen for interrupts");
                std::future::pending::<()>().await;
            }
        })
    }

    /// Fires when `notify` is notified.
    pub fn notify(notify: Arc<Notify>) -> Self {
        Self::on(move || {
            let notify = Arc::clone(&notify);
            async move { notify.notified().await }
        })
    }

    /// Fires when the future built by `signal` resolves.
    pub fn on<F, Fut>(signal: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            signal: Box::new(move || Box::pin(signal())),
        }
    }
}

#[async_trait]
impl Task for Interrupt {
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Ok(()),
            _ = (self.signal)() => {
                info!("interrupt received");
                Err(TaskError::from(Interrupted))
            }
        }
    }
}
