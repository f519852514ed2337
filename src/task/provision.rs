use async_trait::async_trait;

use super::{Context, Task};
use crate::error::TaskError;

/// Work that can tell whether it is already done and undo a failed attempt.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns `true` when the desired state already holds.
    async fn expect(&self) -> Result<bool, TaskError>;

    async fn start(&self, ctx: Context) -> Result<(), TaskError>;

    /// Compensates for a failed `start`.
    fn abort(&self);
}

/// Turns a [`Provisioner`] into a [`Task`] that skips satisfied work and
/// aborts failed attempts.
pub struct Provision<P>(pub P);

impl<P: Provisioner> Provision<P> {
    pub fn new(provisioner: P) -> Self {
        Provision(provisioner)
    }

    pub fn inner(&self) -> &P {
        &self.0
    }
}

#[async_trait]
impl<P: Provisioner> Task for Provision<P> {
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        if self.0.expect().await? {
            return Ok(());
        }

        if let Err(err) = self.0.start(ctx).await {
            self.0.abort();
            return Err(err);
        }

        Ok(())
    }
}
