pub mod config;
pub mod dependency;
pub mod provision;

pub use config::{TaskConfiguration, load_tasks};
pub use dependency::{DepthFirst, Resolver, WithInterrupt, resolve};
pub use provision::{Provision, Provisioner};

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Cancellable execution context handed to a running task.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Resolves once the task has been asked to stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// A unit of work. `start` must return promptly once `ctx` is cancelled.
#[async_trait]
pub trait Task: Send + Sync {
    async fn start(&self, ctx: Context) -> Result<(), TaskError>;
}

/// A task that needs an explicit teardown on top of context cancellation,
/// e.g. killing a subprocess it left running.
///
/// `teardown` is always invoked before the task's context is cancelled.
pub trait LongRunning: Task {
    fn teardown(&self);
}

/// Adapts an async closure into a [`Task`].
pub struct TaskFn<F>(F);

impl<F, Fut> TaskFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        TaskFn(f)
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        (self.0)(ctx).await
    }
}

/// A task that does nothing.
pub fn noop() -> impl Task {
    TaskFn::new(|_| async { Ok(()) })
}

/// A registered task, tagged with its capabilities at registration time.
#[derive(Clone)]
pub enum Unit {
    Plain(Arc<dyn Task>),
    LongRunning(Arc<dyn LongRunning>),
}

impl Unit {
    pub async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        match self {
            Unit::Plain(task) => task.start(ctx).await,
            Unit::LongRunning(task) => task.start(ctx).await,
        }
    }

    pub fn teardown(&self) -> Option<Arc<dyn LongRunning>> {
        match self {
            Unit::Plain(_) => None,
            Unit::LongRunning(task) => Some(Arc::clone(task)),
        }
    }
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Plain(_) => f.write_str("Plain(..)"),
            Unit::LongRunning(_) => f.write_str("LongRunning(..)"),
        }
    }
}
