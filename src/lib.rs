//! Dependency-aware task orchestration.
//!
//! Tasks are registered on a [`Runner`] together with the names they depend
//! on. Starting a set of targets resolves their dependencies, runs
//! independent tasks concurrently and, on the first failure, cancels
//! everything that was started in reverse dependency order.
//!
//! ```no_run
//! use colony::{Runner, builtin::{Print, Wait}};
//! use std::time::Duration;
//!
//! # async fn run() -> colony::Result<()> {
//! let mut runner = Runner::new();
//! runner
//!     .task("wait", Wait(Duration::from_secs(1)), &[])
//!     .task("foo", Print::new("Hello Foo!"), &[])
//!     .task("bar", Print::new("Hello Bar!"), &["foo", "wait"])
//!     .task("world", Print::new("Hello World!"), &["bar", "foo"]);
//! runner.start(&["world"]).await
//! # }
//! ```

pub mod builtin;
pub mod error;
pub mod execution;
pub mod graph;
pub mod output;
pub mod task;
mod util;

pub use error::{ColonyError, Result, TaskError};
pub use execution::Runner;
pub use graph::{Graph, Node};
pub use task::{Context, LongRunning, Provision, Provisioner, Resolver, Task, TaskFn, Unit};
