use thiserror::Error;

use crate::builtin::Interrupted;

/// Error type returned by a task's `start`.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ColonyError {
    #[error("Dependency error: task '{task}' depends on '{dependency}' which doesn't exist")]
    DependencyNotFound { task: String, dependency: String },

    #[error("Dependency error: circular dependency: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Dependency error: task '{task}' appears more than once in the run order")]
    DuplicateTask { task: String },

    #[error("Task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },

    #[error("Task '{task}' panicked")]
    Panicked { task: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl ColonyError {
    /// Name of the task that reported this error, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            ColonyError::Task { task, .. } | ColonyError::Panicked { task } => Some(task),
            _ => None,
        }
    }

    /// The error the failing task returned, if this is a task failure.
    pub fn task_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ColonyError::Task { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        self.task_error()
            .is_some_and(|err| err.downcast_ref::<Interrupted>().is_some())
    }
}

pub type Result<T> = std::result::Result<T, ColonyError>;
