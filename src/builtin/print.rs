use std::{
    io::{self, Write},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    error::TaskError,
    task::{Context, Task},
};

/// Writes a message, to stdout unless another writer is given.
pub struct Print {
    message: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Print {
    pub fn new(message: impl Into<String>) -> Self {
        Self::to(message, io::stdout())
    }

    pub fn to(message: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            message: message.into(),
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl Task for Print {
    async fn start(&self, _ctx: Context) -> Result<(), TaskError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", self.message)?;
        writer.flush()?;
        Ok(())
    }
}
