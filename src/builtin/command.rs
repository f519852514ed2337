use std::{
    io::Error as IoError,
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::{Child, Command as TokioCommand},
};
use tracing::{debug, warn};

use crate::{
    error::TaskError,
    output::{OutputMode, output_print_lock},
    task::{Context, LongRunning, Task},
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command execution error: {0}")]
    Io(#[from] IoError),
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Command was cancelled")]
    Cancelled,
    #[error("Command failed with status: {0}")]
    Status(ExitStatus),
}

fn shell(command: &str) -> TokioCommand {
    if cfg!(target_os = "windows") {
        let mut c = TokioCommand::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = TokioCommand::new("sh");
        c.args(["-c", command]);
        c
    }
}

/// Runs a shell command. Cancelling the task kills the process.
#[derive(Debug, Clone)]
pub struct Command {
    command: String,
    timeout: Option<Duration>,
    output: OutputMode,
}

impl Command {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            output: OutputMode::default(),
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    async fn run(&self, ctx: &Context) -> Result<ExitStatus, CommandError> {
        let mut cmd = shell(&self.command);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stream = self.output == OutputMode::Stream;

        let stdout_handle = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(collect(pipe, tokio::io::stdout(), stream)));
        let stderr_handle = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(collect(pipe, tokio::io::stderr(), stream)));

        let status = tokio::select! {
            result = child.wait() => result?,
            _ = sleep_or_forever(self.timeout) => {
                kill(&mut child).await;
                return Err(CommandError::Timeout(self.timeout.unwrap_or_default()));
            }
            _ = ctx.cancelled() => {
                kill(&mut child).await;
                return Err(CommandError::Cancelled);
            }
        };

        let stdout = join_output(stdout_handle).await?;
        let stderr = join_output(stderr_handle).await?;

        if !stream && (!stdout.is_empty() || !stderr.is_empty()) {
            let _guard = output_print_lock().lock().await;
            let mut out = tokio::io::stdout();
            out.write_all(&stdout).await?;
            out.flush().await?;
            let mut err = tokio::io::stderr();
            err.write_all(&stderr).await?;
            err.flush().await?;
        }

        Ok(status)
    }
}

#[async_trait]
impl Task for Command {
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        debug!(command = %self.command, "running command");
        let status = self.run(&ctx).await?;
        if !status.success() {
            return Err(CommandError::Status(status).into());
        }
        Ok(())
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn kill(child: &mut Child) {
    if let Err(kill_err) = child.kill().await {
        warn!(error = %kill_err, "failed to kill process");
    }
}

async fn collect<R, W>(mut pipe: R, mut sink: W, stream: bool) -> Result<Vec<u8>, CommandError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut collected: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if stream {
            sink.write_all(&buf[..n]).await?;
        } else {
            collected.extend_from_slice(&buf[..n]);
        }
    }
    if stream {
        sink.flush().await?;
    }
    Ok(collected)
}

async fn join_output(
    handle: Option<tokio::task::JoinHandle<Result<Vec<u8>, CommandError>>>,
) -> Result<Vec<u8>, CommandError> {
    match handle {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(CommandError::Io(IoError::other(e))),
        },
        None => Ok(Vec::new()),
    }
}

/// Starts a process that keeps running after the task completes. The
/// process is killed on teardown, or once the task's context is cancelled.
#[derive(Debug)]
pub struct Service {
    command: String,
    slot: Arc<Mutex<Slot>>,
}

/// The process a service holds, tagged with the start that spawned it.
#[derive(Debug, Default)]
struct Slot {
    child: Option<Child>,
    generation: u64,
}

impl Slot {
    /// Kills the held process. With a generation, only a process spawned by
    /// that start is killed.
    fn stop(slot: &Mutex<Slot>, command: &str, generation: Option<u64>) {
        let child = {
            let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
            if generation.is_some_and(|generation| generation != slot.generation) {
                return;
            }
            slot.child.take()
        };
        if let Some(mut child) = child {
            debug!(command = %command, "stopping service");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to stop service");
            }
        }
    }
}

impl Service {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Whether a process started by this service is still held.
    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child
            .is_some()
    }
}

#[async_trait]
impl Task for Service {
    async fn start(&self, ctx: Context) -> Result<(), TaskError> {
        debug!(command = %self.command, "starting service");
        let child = shell(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::Io)?;

        let (previous, generation) = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.generation += 1;
            (slot.child.replace(child), slot.generation)
        };
        if let Some(mut previous) = previous {
            let _ = previous.start_kill();
        }

        // Teardown may have run while the process was spawning.
        if ctx.is_cancelled() {
            Slot::stop(&self.slot, &self.command, Some(generation));
            return Ok(());
        }

        let slot = Arc::clone(&self.slot);
        let command = self.command.clone();
        tokio::spawn(async move {
            ctx.cancelled().await;
            Slot::stop(&slot, &command, Some(generation));
        });
        Ok(())
    }
}

impl LongRunning for Service {
    fn teardown(&self) {
        Slot::stop(&self.slot, &self.command, None);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn successful_command() {
        Command::new("true").start(Context::default()).await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_reports_status() {
        let err = Command::new("exit 3")
            .start(Context::default())
            .await
            .unwrap_err();
        let err = err.downcast_ref::<CommandError>().unwrap();
        assert!(matches!(err, CommandError::Status(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn command_times_out() {
        let err = Command::new("sleep 5")
            .timeout(Some(Duration::from_millis(50)))
            .start(Context::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_kills_command() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = Command::new("sleep 5")
            .start(Context::new(token))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn service_is_killed_on_teardown() {
        let service = Service::new("sleep 5");
        service.start(Context::default()).await.unwrap();
        assert!(service.is_running());

        service.teardown();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn service_started_after_cancellation_is_killed() {
        let token = CancellationToken::new();
        token.cancel();

        let service = Service::new("sleep 5");
        service.start(Context::new(token)).await.unwrap();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn service_is_killed_when_cancelled_later() {
        let token = CancellationToken::new();
        let service = Service::new("sleep 5");
        service.start(Context::new(token.clone())).await.unwrap();
        assert!(service.is_running());

        token.cancel();
        for _ in 0..50 {
            if !service.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!service.is_running());
    }
}
