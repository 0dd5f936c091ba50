//! Command execution seam for workflow steps

pub mod command;
pub mod streaming;
pub mod system;

use std::path::Path;

use async_trait::async_trait;

pub use command::{CommandOutput, CommandSpec, ShellError};
pub use streaming::{BoxedCallback, NoopCallback, OutputCallback, OutputLine, StreamSource};
pub use system::SystemShell;

/// Trait for running workflow commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, delivering output lines to `callback`
    /// as they arrive
    async fn run(
        &self,
        spec: &CommandSpec,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ShellError>;

    /// Launch a long-lived service, redirecting its output to `log_path`
    ///
    /// The returned handle owns the child; dropping it without calling
    /// [`ServiceProcess::shutdown`] kills the process.
    async fn spawn_service(
        &self,
        spec: &CommandSpec,
        log_path: &Path,
    ) -> Result<Box<dyn ServiceProcess>, ShellError>;
}

/// Handle to a spawned background service
#[async_trait]
pub trait ServiceProcess: Send {
    /// Exit code if the service has terminated, `None` while it runs.
    /// A signal-killed service reports `-1`.
    fn poll_exit(&mut self) -> Result<Option<i32>, ShellError>;

    /// Kill the service and reap it
    async fn shutdown(&mut self) -> Result<(), ShellError>;

    /// OS process id, when still available
    fn id(&self) -> Option<u32>;
}
