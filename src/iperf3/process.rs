use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdout, Command as TokioCommand};
use tracing::info;

use super::error::LaunchError;
use super::params::Iperf3Params;

/// Default location of the iperf3 binary.
pub const DEFAULT_IPERF3_PATH: &str = "/usr/bin/iperf3";

/// How a measurement process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub success: bool,
}

impl ProcessExit {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status: {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A process whose stdout can be parsed while it runs.
///
/// The orchestrator only needs these two operations, which lets tests replay
/// canned output without spawning anything.
#[async_trait]
pub trait MeasurementProcess: Send {
    type Output: AsyncRead + Unpin + Send;

    /// Starts the process and hands back its standard output.
    fn start(&mut self) -> Result<Self::Output, LaunchError>;

    /// Waits for the started process to terminate.
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;
}

/// The real iperf3 client, driven through `tokio::process`.
#[derive(Debug)]
pub struct Iperf3Process {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl Iperf3Process {
    pub fn new(program: impl Into<PathBuf>, params: &Iperf3Params) -> Self {
        Self::with_args(program, params.to_args())
    }

    pub fn with_args(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl MeasurementProcess for Iperf3Process {
    type Output = ChildStdout;

    fn start(&mut self) -> Result<ChildStdout, LaunchError> {
        if self.child.is_some() {
            return Err(LaunchError::AlreadyStarted);
        }

        let mut command = TokioCommand::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        info!(program = ?self.program, args = ?self.args, "Spawning iperf3.");
        let mut child = command.spawn()?;
        info!(pid = ?child.id(), "Spawned iperf3 process successfully.");

        let stdout = child.stdout.take().ok_or(LaunchError::MissingStdout)?;
        self.child = Some(child);
        Ok(stdout)
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| std::io::Error::other("iperf3 process was never started"))?;
        child.wait().await.map(ProcessExit::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_display() {
        assert_eq!(ProcessExit::from_code(1).to_string(), "exit status: 1");
        assert!(ProcessExit::from_code(0).success);
        let killed = ProcessExit {
            code: None,
            success: false,
        };
        assert_eq!(killed.to_string(), "terminated by signal");
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let mut process = Iperf3Process::new(
            "/nonexistent/iperf3-relay-test/iperf3",
            &Iperf3Params::new("127.0.0.1"),
        );
        assert!(matches!(process.start(), Err(LaunchError::Spawn(_))));
        assert!(process.wait().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_receives_params_argv() {
        use tokio::io::AsyncReadExt;

        let mut params = Iperf3Params::new("10.0.0.1");
        params.reverse = true;
        params.parallel_streams = 3;
        let mut process = Iperf3Process::new("echo", &params);
        assert_eq!(process.args(), params.to_args().as_slice());

        let mut stdout = process.start().unwrap();
        let mut printed = String::new();
        stdout.read_to_string(&mut printed).await.unwrap();
        assert!(process.wait().await.unwrap().success);
        assert_eq!(printed.trim_end(), process.args().join(" "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut process = Iperf3Process::with_args("true", Vec::new());
        let _stdout = process.start().unwrap();
        assert!(matches!(process.start(), Err(LaunchError::AlreadyStarted)));
        assert!(process.wait().await.unwrap().success);
    }
}
