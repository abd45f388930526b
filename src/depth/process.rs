//! Depth engine running as a child process, speaking JSON lines over stdio.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::bridge::{BridgeError, DepthEngine, EngineLink};
use super::messages::{EngineMessage, PointCloudMessage};

/// Default engine launch command.
pub const DEFAULT_ENGINE_PROGRAM: &str = "roslaunch";

/// Default engine launch arguments.
pub const DEFAULT_ENGINE_ARGS: [&str; 2] = ["bino_cam", "matcher_nodes.launch"];

/// Buffered messages per direction.
const CHANNEL_CAPACITY: usize = 30;

/// How long shutdown waits for the engine to exit after SIGINT when no
/// runtime is left to reap it in the background.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Launches the engine command with piped stdin/stdout.
///
/// Each [`EngineMessage`] is written to the child's stdin as one JSON line;
/// each stdout line is parsed as a [`PointCloudMessage`]. Lines that do not
/// parse are logged and skipped.
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_ENGINE_PROGRAM,
            DEFAULT_ENGINE_ARGS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl DepthEngine for ProcessEngine {
    /// Must be called from within a Tokio runtime, which drives the pipe tasks.
    fn launch(&mut self) -> Result<EngineLink, BridgeError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BridgeError::EngineUnavailable(
                "no Tokio runtime to drive the engine pipes".to_string(),
            ));
        }
        tracing::info!("Launching depth engine: {} {}", self.program, self.args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(BridgeError::EngineUnavailable(
                "child process has no stdio pipes".to_string(),
            ));
        };

        let (outbound, mut requests) = mpsc::channel::<EngineMessage>(CHANNEL_CAPACITY);
        let (results, inbound) = mpsc::channel::<PointCloudMessage>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(message) = requests.recv().await {
                let mut line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("Failed to encode engine message: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    tracing::warn!("Depth engine stopped reading input: {}", e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<PointCloudMessage>(&line) {
                        Ok(cloud) => {
                            if results.send(cloud).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Ignoring engine output line: {}", e),
                    },
                    Ok(None) => {
                        tracing::info!("Depth engine closed its output");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read depth engine output: {}", e);
                        break;
                    }
                }
            }
        });

        self.child = Some(child);
        Ok(EngineLink { outbound, inbound })
    }

    /// Send SIGINT so the engine can shut down its own children; kill it
    /// outright if the signal cannot be delivered.
    fn terminate(&mut self) -> Result<(), BridgeError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            let interrupted = std::process::Command::new("kill")
                .arg("-INT")
                .arg(pid.to_string())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if interrupted {
                tracing::info!("Sent SIGINT to depth engine (pid {})", pid);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            match child.wait().await {
                                Ok(status) => tracing::info!("Depth engine exited: {}", status),
                                Err(e) => tracing::warn!("Failed to reap depth engine: {}", e),
                            }
                        });
                    }
                    Err(_) => wait_for_exit(&mut child, SHUTDOWN_GRACE),
                }
                return Ok(());
            }
            tracing::warn!("Could not interrupt depth engine (pid {}), killing it", pid);
        }

        child.start_kill()?;
        Ok(())
    }
}

/// Poll until the child exits or `grace` runs out; dropping it afterwards
/// kills whatever is left.
fn wait_for_exit(child: &mut Child, grace: Duration) {
    let started = Instant::now();
    while started.elapsed() < grace {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!("Depth engine exited: {}", status);
                return;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(20)),
            Err(e) => {
                tracing::warn!("Failed to poll depth engine: {}", e);
                return;
            }
        }
    }
    tracing::warn!("Depth engine ignored SIGINT for {:?}, killing it", grace);
}
