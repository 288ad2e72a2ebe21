//! External program execution.
//!
//! Backends that drive a CLI (`rbd`, `ceph`) go through [`CommandExecutor`]
//! so the same code runs against the host or against canned output.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{Result, VolumeError};

/// Runs an external program and returns its stdout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args`.
    ///
    /// Non-zero exit and spawn failures are both `CommandFailed`.
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Render a command line for logs and error messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Executes programs on the local host.
///
/// Children are killed when the returned future is dropped, so callers can
/// bound latency with `tokio::time::timeout` or abandon a request.
#[derive(Debug, Default, Clone)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let command = render_command(program, args);
        debug!(command = %command, "Executing command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VolumeError::CommandFailed {
                command: command.clone(),
                stderr: format!("failed to execute: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(command = %command, stderr = %stderr, "Command failed");
            return Err(VolumeError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Canned reply for a [`ScriptedExecutor`] rule.
#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Failure(String),
}

/// Replays canned output keyed by command-line prefix.
///
/// Rules are matched in insertion order against the rendered command line
/// (`program arg1 arg2 ...`). Every invocation is recorded. Unmatched
/// commands fail with "no scripted reply".
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `stdout` to commands starting with `prefix`.
    pub fn respond(self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push(prefix.into(), Reply::Stdout(stdout.into()));
        self
    }

    /// Fail commands starting with `prefix` with `stderr`.
    pub fn fail(self, prefix: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.push(prefix.into(), Reply::Failure(stderr.into()));
        self
    }

    fn push(&self, prefix: String, reply: Reply) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((prefix, reply));
        }
    }

    /// Command lines run so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded command lines starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let command = render_command(program, args);

        self.calls
            .lock()
            .map_err(|_| VolumeError::Internal("Lock poisoned".to_string()))?
            .push(command.clone());

        let reply = {
            let rules = self
                .rules
                .lock()
                .map_err(|_| VolumeError::Internal("Lock poisoned".to_string()))?;
            rules
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, reply)| reply.clone())
        };

        match reply {
            Some(Reply::Stdout(stdout)) => Ok(stdout),
            Some(Reply::Failure(stderr)) => Err(VolumeError::CommandFailed { command, stderr }),
            None => Err(VolumeError::CommandFailed {
                command,
                stderr: "no scripted reply".to_string(),
            }),
        }
    }
}
