//! Command execution on the control host and on remote units.

use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{Span, debug, info};

use super::commands::{CommandBuilder, JujuCommand};
use super::version::JujuVersion;
use crate::error::JupError;

/// Captured output on success, failure details otherwise.
pub type CommandOutcome = Result<String, JupError>;

/// Result of running a command on one remote unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit_id: String,
    pub stdout: String,
    pub stderr: Option<String>,
    pub return_code: i32,
}

impl UnitOutcome {
    /// Error text for a failing unit. Any captured stderr counts as failure.
    pub fn error(&self) -> Option<String> {
        if let Some(stderr) = self.stderr.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(stderr.trim().to_string());
        }
        if self.return_code != 0 {
            return Some(format!("exit code {}", self.return_code));
        }
        None
    }
}

/// Executes external commands for the upgrade engine.
///
/// Implementations report failures through the returned value; they never
/// decide whether a failure is fatal.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a shell command on the control host.
    async fn run_local(&self, command: &str) -> CommandOutcome;

    /// Run a shell command on every unit of `service`.
    async fn run_on_units(
        &self,
        service: &str,
        command: &str,
    ) -> Result<Vec<UnitOutcome>, JupError>;

    /// Run a juju client command.
    async fn run_juju(&self, command: &JujuCommand) -> CommandOutcome;

    /// Detect the installed juju-core version.
    async fn installed_version(&self) -> Result<JujuVersion, JupError> {
        let output = self.run_juju(&JujuCommand::version()).await?;
        JujuVersion::from_cli_output(&output)
    }
}

/// Runs commands through the real juju client.
pub struct JujuCli {
    juju_bin: String,
    commands: CommandBuilder,
    timeout: Option<Duration>,
    span: Span,
}

impl JujuCli {
    pub fn new(
        juju_bin: impl Into<String>,
        commands: CommandBuilder,
        timeout: Option<Duration>,
        span: Span,
    ) -> Self {
        Self {
            juju_bin: juju_bin.into(),
            commands,
            timeout,
            span,
        }
    }

    /// Spawn `cmd` and capture (stdout, stderr), failing on nonzero exit.
    async fn capture(
        &self,
        mut cmd: Command,
        command_line: &str,
    ) -> Result<(String, String), JupError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(parent: &self.span, "Running: {}", command_line);

        let pending = cmd.output();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(JupError::Timeout {
                        command: command_line.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => pending.await,
        };

        let output = result.map_err(|e| JupError::CommandFailed {
            command: command_line.to_string(),
            details: format!("failed to execute: {}", e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let captured = format!("{}{}", stdout, stderr);
            return Err(JupError::CommandFailed {
                command: command_line.to_string(),
                details: format!("{}: {}", output.status, captured.trim()),
            });
        }

        Ok((stdout, stderr))
    }
}

impl CommandRunner for JujuCli {
    async fn run_local(&self, command: &str) -> CommandOutcome {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);

        let (stdout, stderr) = self.capture(cmd, command).await?;
        Ok(format!("{}{}", stdout, stderr))
    }

    async fn run_on_units(
        &self,
        service: &str,
        command: &str,
    ) -> Result<Vec<UnitOutcome>, JupError> {
        let juju = self.commands.run_on_service(service, command);
        let command_line = juju.to_string();

        let mut cmd = Command::new(&self.juju_bin);
        cmd.args(juju.args());

        let (stdout, _) = self.capture(cmd, &command_line).await?;
        parse_unit_results(&stdout).map_err(|e| JupError::CommandFailed {
            command: command_line,
            details: format!("unreadable unit output: {}", e),
        })
    }

    async fn run_juju(&self, command: &JujuCommand) -> CommandOutcome {
        let mut cmd = Command::new(&self.juju_bin);
        cmd.args(command.args());

        let (stdout, stderr) = self.capture(cmd, &command.to_string()).await?;
        Ok(format!("{}{}", stdout, stderr))
    }
}

/// One record of `juju run --format=yaml` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawUnitResult {
    #[serde(default)]
    machine_id: Option<serde_yaml::Value>,
    #[serde(default)]
    unit_id: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    return_code: Option<i32>,
}

/// Parse the per-unit records printed by `juju run --format=yaml`.
pub fn parse_unit_results(yaml: &str) -> Result<Vec<UnitOutcome>, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<RawUnitResult> = serde_yaml::from_str(yaml)?;

    Ok(raw
        .into_iter()
        .map(|r| {
            let machine_id = r.machine_id.as_ref().and_then(scalar_to_string);
            UnitOutcome {
                unit_id: r
                    .unit_id
                    .or(machine_id)
                    .unwrap_or_else(|| "unknown".to_string()),
                stdout: r.stdout.unwrap_or_default(),
                stderr: r.stderr,
                return_code: r.return_code.unwrap_or(0),
            }
        })
        .collect())
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Logs every command instead of running it.
pub struct DryRunRunner {
    span: Span,
}

impl DryRunRunner {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

impl CommandRunner for DryRunRunner {
    async fn run_local(&self, command: &str) -> CommandOutcome {
        info!(parent: &self.span, "[DRY RUN] Would run locally: {}", command);
        Ok(String::new())
    }

    async fn run_on_units(
        &self,
        service: &str,
        command: &str,
    ) -> Result<Vec<UnitOutcome>, JupError> {
        info!(
            parent: &self.span,
            "[DRY RUN] Would run on units of {}: {}", service, command
        );
        Ok(Vec::new())
    }

    async fn run_juju(&self, command: &JujuCommand) -> CommandOutcome {
        info!(parent: &self.span, "[DRY RUN] Would run: {}", command);
        Ok(String::new())
    }

    async fn installed_version(&self) -> Result<JujuVersion, JupError> {
        debug!(parent: &self.span, "[DRY RUN] Assuming installed juju-core 0.0.0");
        Ok(JujuVersion::new(0, 0, 0))
    }
}
