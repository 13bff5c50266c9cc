//! Juju CLI argument builders.

use std::fmt;

use super::version::JujuVersion;
use crate::plan::Revision;

/// Arguments for one invocation of the juju client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JujuCommand {
    args: Vec<String>,
}

impl JujuCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `juju --version`
    pub fn version() -> Self {
        Self::new(["--version"])
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for JujuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("juju")?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Builds juju invocations for an optional target environment.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    environment: Option<String>,
}

impl CommandBuilder {
    pub fn new(environment: Option<String>) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// `juju upgrade-juju --yes [--version X]`
    pub fn upgrade_juju(&self, version: Option<&JujuVersion>) -> JujuCommand {
        let mut args = vec!["upgrade-juju".to_string(), "--yes".to_string()];
        self.push_environment(&mut args);
        if let Some(v) = version {
            args.push("--version".to_string());
            args.push(v.to_string());
        }
        JujuCommand::new(args)
    }

    /// `juju upgrade-charm --revision R [--force] SERVICE`
    pub fn upgrade_charm(&self, service: &str, revision: &Revision, force: bool) -> JujuCommand {
        let mut args = vec![
            "upgrade-charm".to_string(),
            "--revision".to_string(),
            revision.to_string(),
        ];
        if force {
            args.push("--force".to_string());
        }
        self.push_environment(&mut args);
        args.push(service.to_string());
        JujuCommand::new(args)
    }

    /// `juju run --service SERVICE "COMMAND" --format=yaml`
    pub fn run_on_service(&self, service: &str, command: &str) -> JujuCommand {
        let mut args = vec![
            "run".to_string(),
            "--service".to_string(),
            service.to_string(),
        ];
        self.push_environment(&mut args);
        args.push(command.to_string());
        args.push("--format=yaml".to_string());
        JujuCommand::new(args)
    }

    fn push_environment(&self, args: &mut Vec<String>) {
        if let Some(env) = &self.environment {
            args.push("-e".to_string());
            args.push(env.clone());
        }
    }
}
