//! Juju version parsing and upgrade gating.

use std::fmt;
use std::str::FromStr;

use crate::error::JupError;
use crate::plan::TargetVersion;

/// A juju-core release version.
///
/// Field order matters: the derived `Ord` compares major, then minor,
/// then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JujuVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl JujuVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `juju --version`, e.g. `1.25.3-trusty-amd64`.
    pub fn from_cli_output(output: &str) -> Result<Self, JupError> {
        let line = output
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| JupError::InvalidVersion(output.trim().to_string()))?;

        let number = line.split('-').next().unwrap_or(line);
        number.parse()
    }
}

impl FromStr for JujuVersion {
    type Err = JupError;

    /// Accepts `major.minor` or `major.minor.patch`; a missing patch is 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || JupError::InvalidVersion(s.to_string());

        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed
            .strip_prefix('v')
            .unwrap_or(trimmed)
            .split('.')
            .collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }

        let major = parts[0].parse().map_err(|_| invalid())?;
        let minor = parts[1].parse().map_err(|_| invalid())?;
        let patch = match parts.get(2) {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };

        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for JujuVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Decide whether `juju upgrade-juju` needs an explicit `--version`.
///
/// `latest` never does. A pinned version does only when it is strictly
/// newer than the installed one.
pub fn needs_explicit_version(requested: &TargetVersion, installed: &JujuVersion) -> bool {
    match requested {
        TargetVersion::Latest => false,
        TargetVersion::Pinned(version) => version > installed,
    }
}
