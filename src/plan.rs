//! Upgrade plan schema and loading.
//!
//! The plan is read once from YAML, validated, and then handed to the
//! executor as an immutable tree.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::JupError;
use crate::juju::version::JujuVersion;

/// What to do when a command or hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole plan.
    #[default]
    Abort,
    /// Log the failure and keep going.
    Continue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Continue => "continue",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle hook names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    PreUpgrade,
    PostUpgrade,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::PreUpgrade => "pre-upgrade",
            HookName::PostUpgrade => "post-upgrade",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands a hook runs, on the control host and on remote units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookCommands {
    #[serde(default, deserialize_with = "null_as_default")]
    pub local: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: Vec<String>,
}

/// A pre/post lifecycle hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    #[serde(default)]
    pub run: Option<HookCommands>,
    #[serde(default)]
    pub failure: FailurePolicy,
}

impl HookSpec {
    pub fn local_commands(&self) -> &[String] {
        self.run.as_ref().map_or(&[], |r| r.local.as_slice())
    }

    pub fn unit_commands(&self) -> &[String] {
        self.run.as_ref().map_or(&[], |r| r.unit.as_slice())
    }

    pub fn command_count(&self) -> usize {
        self.local_commands().len() + self.unit_commands().len()
    }
}

/// A configuration block that may carry lifecycle hooks.
pub trait HookScope {
    fn hook(&self, name: HookName) -> Option<&HookSpec>;
}

/// A YAML scalar that may be written as a string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Text(String),
    Integer(u64),
    Float(f64),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

/// Requested juju-core version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Scalar")]
pub enum TargetVersion {
    #[default]
    Latest,
    Pinned(JujuVersion),
}

impl TryFrom<Scalar> for TargetVersion {
    type Error = JupError;

    fn try_from(value: Scalar) -> std::result::Result<Self, Self::Error> {
        // A bare float drops trailing zeros: `1.20` would become 1.2.0.
        if let Scalar::Float(f) = value {
            return Err(JupError::InvalidPlan(format!(
                "juju-core version {} must be quoted, e.g. version: \"1.20\"",
                f
            )));
        }
        let raw = String::from(value);
        if raw.eq_ignore_ascii_case("latest") {
            return Ok(TargetVersion::Latest);
        }
        raw.parse().map(TargetVersion::Pinned)
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetVersion::Latest => f.write_str("latest"),
            TargetVersion::Pinned(v) => write!(f, "{}", v),
        }
    }
}

/// Charm store revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Scalar")]
pub struct Revision(String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<Scalar> for Revision {
    type Error = JupError;

    fn try_from(value: Scalar) -> std::result::Result<Self, Self::Error> {
        let raw = String::from(value);
        if raw.is_empty() {
            return Err(JupError::InvalidPlan(
                "charm-store-revision must not be empty".to_string(),
            ));
        }
        Ok(Revision(raw))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// juju-core upgrade settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorePlatformUpgrade {
    #[serde(default)]
    pub upgrade: bool,
    #[serde(default)]
    pub version: TargetVersion,
    #[serde(default)]
    pub failure: FailurePolicy,
}

/// Upgrade settings for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServiceUpgradeSpec {
    /// Absent means the service is not upgraded.
    #[serde(default)]
    pub charm_store_revision: Option<Revision>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub failure: FailurePolicy,
    #[serde(default)]
    pub pre_upgrade: Option<HookSpec>,
    #[serde(default)]
    pub post_upgrade: Option<HookSpec>,
}

impl HookScope for ServiceUpgradeSpec {
    fn hook(&self, name: HookName) -> Option<&HookSpec> {
        match name {
            HookName::PreUpgrade => self.pre_upgrade.as_ref(),
            HookName::PostUpgrade => self.post_upgrade.as_ref(),
        }
    }
}

/// Services upgraded within the same step.
pub type ServiceGroup = BTreeMap<String, ServiceUpgradeSpec>;

/// Root of the upgrade plan document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpgradePlan {
    #[serde(default)]
    pub juju_core: Option<CorePlatformUpgrade>,
    /// Keyed by step number; iteration order is execution order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: BTreeMap<u32, ServiceGroup>,
    #[serde(default)]
    pub pre_upgrade: Option<HookSpec>,
    #[serde(default)]
    pub post_upgrade: Option<HookSpec>,
}

impl HookScope for UpgradePlan {
    fn hook(&self, name: HookName) -> Option<&HookSpec> {
        match name {
            HookName::PreUpgrade => self.pre_upgrade.as_ref(),
            HookName::PostUpgrade => self.post_upgrade.as_ref(),
        }
    }
}

impl UpgradePlan {
    /// Load and validate an upgrade plan from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load plan from {}", path.display()))
    }

    /// Parse and validate an upgrade plan from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document is a valid, empty plan.
        let plan: UpgradePlan = if content.trim().is_empty() {
            UpgradePlan::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        plan.validate()?;
        Ok(plan)
    }

    /// Check constraints the schema alone cannot express.
    pub fn validate(&self) -> std::result::Result<(), JupError> {
        for name in [HookName::PreUpgrade, HookName::PostUpgrade] {
            if let Some(hook) = self.hook(name) {
                if !hook.unit_commands().is_empty() {
                    return Err(JupError::InvalidPlan(format!(
                        "top-level {} hook cannot run unit commands (no service to target)",
                        name
                    )));
                }
                validate_hook_commands(hook, name, None)?;
            }
        }

        for (step, group) in &self.steps {
            for (service, spec) in group {
                if service.trim().is_empty() {
                    return Err(JupError::InvalidPlan(format!(
                        "step {} contains a service with an empty name",
                        step
                    )));
                }
                for name in [HookName::PreUpgrade, HookName::PostUpgrade] {
                    if let Some(hook) = spec.hook(name) {
                        validate_hook_commands(hook, name, Some(service))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Total number of services across all steps.
    pub fn service_count(&self) -> usize {
        self.steps.values().map(|g| g.len()).sum()
    }
}

fn validate_hook_commands(
    hook: &HookSpec,
    name: HookName,
    service: Option<&str>,
) -> std::result::Result<(), JupError> {
    let has_blank = hook
        .local_commands()
        .iter()
        .chain(hook.unit_commands())
        .any(|cmd| cmd.trim().is_empty());

    if has_blank {
        let scope = service.map_or_else(|| "plan".to_string(), |s| format!("service {}", s));
        return Err(JupError::InvalidPlan(format!(
            "{} hook on {} contains an empty command",
            name, scope
        )));
    }
    Ok(())
}

/// Treat an explicit YAML `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
