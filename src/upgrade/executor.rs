//! Upgrade plan execution.
//!
//! Runs the plan strictly in order: plan pre-upgrade hook, juju-core
//! upgrade, every step in ascending order (services bracketed by their own
//! hooks), then the plan post-upgrade hook. The first fatal failure stops
//! the whole plan.

use tracing::{Span, info, info_span, warn};

use super::hooks::{HookEngine, HookOutcome};
use crate::error::JupError;
use crate::juju::commands::{CommandBuilder, JujuCommand};
use crate::juju::runner::CommandRunner;
use crate::juju::version::needs_explicit_version;
use crate::plan::{
    CorePlatformUpgrade, FailurePolicy, HookName, HookScope, ServiceUpgradeSpec, TargetVersion,
    UpgradePlan,
};

/// What happened to juju-core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlatformStatus {
    #[default]
    NotRequested,
    Upgraded,
    FailedContinued,
}

/// What happened to a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Upgraded,
    /// Upgrade failed under the continue policy.
    FailedContinued,
    /// No charm-store-revision configured.
    Skipped,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Upgraded => "upgraded",
            ServiceStatus::FailedContinued => "failed (continued)",
            ServiceStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub step: u32,
    pub service: String,
    pub status: ServiceStatus,
}

/// Informational record of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub platform: PlatformStatus,
    pub services: Vec<ServiceReport>,
    /// Hook commands that failed under the continue policy.
    pub hook_failures: usize,
}

impl ExecutionSummary {
    pub fn count(&self, status: ServiceStatus) -> usize {
        self.services.iter().filter(|s| s.status == status).count()
    }
}

/// Executes an [`UpgradePlan`] against a [`CommandRunner`].
pub struct PlanExecutor<'a, R> {
    runner: &'a R,
    hooks: HookEngine<'a, R>,
    commands: CommandBuilder,
    span: Span,
}

impl<'a, R: CommandRunner> PlanExecutor<'a, R> {
    pub fn new(runner: &'a R, commands: CommandBuilder, span: Span) -> Self {
        let hooks = HookEngine::new(runner, info_span!(parent: &span, "hooks"));
        Self {
            runner,
            hooks,
            commands,
            span,
        }
    }

    /// Execute the whole plan.
    ///
    /// Returns the first fatal error: a hook abort, a juju-core upgrade
    /// failure, or a service upgrade failure under the abort policy.
    pub async fn execute(&self, plan: &UpgradePlan) -> Result<ExecutionSummary, JupError> {
        let mut summary = ExecutionSummary::default();

        self.run_hook(HookName::PreUpgrade, plan, None, &mut summary)
            .await?;

        if let Some(core) = plan.juju_core.as_ref().filter(|c| c.upgrade) {
            summary.platform = self.upgrade_platform(core).await?;
        } else {
            info!(parent: &self.span, "juju-core upgrade not requested");
        }

        if plan.steps.is_empty() {
            warn!(parent: &self.span, "No upgrade steps defined");
        }

        for (step, services) in &plan.steps {
            info!(
                parent: &self.span,
                "Performing upgrade step {} ({} services)",
                step,
                services.len()
            );
            for (service, spec) in services {
                self.upgrade_service(*step, service, spec, &mut summary)
                    .await?;
            }
            info!(parent: &self.span, "Finished upgrade step {}", step);
        }

        self.run_hook(HookName::PostUpgrade, plan, None, &mut summary)
            .await?;

        info!(
            parent: &self.span,
            "Upgrade plan complete: {} upgraded, {} failed, {} skipped",
            summary.count(ServiceStatus::Upgraded),
            summary.count(ServiceStatus::FailedContinued),
            summary.count(ServiceStatus::Skipped)
        );

        Ok(summary)
    }

    /// Upgrade juju-core, applying its failure policy.
    async fn upgrade_platform(
        &self,
        core: &CorePlatformUpgrade,
    ) -> Result<PlatformStatus, JupError> {
        let command = match self.resolve_platform_command(core).await {
            Ok(command) => command,
            Err(e) => return self.platform_failure(core.failure, e),
        };

        info!(parent: &self.span, "Performing juju-core upgrade: {}", command);

        match self.runner.run_juju(&command).await {
            Ok(_) => {
                info!(parent: &self.span, "juju-core upgrade complete");
                Ok(PlatformStatus::Upgraded)
            }
            Err(e) => self.platform_failure(core.failure, e),
        }
    }

    async fn resolve_platform_command(
        &self,
        core: &CorePlatformUpgrade,
    ) -> Result<JujuCommand, JupError> {
        let TargetVersion::Pinned(requested) = &core.version else {
            return Ok(self.commands.upgrade_juju(None));
        };

        let installed = self.runner.installed_version().await?;
        if needs_explicit_version(&core.version, &installed) {
            Ok(self.commands.upgrade_juju(Some(requested)))
        } else {
            info!(
                parent: &self.span,
                "Installed juju-core {} is not older than requested {}, upgrading without explicit version",
                installed,
                requested
            );
            Ok(self.commands.upgrade_juju(None))
        }
    }

    fn platform_failure(
        &self,
        policy: FailurePolicy,
        err: JupError,
    ) -> Result<PlatformStatus, JupError> {
        match policy {
            FailurePolicy::Abort => {
                warn!(
                    parent: &self.span,
                    "juju-core upgrade failed, failure set to abort: {}", err
                );
                Err(JupError::PlatformUpgrade(err.to_string()))
            }
            FailurePolicy::Continue => {
                warn!(
                    parent: &self.span,
                    "juju-core upgrade failed, but failure mode has been set to continue: {}", err
                );
                Ok(PlatformStatus::FailedContinued)
            }
        }
    }

    /// Pre-upgrade hook, charm upgrade, then post-upgrade hook on success.
    async fn upgrade_service(
        &self,
        step: u32,
        service: &str,
        spec: &ServiceUpgradeSpec,
        summary: &mut ExecutionSummary,
    ) -> Result<(), JupError> {
        info!(parent: &self.span, "Upgrading service: {}", service);

        self.run_hook(HookName::PreUpgrade, spec, Some(service), summary)
            .await?;

        let mut report = |status| {
            summary.services.push(ServiceReport {
                step,
                service: service.to_string(),
                status,
            })
        };

        let Some(revision) = &spec.charm_store_revision else {
            info!(
                parent: &self.span,
                "Service {} has no charm-store-revision, skipping upgrade", service
            );
            report(ServiceStatus::Skipped);
            return Ok(());
        };

        let command = self.commands.upgrade_charm(service, revision, spec.force);
        info!(parent: &self.span, "Upgrading service: {}, cmd: {}", service, command);

        if let Err(e) = self.runner.run_juju(&command).await {
            return match spec.failure {
                FailurePolicy::Abort => {
                    warn!(
                        parent: &self.span,
                        "Cannot upgrade service: {}, failure set to abort: {}", service, e
                    );
                    Err(JupError::ServiceUpgrade {
                        service: service.to_string(),
                        message: e.to_string(),
                    })
                }
                FailurePolicy::Continue => {
                    warn!(
                        parent: &self.span,
                        "Upgrade for service: {} failed, but failure mode has been set to continue: {}",
                        service,
                        e
                    );
                    report(ServiceStatus::FailedContinued);
                    Ok(())
                }
            };
        }

        report(ServiceStatus::Upgraded);

        self.run_hook(HookName::PostUpgrade, spec, Some(service), summary)
            .await
    }

    /// Run a hook and turn an abort into a fatal error.
    async fn run_hook(
        &self,
        name: HookName,
        scope: &impl HookScope,
        service: Option<&str>,
        summary: &mut ExecutionSummary,
    ) -> Result<(), JupError> {
        match self.hooks.run_hook(name, scope, service).await {
            HookOutcome::NotFound => {
                match service {
                    Some(service) => {
                        info!(parent: &self.span, "Hook {} not defined on service: {}", name, service)
                    }
                    None => warn!(parent: &self.span, "Hook: {} not defined", name),
                }
                Ok(())
            }
            HookOutcome::Completed { failures } => {
                summary.hook_failures += failures;
                Ok(())
            }
            HookOutcome::Aborted { message } => Err(JupError::HookAbort {
                hook: name.to_string(),
                message,
            }),
        }
    }
}
