//! Lifecycle hook execution with per-hook failure policy.

use std::ops::ControlFlow;
use tracing::{Span, debug, info, warn};

use crate::juju::runner::CommandRunner;
use crate::plan::{FailurePolicy, HookName, HookScope};

/// Result of running a named hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// The scope has no hook with this name.
    NotFound,
    /// Every command was attempted; `failures` were tolerated under
    /// the continue policy.
    Completed { failures: usize },
    /// A command failed under the abort policy. Later commands were not run.
    Aborted { message: String },
}

/// Runs pre/post upgrade hooks through a [`CommandRunner`].
pub struct HookEngine<'a, R> {
    runner: &'a R,
    span: Span,
}

impl<'a, R: CommandRunner> HookEngine<'a, R> {
    pub fn new(runner: &'a R, span: Span) -> Self {
        Self { runner, span }
    }

    /// Run hook `name` from `scope`.
    ///
    /// Local commands run first, in order, then unit commands against every
    /// unit of `service`. Each failure is resolved against the hook's
    /// `failure` policy.
    pub async fn run_hook(
        &self,
        name: HookName,
        scope: &impl HookScope,
        service: Option<&str>,
    ) -> HookOutcome {
        let Some(hook) = scope.hook(name) else {
            debug!(parent: &self.span, "Hook {} not present", name);
            return HookOutcome::NotFound;
        };

        info!(parent: &self.span, "Running {} hook", name);

        let policy = hook.failure;
        let mut failures = 0;

        let local = hook.local_commands();
        if !local.is_empty() {
            info!(parent: &self.span, "Running {} hooks on local machine", name);
        }

        for cmd in local {
            info!(parent: &self.span, "Executing '{}'", cmd);
            if let Err(e) = self.runner.run_local(cmd).await {
                let detail = format!("cmd: {}, error: {}", cmd, e);
                if let ControlFlow::Break(message) = self.on_failure(name, policy, detail) {
                    return HookOutcome::Aborted { message };
                }
                failures += 1;
            }
        }

        for cmd in hook.unit_commands() {
            let Some(service) = service else {
                let detail = format!("cmd: {}, error: no service to run unit command on", cmd);
                if let ControlFlow::Break(message) = self.on_failure(name, policy, detail) {
                    return HookOutcome::Aborted { message };
                }
                failures += 1;
                continue;
            };

            info!(
                parent: &self.span,
                "Running {} hook on units of {}: '{}'", name, service, cmd
            );

            let units = match self.runner.run_on_units(service, cmd).await {
                Ok(units) => units,
                Err(e) => {
                    let detail = format!("cmd: {}, error: {}", cmd, e);
                    if let ControlFlow::Break(message) = self.on_failure(name, policy, detail) {
                        return HookOutcome::Aborted { message };
                    }
                    failures += 1;
                    continue;
                }
            };

            for unit in &units {
                info!(
                    parent: &self.span,
                    "Running hook: {} on remote unit: {}", name, unit.unit_id
                );
                let Some(err) = unit.error() else {
                    debug!(
                        parent: &self.span,
                        "Unit {} output: {}", unit.unit_id, unit.stdout.trim()
                    );
                    continue;
                };

                let detail = format!("cmd: {}, error: {}, unit: {}", cmd, err, unit.unit_id);
                if let ControlFlow::Break(message) = self.on_failure(name, policy, detail) {
                    return HookOutcome::Aborted { message };
                }
                failures += 1;
            }
        }

        HookOutcome::Completed { failures }
    }

    /// Apply `policy` to a failed command: break with the abort message or
    /// continue after logging.
    fn on_failure(
        &self,
        name: HookName,
        policy: FailurePolicy,
        detail: String,
    ) -> ControlFlow<String> {
        match policy {
            FailurePolicy::Abort => {
                let message = format!(
                    "failure set to abort: error executing hook: {}, {}",
                    name, detail
                );
                warn!(parent: &self.span, "{}", message);
                ControlFlow::Break(message)
            }
            FailurePolicy::Continue => {
                warn!(
                    parent: &self.span,
                    "Hook {} failed, but failure mode has been set to continue, {}", name, detail
                );
                ControlFlow::Continue(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juju::runner::testing::{RecordingRunner, unit};
    use crate::plan::{HookCommands, HookSpec, ServiceUpgradeSpec, UpgradePlan};
    use std::sync::{Arc, Mutex};

    fn hook(local: &[&str], unit: &[&str], failure: FailurePolicy) -> HookSpec {
        HookSpec {
            run: Some(HookCommands {
                local: local.iter().map(|s| s.to_string()).collect(),
                unit: unit.iter().map(|s| s.to_string()).collect(),
            }),
            failure,
        }
    }

    fn service_with_pre(h: HookSpec) -> ServiceUpgradeSpec {
        ServiceUpgradeSpec {
            pre_upgrade: Some(h),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_hook_is_not_found() {
        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &UpgradePlan::default(), None)
            .await;

        assert_eq!(outcome, HookOutcome::NotFound);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_hook_name_is_not_found() {
        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&["echo pre"], &[], FailurePolicy::Abort));

        let outcome = engine
            .run_hook(HookName::PostUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::NotFound);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_hook_without_run_block_completes() {
        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(HookSpec::default());

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 0 });
    }

    #[tokio::test]
    async fn test_abort_stops_at_first_failing_local_command() {
        let runner = RecordingRunner::new().fail_on("local: second");
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(
            &["first", "second", "third"],
            &["never"],
            FailurePolicy::Abort,
        ));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        match outcome {
            HookOutcome::Aborted { message } => {
                assert!(message.contains("pre-upgrade"));
                assert!(message.contains("cmd: second"));
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(runner.calls(), vec!["local: first", "local: second"]);
    }

    #[tokio::test]
    async fn test_continue_attempts_every_local_command() {
        let runner = RecordingRunner::new()
            .fail_on("local: first")
            .fail_on("local: second");
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(
            &["first", "second", "third"],
            &[],
            FailurePolicy::Continue,
        ));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 2 });
        assert_eq!(
            runner.calls(),
            vec!["local: first", "local: second", "local: third"]
        );
    }

    #[tokio::test]
    async fn test_local_commands_run_before_unit_commands() {
        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&["l1", "l2"], &["u1", "u2"], FailurePolicy::Abort));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 0 });
        assert_eq!(
            runner.calls(),
            vec!["local: l1", "local: l2", "unit[mysql]: u1", "unit[mysql]: u2"]
        );
    }

    #[tokio::test]
    async fn test_unit_transport_failure_aborts() {
        let runner = RecordingRunner::new().fail_on("unit[mysql]: u1");
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&[], &["u1", "u2"], FailurePolicy::Abort));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert!(matches!(outcome, HookOutcome::Aborted { .. }));
        assert_eq!(runner.calls(), vec!["unit[mysql]: u1"]);
    }

    #[tokio::test]
    async fn test_unit_transport_failure_continues() {
        let runner = RecordingRunner::new().fail_on("unit[mysql]: u1");
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&[], &["u1", "u2"], FailurePolicy::Continue));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 1 });
        assert_eq!(runner.calls(), vec!["unit[mysql]: u1", "unit[mysql]: u2"]);
    }

    #[tokio::test]
    async fn test_failing_unit_aborts_and_names_unit() {
        let runner = RecordingRunner::new().with_unit_results(
            "stop",
            vec![
                unit("mysql/0", None),
                unit("mysql/1", Some("service not running")),
                unit("mysql/2", Some("also broken")),
            ],
        );
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&[], &["stop", "after"], FailurePolicy::Abort));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        match outcome {
            HookOutcome::Aborted { message } => {
                assert!(message.contains("unit: mysql/1"));
                assert!(message.contains("service not running"));
                assert!(!message.contains("mysql/2"));
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(runner.calls(), vec!["unit[mysql]: stop"]);
    }

    #[tokio::test]
    async fn test_failing_units_counted_under_continue() {
        let runner = RecordingRunner::new().with_unit_results(
            "stop",
            vec![
                unit("mysql/0", Some("broken")),
                unit("mysql/1", None),
                unit("mysql/2", Some("broken")),
            ],
        );
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(hook(&[], &["stop", "after"], FailurePolicy::Continue));

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 2 });
        assert_eq!(
            runner.calls(),
            vec!["unit[mysql]: stop", "unit[mysql]: after"]
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_found_hook_is_logged_even_without_commands() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());
        let scope = service_with_pre(HookSpec::default());

        let outcome = engine
            .run_hook(HookName::PreUpgrade, &scope, Some("mysql"))
            .await;

        assert_eq!(outcome, HookOutcome::Completed { failures: 0 });
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Running pre-upgrade hook"));
    }

    #[tokio::test]
    async fn test_unit_command_without_service_follows_policy() {
        let runner = RecordingRunner::new();
        let engine = HookEngine::new(&runner, Span::none());

        let scope = service_with_pre(hook(&[], &["hostname"], FailurePolicy::Abort));
        let outcome = engine.run_hook(HookName::PreUpgrade, &scope, None).await;
        assert!(matches!(outcome, HookOutcome::Aborted { .. }));

        let scope = service_with_pre(hook(&[], &["hostname"], FailurePolicy::Continue));
        let outcome = engine.run_hook(HookName::PreUpgrade, &scope, None).await;
        assert_eq!(outcome, HookOutcome::Completed { failures: 1 });

        assert!(runner.calls().is_empty());
    }
}
