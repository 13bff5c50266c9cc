//! Plan review and execution summary output.

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::plan::{HookName, HookScope, HookSpec, ServiceUpgradeSpec, UpgradePlan};
use crate::upgrade::executor::{ExecutionSummary, PlatformStatus, ServiceStatus};

/// Print the upgrade plan to console.
pub fn print_upgrade_plan(plan: &UpgradePlan, source: &str) {
    println!();
    println!("{}", format!("Upgrade Plan: {}", source).bold());
    println!("{}", "=".repeat(60));

    print_plan_hook(plan.pre_upgrade.as_ref(), HookName::PreUpgrade);

    match plan.juju_core.as_ref().filter(|c| c.upgrade) {
        Some(core) => {
            println!("{}", "juju-core Upgrade".cyan().bold());
            println!(
                "  version: {} (failure: {})",
                core.version, core.failure
            );
        }
        None => println!("{}", "juju-core Upgrade [SKIPPED]".cyan().bold()),
    }

    if plan.steps.is_empty() {
        println!();
        println!("{}", "No upgrade steps defined".yellow());
    }

    for (step, services) in &plan.steps {
        println!();
        println!("{}", format!("Step {}", step).cyan().bold());
        for (name, spec) in services {
            println!("  {}", describe_service(name, spec));
        }
    }

    println!();
    print_plan_hook(plan.post_upgrade.as_ref(), HookName::PostUpgrade);
    println!(
        "Total: {} step(s), {} service(s)",
        plan.steps.len(),
        plan.service_count()
    );
    println!();
}

fn print_plan_hook(hook: Option<&HookSpec>, name: HookName) {
    if let Some(hook) = hook {
        println!(
            "{} {} command(s) (failure: {})",
            format!("Hook {}:", name).dimmed(),
            hook.command_count(),
            hook.failure
        );
    }
}

/// One-line description of a service entry.
fn describe_service(name: &str, spec: &ServiceUpgradeSpec) -> String {
    let Some(revision) = &spec.charm_store_revision else {
        return format!(
            "{}: {}",
            name.dimmed(),
            "[SKIPPED] no charm-store-revision".dimmed()
        );
    };

    let mut line = format!("{}: revision {}", name, revision);
    if spec.force {
        line.push_str(" --force");
    }
    line.push_str(&format!(" (failure: {})", spec.failure));

    let hooks: Vec<String> = [HookName::PreUpgrade, HookName::PostUpgrade]
        .into_iter()
        .filter_map(|n| {
            spec.hook(n)
                .map(|h| format!("{}: {} cmd", n, h.command_count()))
        })
        .collect();
    if !hooks.is_empty() {
        line.push_str(&format!(" [{}]", hooks.join(", ")));
    }

    line
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "STEP")]
    step: u32,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

/// Print the final summary of an executed plan.
pub fn print_execution_summary(summary: &ExecutionSummary) {
    println!();
    println!("{}", "=".repeat(60));

    let platform = match summary.platform {
        PlatformStatus::NotRequested => "not requested".dimmed(),
        PlatformStatus::Upgraded => "upgraded".green(),
        PlatformStatus::FailedContinued => "failed (continued)".yellow(),
    };
    println!("juju-core: {}", platform);

    if !summary.services.is_empty() {
        let rows: Vec<ServiceRow> = summary
            .services
            .iter()
            .map(|r| ServiceRow {
                step: r.step,
                service: r.service.clone(),
                status: r.status.as_str().to_string(),
            })
            .collect();
        println!("{}", Table::new(&rows).with(Style::sharp()));
    }

    if summary.hook_failures > 0 {
        println!(
            "{} {} hook command(s) failed under continue policy",
            "⚠".yellow(),
            summary.hook_failures
        );
    }

    let failed = summary.count(ServiceStatus::FailedContinued);
    let message = format!(
        "Upgrade plan complete: {} upgraded, {} failed, {} skipped",
        summary.count(ServiceStatus::Upgraded),
        failed,
        summary.count(ServiceStatus::Skipped)
    );
    if failed > 0 || summary.platform == PlatformStatus::FailedContinued {
        println!("{}", message.yellow().bold());
    } else {
        println!("{}", message.green().bold());
    }
    println!("{}", "=".repeat(60));
}
