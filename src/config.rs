//! CLI configuration and argument parsing.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Juju upgrade plan orchestrator.
///
/// Upgrades juju-core and then the charms of each service, step by step,
/// as described in a YAML upgrade plan, running pre/post upgrade hooks
/// around each unit of work.
#[derive(Parser, Debug, Clone)]
#[command(name = "jup")]
#[command(about = "Juju upgrade plan orchestrator CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Path to the upgrade plan (YAML)
    #[arg(value_name = "PLAN")]
    pub plan: PathBuf,

    /// Juju environment to operate on (defaults to the client's current one)
    #[arg(short, long, env = "JUJU_ENV")]
    pub environment: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long, default_value = "false")]
    pub yes: bool,

    /// Show the plan and the commands it would run without executing them
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Kill any single command that runs longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub command_timeout: Option<u64>,

    /// Juju client executable
    #[arg(long, default_value = "juju", env = "JUJU_BIN")]
    pub juju_bin: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "JUP_LOG_LEVEL")]
    pub log_level: String,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub plan_path: PathBuf,
    pub environment: Option<String>,
    pub yes: bool,
    pub dry_run: bool,
    pub command_timeout: Option<Duration>,
    pub juju_bin: String,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        let environment = args
            .environment
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Self {
            plan_path: args.plan,
            environment,
            yes: args.yes,
            dry_run: args.dry_run,
            command_timeout: args
                .command_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            juju_bin: args.juju_bin,
            log_level: args.log_level,
        }
    }

    /// Whether to ask before touching the environment.
    pub fn needs_confirmation(&self) -> bool {
        !self.yes && !self.dry_run
    }
}
