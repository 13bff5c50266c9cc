//! Custom error types for jup.

use thiserror::Error;

/// Errors that can occur while executing a Juju upgrade plan.
#[derive(Error, Debug)]
pub enum JupError {
    #[error("Hook {hook} aborted: {message}")]
    HookAbort { hook: String, message: String },

    #[error("Error upgrading juju-core: {0}")]
    PlatformUpgrade(String),

    #[error("Cannot upgrade service {service}: {message}")]
    ServiceUpgrade { service: String, message: String },

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Invalid upgrade plan: {0}")]
    InvalidPlan(String),

    #[error("Command '{command}' failed: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Timeout waiting for '{command}' after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Operation cancelled by user")]
    UserCancelled,
}

impl JupError {
    /// Returns true for errors that stop the whole plan.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JupError::HookAbort { .. }
                | JupError::PlatformUpgrade(_)
                | JupError::ServiceUpgrade { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_hook_abort() {
        let err = JupError::HookAbort {
            hook: "pre-upgrade".to_string(),
            message: "cmd: false, error: exit status 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Hook pre-upgrade aborted: cmd: false, error: exit status 1"
        );
    }

    #[test]
    fn test_error_display_platform_upgrade() {
        let err = JupError::PlatformUpgrade("exit status 2".to_string());
        assert_eq!(err.to_string(), "Error upgrading juju-core: exit status 2");
    }

    #[test]
    fn test_error_display_service_upgrade() {
        let err = JupError::ServiceUpgrade {
            service: "mysql".to_string(),
            message: "charm not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot upgrade service mysql: charm not found"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = JupError::Timeout {
            command: "juju upgrade-juju --yes".to_string(),
            seconds: 30,
        };
        assert_eq!(
            err.to_string(),
            "Timeout waiting for 'juju upgrade-juju --yes' after 30s"
        );
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(JupError::PlatformUpgrade("x".to_string()).is_fatal());
        assert!(
            JupError::HookAbort {
                hook: "post-upgrade".to_string(),
                message: "x".to_string()
            }
            .is_fatal()
        );
        assert!(!JupError::UserCancelled.is_fatal());
        assert!(!JupError::InvalidVersion("x".to_string()).is_fatal());
    }
}
