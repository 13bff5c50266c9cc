//! Upgrade plan execution module.

pub mod executor;
pub mod hooks;
