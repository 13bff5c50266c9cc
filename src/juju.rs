//! Juju client operations module.

pub mod commands;
pub mod runner;
pub mod version;
