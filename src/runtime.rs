//! Runtime glue that wires configs, hooks, offset tracking, telemetry, and
//! runner orchestration.

pub mod config;
pub mod fatal;
pub mod hooks;
pub mod offset;
pub mod runner;
pub mod sink;
pub mod telemetry;
