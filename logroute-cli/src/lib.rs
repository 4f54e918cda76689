//! logroute command-line driver.
//!
//! The binary in `main.rs` is a thin wrapper; everything it dispatches to
//! lives here so integration tests can drive the same handlers.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod spool;
