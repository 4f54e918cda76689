//! CLI-specific error types and exit code mapping

use logroute_core::error::LogRouteError;
use logroute_router::RouterError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Rule loading or validation failure.
    #[error("rule error: {0}")]
    Rule(String),

    /// At least one destination batch could not be delivered.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from logroute-core.
    #[error("{0}")]
    Core(#[from] LogRouteError),

    /// Wrapped routing engine error.
    #[error("{0}")]
    Router(#[from] RouterError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command / rule error   |
    /// | 2    | Configuration error              |
    /// | 3    | Some deliveries failed           |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(LogRouteError::Config(_)) => 2,
            Self::Router(RouterError::Config { .. }) => 2,
            Self::Delivery(_) => 3,
            Self::Io(_) | Self::Core(LogRouteError::Io(_)) => 10,
            Self::Command(_)
            | Self::Rule(_)
            | Self::JsonSerialize(_)
            | Self::Core(_)
            | Self::Router(_) => 1,
        }
    }
}
