//! Command handlers -- one module per subcommand

pub mod config;
pub mod route;
pub mod rules;

use std::path::{Path, PathBuf};

use logroute_core::config::LogRouteConfig;

use crate::error::CliError;

/// Load the effective configuration.
///
/// With a path, the file is read and env overrides applied on top.
/// Without one, defaults plus env overrides are used.
pub async fn load_config(path: Option<&Path>) -> Result<LogRouteConfig, CliError> {
    let config = match path {
        Some(path) => LogRouteConfig::load(path).await?,
        None => {
            let mut config = LogRouteConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

/// Rule location: explicit argument first, then `router.rules_path`.
pub(crate) fn rules_path(explicit: Option<PathBuf>, config: &LogRouteConfig) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(&config.router.rules_path))
}

/// Human-readable description of the configuration source.
pub(crate) fn config_source(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_owned())
}
