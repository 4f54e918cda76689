//! `logroute config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use logroute_core::config::LogRouteConfig;

use super::{config_source, load_config};
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
pub const SECTIONS: &[&str] = &["general", "router", "dispatch", "metrics", "enrichment"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

async fn execute_validate(config_path: Option<&Path>, writer: &OutputWriter) -> Result<(), CliError> {
    let source = config_source(config_path);
    info!(source = %source, "validating configuration");

    let report = match load_config(config_path).await {
        Ok(_) => ConfigValidationReport {
            source,
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn execute_show(
    config_path: Option<&Path>,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let report = ConfigReport {
        source: config_source(config_path),
        config_toml: render_section(&config, section.as_deref())?,
        section,
    };
    writer.render(&report)?;
    Ok(())
}

/// Serialize the whole configuration or one section as TOML.
pub fn render_section(config: &LogRouteConfig, section: Option<&str>) -> Result<String, CliError> {
    let rendered = match section {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("router") => toml::to_string_pretty(&config.router),
        Some("dispatch") => toml::to_string_pretty(&config.dispatch),
        Some("metrics") => toml::to_string_pretty(&config.metrics),
        Some("enrichment") => toml::to_string_pretty(&config.enrichment),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };
    rendered.map_err(|e| CliError::Command(format!("failed to serialize configuration: {e}")))
}

#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.valid {
            writeln!(w, "{} {}", "valid".green().bold(), self.source)?;
        } else {
            writeln!(w, "{} {}", "invalid".red().bold(), self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {}", error)?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    pub section: Option<String>,
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(w, "# {} [{}]", self.source.bold(), section)?,
            None => writeln!(w, "# {}", self.source.bold())?,
        }
        write!(w, "{}", self.config_toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_full_config_contains_all_sections() {
        let config = LogRouteConfig::default();
        let rendered = render_section(&config, None).expect("render");
        for section in SECTIONS {
            assert!(
                rendered.contains(&format!("[{section}]")),
                "missing section {section}"
            );
        }
    }

    #[test]
    fn render_single_section() {
        let config = LogRouteConfig::default();
        let rendered = render_section(&config, Some("dispatch")).expect("render");
        assert!(rendered.contains("max_retries"));
        assert!(!rendered.contains("log_level"));
    }

    #[test]
    fn render_unknown_section_fails() {
        let config = LogRouteConfig::default();
        let err = render_section(&config, Some("storage")).expect_err("unknown section");
        assert!(err.to_string().contains("unknown section"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn text_render_lists_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["max_in_flight must be greater than 0".to_owned()],
        };
        let mut buf = Vec::new();
        report.render_text(&mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("bad.toml"));
        assert!(text.contains("max_in_flight"));
    }
}
