//! `logroute rules` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use logroute_router::rule::RejectedRule;
use logroute_router::{BuiltinOptions, LoadReport, RuleLoader, TransformerRegistry};

use super::{load_config, rules_path};
use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    match args.action {
        RulesAction::List { path } => execute_list(&rules_path(path, &config), writer).await,
        RulesAction::Validate { path } => {
            execute_validate(&rules_path(path, &config), writer).await
        }
    }
}

async fn execute_list(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %path.display(), "loading routing rules");
    let report = RuleLoader::load_path(path).await?;
    writer.render(&RuleListReport::from_load(&report))?;
    Ok(())
}

async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %path.display(), "validating routing rules");

    let report = match RuleLoader::load_path(path).await {
        Ok(load) => RuleValidationReport::from_load(path.to_path_buf(), &load),
        Err(e) => RuleValidationReport {
            path: path.display().to_string(),
            valid: 0,
            invalid: 1,
            errors: vec![RuleError {
                index: None,
                name: None,
                error: e.to_string(),
            }],
            warnings: Vec::new(),
        },
    };

    writer.render(&report)?;

    if report.invalid > 0 {
        return Err(CliError::Rule(format!("{} invalid rules", report.invalid)));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub name: String,
    pub priority: i64,
    pub enabled: bool,
    pub destination: String,
    pub conditions: usize,
    pub transformations: Vec<String>,
}

impl RuleListReport {
    /// Build the listing in evaluation order.
    pub fn from_load(load: &LoadReport) -> Self {
        let rules: Vec<RuleEntry> = load
            .rule_set
            .rules()
            .iter()
            .map(|compiled| {
                let rule = compiled.rule();
                RuleEntry {
                    name: rule.name.clone(),
                    priority: rule.priority,
                    enabled: rule.enabled,
                    destination: rule.destination_id().to_owned(),
                    conditions: rule.conditions.len(),
                    transformations: rule.transformations.iter().map(|t| t.kind.clone()).collect(),
                }
            })
            .collect();
        Self {
            total: rules.len(),
            rules,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Routing Rules ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<25} {:>8} {:<9} {:<20} {:>5}  Transformations",
            "Name", "Priority", "Status", "Destination", "Conds"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for r in &self.rules {
            let status = if r.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            writeln!(
                w,
                "{:<25} {:>8} {:<9} {:<20} {:>5}  {}",
                r.name,
                r.priority,
                status,
                r.destination,
                r.conditions,
                r.transformations.join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleError>,
    /// Transformation types no built-in handles; those steps are skipped at runtime.
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RuleError {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub error: String,
}

impl From<&RejectedRule> for RuleError {
    fn from(r: &RejectedRule) -> Self {
        Self {
            index: Some(r.index),
            name: r.name.clone(),
            error: r.reason.clone(),
        }
    }
}

impl RuleValidationReport {
    /// Summarize a load result, flagging unknown transformation types.
    pub fn from_load(path: PathBuf, load: &LoadReport) -> Self {
        let registry = TransformerRegistry::with_builtins(BuiltinOptions::default());
        let mut warnings = Vec::new();
        for compiled in load.rule_set.rules() {
            for step in &compiled.rule().transformations {
                if !registry.contains(&step.kind) {
                    warnings.push(format!(
                        "rule '{}': unknown transformation type '{}'",
                        compiled.name(),
                        step.kind
                    ));
                }
            }
        }

        Self {
            path: path.display().to_string(),
            valid: load.rule_set.len(),
            invalid: load.rejected.len(),
            errors: load.rejected.iter().map(RuleError::from).collect(),
            warnings,
        }
    }
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Rules: {} valid, {} invalid",
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;

        for e in &self.errors {
            let location = match (&e.name, e.index) {
                (Some(name), Some(index)) => format!("#{index} '{name}'"),
                (None, Some(index)) => format!("#{index}"),
                (Some(name), None) => format!("'{name}'"),
                (None, None) => self.path.clone(),
            };
            writeln!(w, "  {} {}: {}", "error".red(), location, e.error)?;
        }
        for warning in &self.warnings {
            writeln!(w, "  {} {}", "warning".yellow(), warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load() -> LoadReport {
        RuleLoader::load(vec![
            json!({
                "name": "late",
                "priority": 20,
                "destination": {"type": "archive"},
                "transformations": [{"type": "mystery"}]
            }),
            json!({
                "name": "early",
                "priority": 1,
                "conditions": [{"field": "level", "operator": "equals", "value": "error"}],
                "transformations": [{"type": "mask", "field": "card", "pattern": "\\d"}],
                "destination": {"type": "siem"}
            }),
            json!({"priority": 3, "destination": {"type": "x"}}),
        ])
    }

    #[test]
    fn list_is_in_evaluation_order() {
        let report = RuleListReport::from_load(&load());
        assert_eq!(report.total, 2);
        assert_eq!(report.rules[0].name, "early");
        assert_eq!(report.rules[0].conditions, 1);
        assert_eq!(report.rules[0].transformations, vec!["mask"]);
        assert_eq!(report.rules[1].destination, "archive");
    }

    #[test]
    fn validation_counts_rejected_and_unknown_transforms() {
        let report = RuleValidationReport::from_load(PathBuf::from("rules.yaml"), &load());
        assert_eq!(report.valid, 2);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.errors[0].index, Some(2));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("mystery"));
    }

    #[test]
    fn validation_text_mentions_errors() {
        let report = RuleValidationReport::from_load(PathBuf::from("rules.yaml"), &load());
        let mut buf = Vec::new();
        report.render_text(&mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("rules.yaml"));
        assert!(text.contains("#2"));
        assert!(text.contains("mystery"));
    }
}
