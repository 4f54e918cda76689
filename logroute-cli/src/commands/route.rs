//! `logroute route` command handler
//!
//! Reads an NDJSON file, routes it through the engine in fixed-size batches
//! and spools every destination batch to a local file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use logroute_core::config::LogRouteConfig;
use logroute_core::record::Record;
use logroute_router::{
    BatchOutcome, GeoIpTable, MetricsReport, RouterConfig, RoutingEngine, RuleLoader, StaticKey,
};

use super::{load_config, rules_path};
use crate::cli::RouteArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::spool::{NdjsonFileSink, STDOUT_DESTINATION, StdoutSink};

/// Execute the `route` command.
pub async fn execute(
    args: RouteArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let report = run(&config, args).await?;
    writer.render(&report)?;

    if report.failed > 0 {
        return Err(CliError::Delivery(format!(
            "{} records could not be delivered",
            report.failed
        )));
    }
    Ok(())
}

/// Route the input file and return the summary without rendering it.
pub async fn run(config: &LogRouteConfig, args: RouteArgs) -> Result<RouteReport, CliError> {
    if args.batch_size == 0 {
        return Err(CliError::Command("--batch-size must be greater than 0".to_owned()));
    }

    let rules_path = rules_path(args.rules, config);
    let load = RuleLoader::load_path(&rules_path).await?;
    if !load.rejected.is_empty() {
        warn!(
            path = %rules_path.display(),
            rejected = load.rejected.len(),
            "some rules were rejected, routing with the remaining rules"
        );
    }

    tokio::fs::create_dir_all(&args.out_dir).await?;

    let mut builder = RoutingEngine::builder()
        .config(RouterConfig::from_core(config))
        .rules(load.rule_set.clone());

    for destination in load.rule_set.destinations() {
        if destination == STDOUT_DESTINATION {
            builder = builder.sink(&destination, StdoutSink);
            continue;
        }
        match NdjsonFileSink::new(&args.out_dir, &destination) {
            Ok(sink) => builder = builder.sink(&destination, sink),
            Err(e) => warn!(destination = %destination, error = %e, "no spool sink for destination"),
        }
    }

    if let Some(geoip_path) = &args.geoip {
        let content = tokio::fs::read_to_string(geoip_path).await?;
        let table = GeoIpTable::from_json(&content)?;
        info!(path = %geoip_path.display(), entries = table.len(), "loaded GeoIP table");
        builder = builder.geoip(Arc::new(table));
    }

    if let Some(key) = StaticKey::from_env(&config.enrichment.encryption_key_env)? {
        builder = builder.key_provider(Arc::new(key));
    }

    let engine = builder.build()?;

    let mut totals = RouteReport::new(&args.input, &args.out_dir);
    let file = tokio::fs::File::open(&args.input).await?;
    let mut lines = BufReader::new(file).lines();
    let mut batch = Vec::with_capacity(args.batch_size);
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(&line) {
            Some(record) => batch.push(record),
            None => {
                warn!(line = line_no, "skipping line that is not a JSON object");
                totals.invalid_lines += 1;
                continue;
            }
        }
        if batch.len() >= args.batch_size {
            let outcome = engine.route_batch(std::mem::take(&mut batch)).await;
            totals.absorb(&outcome);
        }
    }
    if !batch.is_empty() {
        let outcome = engine.route_batch(batch).await;
        totals.absorb(&outcome);
    }

    totals.metrics = Some(engine.report());
    info!(
        records = totals.records,
        delivered = totals.delivered,
        failed = totals.failed,
        unmatched = totals.unmatched,
        dropped = totals.dropped,
        "routing finished"
    );
    Ok(totals)
}

fn parse_record(line: &str) -> Option<Record> {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RouteReport {
    pub input: String,
    pub out_dir: String,
    pub batches: usize,
    pub timed_out_batches: usize,
    pub records: usize,
    pub invalid_lines: usize,
    pub delivered: usize,
    pub failed: usize,
    pub unmatched: usize,
    pub dropped: usize,
    pub destinations: BTreeMap<String, DestinationTotals>,
    pub metrics: Option<MetricsReport>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DestinationTotals {
    pub delivered: usize,
    pub failed: usize,
    pub retries: u32,
    pub last_error: Option<String>,
}

impl RouteReport {
    fn new(input: &Path, out_dir: &Path) -> Self {
        Self {
            input: input.display().to_string(),
            out_dir: out_dir.display().to_string(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        if outcome.timed_out {
            self.timed_out_batches += 1;
        }
        self.records += outcome.received;
        self.unmatched += outcome.unmatched;
        self.dropped += outcome.dropped;
        self.delivered += outcome.delivered_count();
        self.failed += outcome.failed_count();

        for delivery in &outcome.dispatch.outcomes {
            let entry = self
                .destinations
                .entry(delivery.destination.clone())
                .or_default();
            entry.retries += delivery.retries();
            if delivery.is_delivered() {
                entry.delivered += delivery.records.len();
            } else {
                entry.failed += delivery.records.len();
                entry.last_error = delivery.last_error.clone();
            }
        }
    }
}

impl Render for RouteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Routed {} -> {}", self.input.bold(), self.out_dir.bold())?;
        writeln!(
            w,
            "  Records: {} read, {} delivered, {} failed, {} unmatched, {} dropped",
            self.records,
            self.delivered.to_string().green(),
            if self.failed > 0 {
                self.failed.to_string().red()
            } else {
                self.failed.to_string().normal()
            },
            self.unmatched,
            self.dropped
        )?;
        writeln!(
            w,
            "  Batches: {} ({} timed out), invalid lines: {}",
            self.batches, self.timed_out_batches, self.invalid_lines
        )?;

        if !self.destinations.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{:<24} {:>10} {:>8} {:>8}  Last error",
                "Destination", "Delivered", "Failed", "Retries"
            )?;
            writeln!(w, "{}", "-".repeat(70))?;
            for (name, d) in &self.destinations {
                writeln!(
                    w,
                    "{:<24} {:>10} {:>8} {:>8}  {}",
                    name,
                    d.delivered,
                    d.failed,
                    d.retries,
                    d.last_error.as_deref().unwrap_or("-")
                )?;
            }
        }

        if let Some(metrics) = &self.metrics {
            writeln!(w)?;
            render_metrics(metrics, w)?;
        }
        Ok(())
    }
}

fn render_metrics(report: &MetricsReport, w: &mut dyn Write) -> std::io::Result<()> {
    use colored::Colorize;
    use logroute_router::Anomaly;

    let s = &report.summary;
    writeln!(w, "Metrics (last {}s)", report.window_secs)?;
    writeln!(
        w,
        "  {} events, success rate {:.1}%, avg {:.3} ms, p95 {:.3} ms",
        s.total,
        s.success_rate,
        s.avg_processing_time * 1000.0,
        s.p95_processing_time * 1000.0
    )?;
    for (rule, summary) in &report.rules {
        writeln!(
            w,
            "  rule {:<22} {:>7} events {:>6.1}%",
            rule, summary.total, summary.success_rate
        )?;
    }
    for (destination, latency) in &report.delivery_latency {
        writeln!(
            w,
            "  delivery {:<18} avg {:.3} ms, p95 {:.3} ms ({} samples)",
            destination,
            latency.avg * 1000.0,
            latency.p95 * 1000.0,
            latency.samples
        )?;
    }
    for anomaly in &report.anomalies {
        let line = match anomaly {
            Anomaly::HighProcessingTime {
                rule_name,
                value,
                threshold,
                ..
            } => format!(
                "rule '{rule_name}' processing time {:.3} ms above {:.3} ms",
                value * 1000.0,
                threshold * 1000.0
            ),
            Anomaly::LowSuccessRate {
                rule_name,
                value,
                threshold,
            } => format!("rule '{rule_name}' success rate {value:.1}% below {threshold:.1}%"),
        };
        writeln!(w, "  {} {}", "anomaly".yellow(), line)?;
    }
    Ok(())
}
