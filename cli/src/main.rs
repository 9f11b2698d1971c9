//! Command-line driver for `captriage-core`.
//!
//! Analogous to the teacher's `examples/basic_file`/`examples/log_conn`
//! binaries: parses a handful of flags with `clap`, initializes
//! `env_logger`, drives the core library against a capture file, and
//! prints the result either as JSON (for collaborators) or as a
//! `prettytable-rs` summary (for a human at a terminal).

use std::path::PathBuf;

use anyhow::{Context, Result};
use captriage_core::config::{self, AnalysisConfig};
use captriage_core::orchestrator::{self, ProgressSink};
use captriage_core::triage::{self, RuleSet};
use captriage_core::utils::CancellationToken;
use captriage_core::ResultBundle;
use clap::Parser;
use colored::*;
use log::info;
use prettytable::{format, Cell, Row, Table};

#[derive(Parser, Debug)]
#[clap(name = "captriage", about = "Offline PCAP/PCAP-NG conversation triage")]
struct Args {
    /// Path to the capture file (PCAP or PCAP-NG).
    capture: PathBuf,

    /// Optional TOML config file; overrides capture/cache/evidence defaults.
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Optional directory of rule YAML files, overriding the embedded rule set.
    #[clap(long, value_name = "DIR")]
    rules: Option<PathBuf>,

    /// Emit the full result bundle as JSON instead of a summary table.
    #[clap(long)]
    json: bool,

    /// Packet-stream filter query (space-separated `key:value` tokens, spec §4.8);
    /// when given, prints a page of annotated packets instead of the summary.
    #[clap(long, value_name = "QUERY")]
    packets: Option<String>,

    /// Packet-stream page offset.
    #[clap(long, default_value_t = 0)]
    offset: u64,

    /// Packet-stream page size.
    #[clap(long, default_value_t = 50)]
    limit: u64,

    /// Print the capture-wide packets/bytes-per-second series as JSON
    /// instead of the summary (supplementary output).
    #[clap(long)]
    timeseries: bool,

    /// Print the per-direction byte series for one TCP stream id as JSON.
    #[clap(long, value_name = "STREAM_ID")]
    stream_timeseries: Option<u32>,
}

/// Logs progress at `info` every crossed threshold, mirroring the
/// teacher's `lcore::monitor` periodic stats reporting.
struct LoggingProgressSink {
    capture: String,
}

impl ProgressSink for LoggingProgressSink {
    fn on_progress(&mut self, fraction_complete: f64) {
        info!("{}: {:.0}% analyzed", self.capture, fraction_complete * 100.0);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path).context("loading config file")?,
        None => config::default_config(args.capture.clone()),
    };
    config.capture = args.capture.clone();
    if let Some(rules_dir) = &args.rules {
        config.rules_path = Some(rules_dir.clone());
    }

    let rules = load_rules(&config)?;
    let cancel = CancellationToken::new();
    let mut progress = LoggingProgressSink {
        capture: args.capture.display().to_string(),
    };

    let bundle = orchestrator::analyze(&config, &rules, &mut progress, &cancel)
        .context("analyzing capture")?;

    if args.timeseries {
        let ts = orchestrator::capture_timeseries(&config.capture, &cancel).context("building timeseries")?;
        println!("{}", serde_json::to_string_pretty(&ts)?);
        return Ok(());
    }

    if let Some(stream_id) = args.stream_timeseries {
        let ts = orchestrator::stream_timeseries(&config.capture, &bundle.flows, stream_id, &cancel)
            .context("building stream timeseries")?;
        println!("{}", serde_json::to_string_pretty(&ts)?);
        return Ok(());
    }

    if let Some(query) = &args.packets {
        let page = orchestrator::stream_packets(
            &config.capture,
            &bundle.flows,
            query,
            args.offset,
            args.limit,
            config.seen_segment_cache.capacity,
            config.seen_segment_cache.ttl_ms * 1000,
            &cancel,
        )
        .context("streaming packets")?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&page)?);
        } else {
            print_packet_table(&page);
        }
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    } else {
        print_summary(&bundle);
    }

    Ok(())
}

fn load_rules(config: &AnalysisConfig) -> Result<RuleSet> {
    match &config.rules_path {
        Some(dir) => triage::load_rules_from_dir(dir).context("loading rule overrides"),
        None => triage::load_embedded_rules().context("loading embedded rules"),
    }
}

fn print_summary(bundle: &ResultBundle) {
    println!(
        "{} {} flows, {} findings, {} rule warnings",
        "captriage:".bold(),
        bundle.flows.len(),
        bundle.findings.len(),
        bundle.rule_warnings.len()
    );

    if !bundle.findings.is_empty() {
        println!("\n{}", "Findings".bold());
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP);
        table.add_row(Row::new(vec![
            Cell::new("severity"),
            Cell::new("issue"),
            Cell::new("flow"),
            Cell::new("summary"),
        ]));
        for finding in &bundle.findings {
            let severity_cell = if finding.severity >= 4 {
                Cell::new(&finding.severity.to_string()).style_spec("Fr")
            } else {
                Cell::new(&finding.severity.to_string())
            };
            table.add_row(Row::new(vec![
                severity_cell,
                Cell::new(&finding.issue_type),
                Cell::new(&finding.flow_key.to_string()),
                Cell::new(&finding.summary),
            ]));
        }
        table.printstd();
    }

    println!("\n{}", "Top talkers".bold());
    let mut talkers = Table::new();
    talkers.set_format(*format::consts::FORMAT_NO_LINESEP);
    for entry in &bundle.stats.top_talkers {
        talkers.add_row(Row::new(vec![Cell::new(&entry.label), Cell::new(&entry.bytes.to_string())]));
    }
    talkers.printstd();

    println!("\n{}", "Top flows".bold());
    let mut flows = Table::new();
    flows.set_format(*format::consts::FORMAT_NO_LINESEP);
    for entry in &bundle.stats.top_flows {
        flows.add_row(Row::new(vec![Cell::new(&entry.label), Cell::new(&entry.bytes.to_string())]));
    }
    flows.printstd();

    println!(
        "\n{} p50={:?}ms p95={:?}ms p99={:?}ms",
        "RTT quantiles:".bold(),
        bundle.stats.rtt_quantiles.p50,
        bundle.stats.rtt_quantiles.p95,
        bundle.stats.rtt_quantiles.p99
    );
}

fn print_packet_table(page: &captriage_core::bundle::PacketPage) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP);
    table.add_row(Row::new(vec![
        Cell::new("#"),
        Cell::new("ts"),
        Cell::new("src"),
        Cell::new("dst"),
        Cell::new("info"),
        Cell::new("errors"),
    ]));
    for packet in &page.packets {
        table.add_row(Row::new(vec![
            Cell::new(&packet.index.to_string()),
            Cell::new(&packet.timestamp),
            Cell::new(&format!("{}:{}", packet.src_ip, packet.src_port)),
            Cell::new(&format!("{}:{}", packet.dst_ip, packet.dst_port)),
            Cell::new(&packet.info),
            Cell::new(&packet.error_tags.join(",")),
        ]));
    }
    table.printstd();
    println!("{} matched (showing page)", page.total_count);
}
