use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use time::{format_description::well_known, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use recon_scan_rs::types::{PortSpec, Profile, ScanReport, ScanResult, VulnSummary};
use recon_scan_rs::{ports, scanner, vuln, ScanConfig};

/// recon-scan-rs: TCP connect scanner with banner fingerprinting and vulnerability hints.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "recon-scan-rs",
    version,
    about = "TCP connect scanner with banner fingerprinting and heuristic vulnerability flags.",
    long_about = None
)]
struct Cli {
    /// Hostname or IP address to scan.
    target: String,

    /// Named port profile (used when no ports/range/file is given).
    #[arg(long, value_enum, default_value_t = ProfileArg::Common)]
    profile: ProfileArg,

    /// Inclusive port range, e.g. 1-1024.
    #[arg(long, conflicts_with_all = ["ports", "ports_file"])]
    range: Option<String>,

    /// Comma-separated ports and ranges, e.g. 22,80,8000-8010.
    #[arg(long, conflicts_with = "ports_file")]
    ports: Option<String>,

    /// Path to a ports file (one port or range per line, `#` comments).
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Concurrent connection attempts (1-100, default 50 or SCANNER_THREADS).
    #[arg(long)]
    threads: Option<usize>,

    /// Per-connection timeout in seconds (0.1-10, default 1.0 or SCANNER_TIMEOUT).
    #[arg(long)]
    timeout: Option<f64>,

    /// Pause between connection attempts in milliseconds (0-1000).
    #[arg(long)]
    delay: Option<u64>,

    /// Skip banner grabbing (and with it vulnerability analysis).
    #[arg(long = "no-fingerprint", default_value_t = false)]
    no_fingerprint: bool,

    /// Skip vulnerability analysis.
    #[arg(long = "no-vulns", default_value_t = false)]
    no_vulns: bool,

    /// Do not draw the progress bar.
    #[arg(long = "no-progress", default_value_t = false)]
    no_progress: bool,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
    Common,
}

impl From<ProfileArg> for Profile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
            ProfileArg::Common => Profile::Common,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut cfg = ScanConfig::from_env();
    if let Some(t) = cli.threads {
        cfg.threads = t;
    }
    if let Some(t) = cli.timeout {
        cfg.timeout_secs = t;
    }
    if let Some(d) = cli.delay {
        cfg.delay_ms = d;
    }
    let cfg = cfg.sanitized();

    let mut opts = cfg.options();
    opts.show_progress &= !cli.no_progress;
    opts.fingerprint = !cli.no_fingerprint;
    opts.analyze_vulns = !cli.no_vulns;

    let spec = port_spec(&cli)?;
    let port_list = ports::expand(&spec)?;
    let target = scanner::resolve(&cli.target).await?;

    println!("recon-scan-rs configuration:");
    println!("  target       : {} ({})", target.host, target.ip);
    println!("  ports        : {}", port_list.len());
    println!("  threads      : {}", cfg.threads);
    println!("  timeout_s    : {}", cfg.timeout_secs);
    println!("  delay_ms     : {}", cfg.delay_ms);
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    // Ctrl-C cancels the scan at the next phase boundary.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let started_at = now_rfc3339();
    let started = Instant::now();
    let results = scanner::run(&target, &port_list, &opts, cancel).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(elapsed_ms, open = results.len(), "scan finished");

    let summary = vuln::summarize(&results);
    print_results_table(&results);
    print_summary(results.len(), summary.as_ref());

    if let Some(path) = cli.output.as_deref() {
        let report = ScanReport {
            target: target.host.clone(),
            address: target.ip.to_string(),
            started_at,
            elapsed_ms,
            ports_scanned: port_list.len() as u64,
            summary,
            results,
        };
        match write_report_json(path, &report) {
            Ok(()) => println!("Wrote JSON report to {}", path.display()),
            Err(e) => warn!("failed to write JSON to {}: {e:#}", path.display()),
        }
    }

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn port_spec(cli: &Cli) -> Result<PortSpec> {
    if let Some(r) = cli.range.as_deref() {
        let Some((a, b)) = r.split_once('-') else {
            bail!("range must look like START-END, got {r}");
        };
        let start = a.trim().parse::<u32>().with_context(|| format!("invalid range start: {a}"))?;
        let end = b.trim().parse::<u32>().with_context(|| format!("invalid range end: {b}"))?;
        return Ok(PortSpec::Range { start, end });
    }
    if let Some(list) = cli.ports.as_deref() {
        return Ok(PortSpec::List(ports::parse_ports_str(list)?));
    }
    if let Some(path) = cli.ports_file.as_deref() {
        return Ok(PortSpec::List(ports::load_ports_from_path(path)?));
    }
    Ok(PortSpec::Profile(cli.profile.into()))
}

fn print_results_table(results: &[ScanResult]) {
    if results.is_empty() {
        println!("\nNo open ports found.");
        return;
    }
    let svc_w = results
        .iter()
        .map(|r| r.detected_service.len())
        .max()
        .unwrap_or(0)
        .max("service".len());
    let ver_w = results
        .iter()
        .map(|r| r.version.len())
        .max()
        .unwrap_or(0)
        .max("version".len());
    let port_w = 5usize;

    println!("\nOpen ports: {}", results.len());
    println!(
        "{:>port_w$}  {:<svc_w$}  {:<ver_w$}  {:<3}  {:<5}  banner",
        "port", "service", "version", "tls", "vulns",
    );
    println!(
        "{:-<port_w$}  {:-<svc_w$}  {:-<ver_w$}  {:-<3}  {:-<5}  {:-<6}",
        "", "", "", "", "", "",
    );
    for r in results {
        let mut bsnip = r.banner.replace('\n', "\\n").replace('\r', "\\r");
        if bsnip.chars().count() > 60 {
            bsnip = bsnip.chars().take(60).collect();
        }
        println!(
            "{:>port_w$}  {:<svc_w$}  {:<ver_w$}  {:<3}  {:<5}  {}",
            r.port,
            r.detected_service,
            r.version,
            if r.encrypted { "yes" } else { "no" },
            r.vulnerabilities.len(),
            bsnip,
        );
        for v in &r.vulnerabilities {
            let tag = v.severity.to_string().to_uppercase();
            println!("{:>port_w$}    [{tag}] {}", "", v.description);
            if let Some(rec) = &v.recommendation {
                println!("{:>port_w$}      -> {rec}", "");
            }
        }
    }
}

fn print_summary(open: usize, summary: Option<&VulnSummary>) {
    println!("\nTotal open ports: {open}");
    if let Some(s) = summary {
        println!("Total vulnerabilities: {}", s.total);
        println!("  High severity  : {}", s.high);
        println!("  Medium severity: {}", s.medium);
        println!("  Low severity   : {}", s.low);
    }
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
