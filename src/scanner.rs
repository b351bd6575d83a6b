use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::net::lookup_host;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::ScanOptions;
use crate::error::{Result, ScanError};
use crate::fingerprint;
use crate::ports;
use crate::progress::ProgressTracker;
use crate::prober;
use crate::types::{Fingerprint, PortSpec, ScanResult, ScanTarget, Vulnerability};
use crate::vuln;

/// Upper bound on concurrent banner grabs and vulnerability checks.
const SECONDARY_WORKERS: usize = 10;

/// Resolve a hostname or literal address once for the whole scan.
pub async fn resolve(host: &str) -> Result<ScanTarget> {
    let host = host.trim();
    let fail = || ScanError::Resolution {
        target: host.to_string(),
    };
    if host.is_empty() {
        return Err(fail());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ScanTarget {
            host: host.to_string(),
            ip,
        });
    }
    let addrs: Vec<IpAddr> = lookup_host((host, 0))
        .await
        .map_err(|e| {
            debug!("lookup of {host} failed: {e}");
            fail()
        })?
        .map(|a| a.ip())
        .collect();
    let ip = addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(fail)?;
    Ok(ScanTarget {
        host: host.to_string(),
        ip,
    })
}

/// Scan `target` over the ports described by `spec`.
///
/// Port validation happens before resolution, and resolution before any
/// connection attempt.
pub async fn scan(target: &str, spec: &PortSpec, opts: &ScanOptions) -> Result<Vec<ScanResult>> {
    scan_with_cancel(target, spec, opts, CancellationToken::new()).await
}

/// Variant of [`scan`] that stops at the next phase boundary once `cancel` fires.
pub async fn scan_with_cancel(
    target: &str,
    spec: &PortSpec,
    opts: &ScanOptions,
    cancel: CancellationToken,
) -> Result<Vec<ScanResult>> {
    let ports = ports::expand(spec)?;
    let target = resolve(target).await?;
    run(&target, &ports, opts, cancel).await
}

/// Scan an explicit port list; no profile expansion.
pub async fn scan_specific(
    target: &str,
    ports: &[u16],
    opts: &ScanOptions,
) -> Result<Vec<ScanResult>> {
    scan_specific_with_cancel(target, ports, opts, CancellationToken::new()).await
}

pub async fn scan_specific_with_cancel(
    target: &str,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
) -> Result<Vec<ScanResult>> {
    let ports = ports::expand(&PortSpec::List(ports.to_vec()))?;
    let target = resolve(target).await?;
    run(&target, &ports, opts, cancel).await
}

/// Run the three phases against an already resolved target.
///
/// `ports` must be distinct. Each phase drains completely before the next
/// one starts.
pub async fn run(
    target: &ScanTarget,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
) -> Result<Vec<ScanResult>> {
    let session = ScanSession::new(target.clone(), ports.len() as u64);
    session.execute(ports, opts, cancel).await
}

/// State owned by one scan invocation.
struct ScanSession {
    target: Arc<ScanTarget>,
    progress: Arc<ProgressTracker>,
}

impl ScanSession {
    fn new(target: ScanTarget, total: u64) -> Self {
        Self {
            target: Arc::new(target),
            progress: Arc::new(ProgressTracker::new(total)),
        }
    }

    async fn execute(
        self,
        ports: &[u16],
        opts: &ScanOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<ScanResult>> {
        let timeout = opts.probe_timeout();
        let workers = opts.worker_count();
        info!(
            host = %self.target.host,
            ip = %self.target.ip,
            ports = ports.len(),
            workers,
            timeout_ms = timeout.as_millis() as u64,
            "starting connectivity phase"
        );

        let stop_render = CancellationToken::new();
        let renderer = opts
            .show_progress
            .then(|| tokio::spawn(self.progress.clone().render_loop(stop_render.clone())));

        let probed = prober::probe_all(
            self.target.ip,
            ports,
            workers,
            timeout,
            opts.delay,
            self.progress.clone(),
            cancel.clone(),
        )
        .await;

        stop_render.cancel();
        if let Some(handle) = renderer {
            let _ = handle.await;
        }
        self.ensure_complete(&cancel, probed.len(), ports.len())?;

        let mut open: Vec<u16> = probed.iter().filter(|r| r.open).map(|r| r.port).collect();
        open.sort_unstable();
        info!(open = open.len(), scanned = probed.len(), "connectivity phase complete");

        let secondary = workers.min(SECONDARY_WORKERS);

        let fingerprinted: Vec<(u16, Fingerprint)> = if opts.fingerprint && !open.is_empty() {
            info!(ports = open.len(), "fingerprinting open ports");
            let target = self.target.clone();
            run_pool(open.clone(), secondary, &cancel, move |port| {
                let target = target.clone();
                async move { (port, fingerprint::fingerprint(&target, port, timeout).await) }
            })
            .await
        } else {
            open.iter()
                .map(|&p| (p, aggregate::catalog_fingerprint(p)))
                .collect()
        };
        self.ensure_complete(&cancel, fingerprinted.len(), open.len())?;

        let expected = fingerprinted.len();
        let analyzed: Vec<(u16, Fingerprint, Vec<Vulnerability>)> =
            if opts.fingerprint && opts.analyze_vulns && !fingerprinted.is_empty() {
                info!(ports = expected, "analyzing vulnerabilities");
                let target = self.target.clone();
                run_pool(fingerprinted, secondary, &cancel, move |(port, fp)| {
                    let target = target.clone();
                    async move {
                        let service = aggregate::detected_service(port, &fp);
                        let findings = vuln::analyze(&target, port, &service, &fp, timeout).await;
                        (port, fp, findings)
                    }
                })
                .await
            } else {
                fingerprinted
                    .into_iter()
                    .map(|(port, fp)| (port, fp, Vec::new()))
                    .collect()
            };
        self.ensure_complete(&cancel, analyzed.len(), expected)?;

        let results = aggregate::finalize(
            analyzed
                .into_iter()
                .map(|(port, fp, findings)| aggregate::build(port, fp, findings))
                .collect(),
        );
        info!(results = results.len(), "scan complete");
        Ok(results)
    }

    /// A phase that skipped items because of `cancel` ends the scan; one
    /// that covered its whole input stands even if the token fired late.
    fn ensure_complete(
        &self,
        cancel: &CancellationToken,
        done: usize,
        expected: usize,
    ) -> Result<()> {
        if done < expected && cancel.is_cancelled() {
            let completed = self.progress.snapshot().completed;
            warn!(completed, done, expected, "scan cancelled");
            return Err(ScanError::Cancelled { completed });
        }
        Ok(())
    }
}

/// Apply `f` to every item with at most `workers` in flight and wait for
/// all of them. Items not yet started when `cancel` fires are skipped.
async fn run_pool<I, T, F, Fut>(
    items: Vec<I>,
    workers: usize,
    cancel: &CancellationToken,
    f: F,
) -> Vec<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for item in items {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let fut = f(item);
        set.spawn(async move {
            let _permit = permit;
            fut.await
        });
    }
    let mut out = Vec::new();
    while let Some(res) = set.join_next().await {
        match res {
            Ok(v) => out.push(v),
            Err(e) => debug!("worker task failed: {e}"),
        }
    }
    out
}
