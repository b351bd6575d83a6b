use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ProbeOutcome, TransientFailure};
use crate::progress::ProgressTracker;
use crate::types::PortProbeResult;

/// One bounded TCP connect. The stream is handed back to the caller on
/// success and dropped with it.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> ProbeOutcome<TcpStream> {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => ProbeOutcome::Completed(stream),
        Ok(Err(e)) => e.into(),
        Err(_) => ProbeOutcome::Transient(TransientFailure::TimedOut),
    }
}

/// Single connection attempt to `ip:port`. Every failure reads as closed.
pub async fn probe(ip: IpAddr, port: u16, timeout: Duration) -> bool {
    connect(SocketAddr::new(ip, port), timeout)
        .await
        .map(|_stream| true)
        .unwrap_or_else(|why| {
            trace!(%ip, port, ?why, "port closed or unreachable");
            false
        })
}

/// Probe every port with at most `workers` connects in flight.
///
/// Each finished probe bumps `tracker` exactly once. Returns when every
/// spawned probe has finished; if `cancel` fires, no further probes are
/// spawned and the returned set covers only the ports that ran.
pub async fn probe_all(
    ip: IpAddr,
    ports: &[u16],
    workers: usize,
    timeout: Duration,
    delay: Duration,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
) -> Vec<PortProbeResult> {
    let sem = Arc::new(Semaphore::new(workers.clamp(1, 100)));
    let mut set = JoinSet::new();

    for &port in ports {
        if cancel.is_cancelled() {
            break;
        }
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let tracker = tracker.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return None;
            }
            let open = probe(ip, port, timeout).await;
            tracker.increment();
            Some(PortProbeResult { port, open })
        });

        if !delay.is_zero() {
            time::sleep(delay).await;
        }
    }

    let mut results = Vec::with_capacity(ports.len());
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Some(r)) => results.push(r),
            Ok(None) => {}
            Err(e) => debug!("probe task failed: {e}"),
        }
    }
    results
}
