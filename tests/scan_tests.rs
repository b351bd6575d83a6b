use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use recon_scan_rs::catalog;
use recon_scan_rs::config::ScanOptions;
use recon_scan_rs::types::PortSpec;
use recon_scan_rs::{scan, scan_specific, scan_specific_with_cancel, scan_with_cancel, ScanError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn quiet_opts() -> ScanOptions {
    ScanOptions {
        threads: 20,
        timeout: Duration::from_millis(300),
        show_progress: false,
        ..ScanOptions::default()
    }
}

async fn silent_listener() -> (TcpListener, u16) {
    let l = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = l.local_addr().unwrap().port();
    (l, port)
}

async fn closed_port() -> u16 {
    silent_listener().await.1
}

/// Accept connections forever and greet each one with `greeting`.
async fn greeting_listener(greeting: &'static [u8]) -> u16 {
    let (l, port) = silent_listener().await;
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = l.accept().await {
            tokio::spawn(async move {
                let _ = sock.write_all(greeting).await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            });
        }
    });
    port
}

#[tokio::test]
async fn single_listener_yields_single_result() {
    let (_listener, open) = silent_listener().await;
    let closed = closed_port().await;

    let results = scan_specific("127.0.0.1", &[closed, open], &quiet_opts())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.port, open);
    assert_eq!(r.state, "open");
    assert!(!r.service_name.is_empty());
    assert!(!r.detected_service.is_empty());
    assert_eq!(r.version, "unknown");
}

#[tokio::test]
async fn results_are_sorted_and_unique() {
    let mut listeners = Vec::new();
    let mut ports = Vec::new();
    for _ in 0..4 {
        let (l, p) = silent_listener().await;
        listeners.push(l);
        ports.push(p);
    }
    ports.push(closed_port().await);
    let mut requested = ports.clone();
    requested.reverse();
    requested.push(ports[0]);

    let opts = ScanOptions {
        fingerprint: false,
        ..quiet_opts()
    };
    let results = scan_specific("127.0.0.1", &requested, &opts).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.windows(2).all(|w| w[0].port < w[1].port));
    for r in &results {
        assert!(ports[..4].contains(&r.port));
    }
}

#[tokio::test]
async fn banner_is_fingerprinted_end_to_end() {
    let port = greeting_listener(b"SSH-2.0-OpenSSH_7.4\r\n").await;

    let results = scan_specific("127.0.0.1", &[port], &quiet_opts())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.detected_service, "openssh");
    assert_eq!(r.version, "7.4");
    assert!(r.banner.starts_with("SSH-2.0-OpenSSH_7.4"));
    assert!(!r.encrypted);
    assert!(r
        .vulnerabilities
        .iter()
        .any(|v| v.description.contains("CVE-2018-15473")));
}

#[tokio::test]
async fn unresolvable_target_fails_before_scanning() {
    let err = scan(
        "no-such-host.invalid",
        &PortSpec::List(vec![80]),
        &quiet_opts(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScanError::Resolution { .. }));
}

#[tokio::test]
async fn reversed_range_fails_without_network() {
    let err = scan(
        "127.0.0.1",
        &PortSpec::Range { start: 100, end: 50 },
        &quiet_opts(),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ScanError::InvalidRange { start: 100, end: 50 });
}

#[tokio::test]
async fn closed_ports_do_not_delay_the_scan() {
    let mut closed = Vec::new();
    for _ in 0..10 {
        closed.push(closed_port().await);
    }
    let opts = ScanOptions {
        threads: 10,
        ..quiet_opts()
    };
    let start = Instant::now();
    let results = scan_specific("127.0.0.1", &closed, &opts).await.unwrap();
    assert!(results.is_empty());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancelled_scan_reports_cancellation() {
    let (_listener, open) = silent_listener().await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = scan_with_cancel("127.0.0.1", &PortSpec::List(vec![open]), &quiet_opts(), cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ScanError::Cancelled { completed: 0 });
}

#[tokio::test]
async fn without_fingerprinting_records_use_catalog_names() {
    let (_listener, open) = silent_listener().await;
    let opts = ScanOptions {
        fingerprint: false,
        ..quiet_opts()
    };
    let results = scan_specific("127.0.0.1", &[open], &opts).await.unwrap();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.detected_service, catalog::describe(open).service);
    assert_eq!(r.detected_service, r.service_name);
    assert_eq!(r.version, "unknown");
    assert!(r.vulnerabilities.is_empty());
}

#[tokio::test]
async fn cancelling_mid_scan_reports_partial_count() {
    let mut closed = Vec::new();
    for _ in 0..40 {
        closed.push(closed_port().await);
    }
    let total = closed.len() as u64;
    let opts = ScanOptions {
        threads: 1,
        delay: Duration::from_millis(25),
        ..quiet_opts()
    };
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = scan_specific_with_cancel("127.0.0.1", &closed, &opts, cancel)
        .await
        .unwrap_err();
    match err {
        ScanError::Cancelled { completed } => {
            assert!(completed > 0, "nothing probed before cancel");
            assert!(completed < total, "cancel arrived after the last probe");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}
