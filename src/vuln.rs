//! Heuristic vulnerability flags for open ports.
//!
//! Three sources, in this order: rules keyed by service id, rules matched
//! against the captured banner, and a couple of short active checks. None of
//! them can fail the scan; a check that cannot complete contributes nothing.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::error::{ProbeOutcome, TransientFailure};
use crate::prober;
use crate::types::{Fingerprint, ScanResult, ScanTarget, Severity, VulnSummary, Vulnerability};

fn finding(severity: Severity, description: &str, recommendation: &str) -> Vulnerability {
    Vulnerability {
        severity,
        description: description.to_string(),
        recommendation: Some(recommendation.to_string()),
    }
}

/// Findings implied by the service id alone.
pub fn service_findings(service: &str, encrypted: bool) -> Vec<Vulnerability> {
    let mut out = Vec::new();
    match service {
        "telnet" => out.push(finding(
            Severity::High,
            "Telnet transmits credentials and session data in cleartext",
            "Disable telnet and use SSH",
        )),
        "ftp" | "vsftpd" | "proftpd" | "filezilla" if !encrypted => out.push(finding(
            Severity::Medium,
            "FTP transmits credentials in cleartext",
            "Use SFTP or FTPS instead of plain FTP",
        )),
        "docker" => out.push(finding(
            Severity::High,
            "Docker Engine API reachable without TLS grants control of the host",
            "Bind the API to a unix socket or require TLS client certificates",
        )),
        "redis" => out.push(finding(
            Severity::Medium,
            "Redis is reachable over the network",
            "Bind Redis to localhost, enable requirepass/ACLs and protected-mode",
        )),
        "mongodb" => out.push(finding(
            Severity::Medium,
            "MongoDB is reachable over the network",
            "Enable authentication and restrict bindIp",
        )),
        "elasticsearch" => out.push(finding(
            Severity::Medium,
            "Elasticsearch REST API is reachable over the network",
            "Enable security features (authentication and TLS) and restrict access",
        )),
        "memcached" => out.push(finding(
            Severity::Medium,
            "Memcached is exposed and has no authentication",
            "Restrict memcached to localhost and disable UDP",
        )),
        "mysql" | "postgresql" | "mssql" | "oracle" => out.push(finding(
            Severity::Low,
            "Database listener is reachable from the network",
            "Restrict database access with a firewall or bind address",
        )),
        "microsoft-ds" | "netbios-ssn" | "smb" => out.push(finding(
            Severity::Medium,
            "SMB is exposed; hosts may be affected by MS17-010 (EternalBlue)",
            "Disable SMBv1, apply security updates and filter ports 139/445",
        )),
        "rdp" => out.push(finding(
            Severity::Medium,
            "RDP is exposed; unpatched hosts may be affected by CVE-2019-0708 (BlueKeep)",
            "Require Network Level Authentication and place RDP behind a VPN",
        )),
        "vnc" => out.push(finding(
            Severity::Medium,
            "VNC is exposed and commonly uses weak or no authentication",
            "Tunnel VNC over SSH or a VPN and set a strong password",
        )),
        "http" | "http-alt" | "apache" | "nginx" | "iis" | "tomcat" | "jetty" if !encrypted => {
            out.push(finding(
                Severity::Low,
                "Web service is served without TLS",
                "Serve the site over HTTPS and redirect plain HTTP",
            ))
        }
        "smtp" | "pop3" | "imap" | "postfix" | "sendmail" | "exim" if !encrypted => {
            out.push(finding(
                Severity::Low,
                "Mail protocol offered without implicit TLS",
                "Require STARTTLS or use the implicit-TLS port",
            ))
        }
        _ => {}
    }
    out
}

struct BannerRule {
    pattern: Regex,
    severity: Severity,
    description: &'static str,
    recommendation: &'static str,
}

fn banner_rule(
    pattern: &str,
    severity: Severity,
    description: &'static str,
    recommendation: &'static str,
) -> BannerRule {
    BannerRule {
        pattern: Regex::new(pattern).expect("banner rule should compile"),
        severity,
        description,
        recommendation,
    }
}

static BANNER_RULES: Lazy<Vec<BannerRule>> = Lazy::new(|| {
    vec![
        banner_rule(
            r"vsftpd 2\.3\.4",
            Severity::High,
            "vsftpd 2.3.4 contains a backdoor (CVE-2011-2523)",
            "Upgrade vsftpd immediately",
        ),
        banner_rule(
            r"proftpd 1\.3\.5",
            Severity::High,
            "ProFTPD 1.3.5 mod_copy allows unauthenticated file copy (CVE-2015-3306)",
            "Upgrade ProFTPD or disable mod_copy",
        ),
        banner_rule(
            r"apache/2\.4\.49(?:[^0-9]|$)",
            Severity::High,
            "Apache 2.4.49 path traversal and RCE (CVE-2021-41773)",
            "Upgrade Apache HTTP Server to 2.4.51 or later",
        ),
        banner_rule(
            r"apache/2\.4\.50(?:[^0-9]|$)",
            Severity::High,
            "Apache 2.4.50 path traversal and RCE (CVE-2021-42013)",
            "Upgrade Apache HTTP Server to 2.4.51 or later",
        ),
        banner_rule(
            r"microsoft-iis/6\.0",
            Severity::High,
            "IIS 6.0 WebDAV buffer overflow (CVE-2017-7269)",
            "Disable WebDAV and migrate off IIS 6.0",
        ),
        banner_rule(
            r"nginx/(?:1\.6\.2|1\.10\.3|1\.13\.2)(?:[^0-9]|$)",
            Severity::Medium,
            "nginx range filter integer overflow (CVE-2017-7529)",
            "Upgrade nginx to 1.13.3 / 1.12.1 or later",
        ),
        banner_rule(
            r"exim 4\.(?:8[7-9]|9[01])(?:[^0-9]|$)",
            Severity::High,
            "Exim 4.87-4.91 remote command execution (CVE-2019-10149)",
            "Upgrade Exim to 4.92 or later",
        ),
        banner_rule(
            r"openssh[_\s](?:[1-6]\.|7\.[0-6](?:[^0-9]|$))",
            Severity::Medium,
            "OpenSSH before 7.7 allows username enumeration (CVE-2018-15473)",
            "Upgrade OpenSSH to 7.7 or later",
        ),
        banner_rule(
            r"server: [a-z0-9_.-]+/[0-9]",
            Severity::Low,
            "HTTP Server header discloses product and version",
            "Suppress version details in the Server header",
        ),
    ]
});

/// Findings implied by the captured banner text.
pub fn banner_findings(banner: &str) -> Vec<Vulnerability> {
    if banner.is_empty() {
        return Vec::new();
    }
    let lower = banner.to_lowercase();
    BANNER_RULES
        .iter()
        .filter(|r| r.pattern.is_match(&lower))
        .map(|r| finding(r.severity, r.description, r.recommendation))
        .collect()
}

/// All heuristic findings for one open port.
pub async fn analyze(
    target: &ScanTarget,
    port: u16,
    service_id: &str,
    fp: &Fingerprint,
    timeout: Duration,
) -> Vec<Vulnerability> {
    let mut out = service_findings(service_id, fp.encrypted);
    out.extend(banner_findings(&fp.banner));

    let addr = SocketAddr::new(target.ip, port);
    let active = match service_id {
        "ftp" | "vsftpd" | "proftpd" | "filezilla" if !fp.encrypted => {
            Some(anonymous_ftp(addr, timeout).await.unwrap_or_else(|why| {
                debug!(port, ?why, "anonymous ftp check did not complete");
                None
            }))
        }
        "redis" => Some(redis_without_auth(addr, timeout).await.unwrap_or_else(|why| {
            debug!(port, ?why, "redis auth check did not complete");
            None
        })),
        _ => None,
    };
    out.extend(active.flatten());
    out
}

async fn anonymous_ftp(
    addr: SocketAddr,
    timeout: Duration,
) -> ProbeOutcome<Option<Vulnerability>> {
    let mut stream = match prober::connect(addr, timeout).await {
        ProbeOutcome::Completed(s) => s,
        ProbeOutcome::Transient(why) => return ProbeOutcome::Transient(why),
    };
    let steps: [&[u8]; 3] = [b"", b"USER anonymous\r\n", b"PASS anonymous@example.com\r\n"];
    let mut last = None;
    for step in steps {
        match send_and_read(&mut stream, step, timeout).await {
            ProbeOutcome::Completed(r) => last = Some(r),
            ProbeOutcome::Transient(why) => return ProbeOutcome::Transient(why),
        }
    }
    let accepted = last.is_some_and(|r| r.starts_with("230"));
    ProbeOutcome::Completed(accepted.then(|| {
        finding(
            Severity::High,
            "FTP server accepts anonymous login",
            "Disable anonymous FTP access",
        )
    }))
}

async fn redis_without_auth(
    addr: SocketAddr,
    timeout: Duration,
) -> ProbeOutcome<Option<Vulnerability>> {
    let mut stream = match prober::connect(addr, timeout).await {
        ProbeOutcome::Completed(s) => s,
        ProbeOutcome::Transient(why) => return ProbeOutcome::Transient(why),
    };
    send_and_read(&mut stream, b"PING\r\n", timeout).await.map(|reply| {
        reply.starts_with("+PONG").then(|| {
            finding(
                Severity::High,
                "Redis accepts commands without authentication",
                "Set requirepass or ACLs and enable protected-mode",
            )
        })
    })
}

async fn send_and_read(
    stream: &mut TcpStream,
    payload: &[u8],
    timeout: Duration,
) -> ProbeOutcome<String> {
    if !payload.is_empty() {
        if let Err(e) = stream.write_all(payload).await {
            return e.into();
        }
    }
    let mut buf = [0u8; 512];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(0)) => ProbeOutcome::Transient(TransientFailure::Io(ErrorKind::UnexpectedEof)),
        Ok(Ok(n)) => {
            ProbeOutcome::Completed(String::from_utf8_lossy(&buf[..n]).trim().to_string())
        }
        Ok(Err(e)) => e.into(),
        Err(_) => ProbeOutcome::Transient(TransientFailure::TimedOut),
    }
}

/// Count findings by severity. `None` when there are no results at all.
pub fn summarize(results: &[ScanResult]) -> Option<VulnSummary> {
    if results.is_empty() {
        return None;
    }
    let mut summary = VulnSummary::default();
    for v in results.iter().flat_map(|r| &r.vulnerabilities) {
        summary.total += 1;
        match v.severity {
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
    }
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn local_target() -> ScanTarget {
        ScanTarget {
            host: "127.0.0.1".into(),
            ip: std::net::IpAddr::from([127, 0, 0, 1]),
        }
    }

    fn seen(service: &str, banner: &str) -> Fingerprint {
        Fingerprint {
            banner: banner.into(),
            service_id: service.into(),
            ..Fingerprint::unknown()
        }
    }

    /// Optionally greet, then answer each client message with the next reply.
    async fn scripted_listener(
        greeting: Option<&'static [u8]>,
        replies: &'static [&'static [u8]],
    ) -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Some(g) = greeting {
                        let _ = sock.write_all(g).await;
                    }
                    let mut buf = [0u8; 256];
                    for reply in replies {
                        match sock.read(&mut buf).await {
                            Ok(n) if n > 0 => {}
                            _ => return,
                        }
                        let _ = sock.write_all(reply).await;
                    }
                    time::sleep(Duration::from_millis(200)).await;
                });
            }
        });
        port
    }

    fn has(findings: &[Vulnerability], needle: &str) -> bool {
        findings.iter().any(|f| f.description.contains(needle))
    }

    #[tokio::test]
    async fn anonymous_ftp_login_is_flagged() {
        let port = scripted_listener(
            Some(b"220 (vsFTPd 3.0.3)\r\n"),
            &[b"331 Please specify the password.\r\n", b"230 Login successful.\r\n"],
        )
        .await;
        let fp = seen("vsftpd", "220 (vsFTPd 3.0.3)");
        let v = analyze(&local_target(), port, "vsftpd", &fp, TIMEOUT).await;
        assert!(has(&v, "anonymous login"), "{v:?}");
        assert!(has(&v, "cleartext"));
    }

    #[tokio::test]
    async fn rejected_anonymous_ftp_is_not_flagged() {
        let port = scripted_listener(
            Some(b"220 FTP server ready\r\n"),
            &[b"331 Password required\r\n", b"530 Login incorrect.\r\n"],
        )
        .await;
        let v = analyze(&local_target(), port, "ftp", &seen("ftp", ""), TIMEOUT).await;
        assert!(!has(&v, "anonymous login"), "{v:?}");
        assert_eq!(v.len(), 1);
    }

    #[tokio::test]
    async fn redis_answering_ping_is_flagged() {
        let port = scripted_listener(None, &[b"+PONG\r\n"]).await;
        let v = analyze(&local_target(), port, "redis", &seen("redis", ""), TIMEOUT).await;
        assert!(has(&v, "without authentication"), "{v:?}");
        assert!(v.iter().any(|f| f.severity == Severity::High));
    }

    #[tokio::test]
    async fn redis_requiring_auth_is_not_flagged() {
        let port = scripted_listener(None, &[b"-NOAUTH Authentication required.\r\n"]).await;
        let v = analyze(&local_target(), port, "redis", &seen("redis", ""), TIMEOUT).await;
        assert!(!has(&v, "without authentication"), "{v:?}");
        assert_eq!(v.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_active_check_adds_nothing() {
        let port = {
            let l = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            l.local_addr().unwrap().port()
        };
        let v = analyze(&local_target(), port, "redis", &seen("redis", ""), TIMEOUT).await;
        assert_eq!(v, service_findings("redis", false));
    }

    #[test]
    fn unknown_service_has_no_findings() {
        assert!(service_findings("port-4242", false).is_empty());
        assert!(banner_findings("").is_empty());
    }

    #[test]
    fn telnet_is_high() {
        let v = service_findings("telnet", false);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].severity, Severity::High);
        assert!(v[0].recommendation.is_some());
    }

    #[test]
    fn cleartext_web_only_without_tls() {
        assert_eq!(service_findings("nginx", false).len(), 1);
        assert!(service_findings("nginx", true).is_empty());
    }

    #[test]
    fn vulnerable_versions_from_banner() {
        let v = banner_findings("HTTP/1.1 200 OK\r\nServer: Apache/2.4.49 (Unix)");
        assert!(v.iter().any(|f| f.description.contains("CVE-2021-41773")));
        assert!(v.iter().any(|f| f.severity == Severity::Low));
        assert!(!v.iter().any(|f| f.description.contains("CVE-2021-42013")));

        assert_eq!(banner_findings("SSH-2.0-OpenSSH_7.4").len(), 1);
        assert!(banner_findings("SSH-2.0-OpenSSH_7.9").is_empty());
        assert!(banner_findings("SSH-2.0-OpenSSH_8.2p1").is_empty());
        assert_eq!(banner_findings("220 (vsFTPd 2.3.4)")[0].severity, Severity::High);
    }

    fn result_with(sev: &[Severity]) -> ScanResult {
        ScanResult {
            port: 1,
            state: "open".into(),
            service_name: "x".into(),
            registration: "Unofficial".into(),
            description: String::new(),
            protocols: Default::default(),
            category: String::new(),
            suggested_commands: Vec::new(),
            detected_service: "x".into(),
            version: "unknown".into(),
            banner: String::new(),
            encrypted: false,
            tags: Vec::new(),
            tls_subject: None,
            vulnerabilities: sev
                .iter()
                .map(|&s| Vulnerability {
                    severity: s,
                    description: String::new(),
                    recommendation: None,
                })
                .collect(),
        }
    }

    #[test]
    fn summary_counts_by_severity() {
        assert_eq!(summarize(&[]), None);
        let results = vec![
            result_with(&[Severity::High, Severity::Low]),
            result_with(&[Severity::Medium, Severity::High]),
            result_with(&[]),
        ];
        let s = summarize(&results).unwrap();
        assert_eq!(s, VulnSummary { total: 4, high: 2, medium: 1, low: 1 });
    }
}
