//! Banner capture and first-match-wins service identification.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;
use tracing::debug;

use crate::error::{ProbeOutcome, TransientFailure};
use crate::prober;
use crate::types::{Fingerprint, ScanTarget};

/// Ports that get a TLS retry when the plaintext attempt yields nothing.
pub const ENCRYPTED_PORTS: [u16; 6] = [443, 993, 995, 465, 636, 8443];

const MAX_BANNER_BYTES: usize = 2048;
const PROBE_SETTLE: Duration = Duration::from_millis(500);

const HTTP_PROBE: &[u8] =
    b"GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: recon-scan-rs\r\nConnection: close\r\n\r\n";

/// Bytes sent right after connecting. Empty means "just listen".
pub fn probe_for(port: u16) -> &'static [u8] {
    match port {
        21 => b"USER anonymous\r\n",
        25 => b"EHLO banner-probe\r\n",
        80 | 443 | 8080 | 8443 | 9200 => HTTP_PROBE,
        110 | 995 => b"USER test\r\n",
        119 => b"HELP\r\n",
        143 | 993 => b"A001 CAPABILITY\r\n",
        6379 => b"INFO\r\n",
        _ => b"",
    }
}

/// Service name guessed from the port alone, used when no signature matches.
pub fn default_service(port: u16) -> String {
    let name = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        443 => "https",
        993 => "imaps",
        995 => "pop3s",
        1433 => "mssql",
        3306 => "mysql",
        5432 => "postgresql",
        6379 => "redis",
        8080 => "http-alt",
        27017 => "mongodb",
        _ => return format!("port-{port}"),
    };
    name.to_string()
}

/// One ordered identification rule.
pub struct SignatureRule {
    pub pattern: Regex,
    pub service: &'static str,
    pub version: Option<Regex>,
    pub tags: &'static [&'static str],
}

fn rule(
    pattern: &str,
    service: &'static str,
    version: Option<&str>,
    tags: &'static [&'static str],
) -> SignatureRule {
    SignatureRule {
        pattern: Regex::new(pattern).expect("signature pattern should compile"),
        service,
        version: version.map(|v| Regex::new(v).expect("version pattern should compile")),
        tags,
    }
}

/// Evaluated top to bottom against the lower-cased banner; the first hit
/// wins, so specific products sit above the generic protocol rules.
pub static SIGNATURES: Lazy<Vec<SignatureRule>> = Lazy::new(|| {
    vec![
        rule(
            r"apache tomcat[/\s]([0-9.]+)",
            "tomcat",
            Some(r"apache tomcat[/\s]([0-9.]+)"),
            &["application_server", "java"],
        ),
        rule(r"apache[/\s]([0-9.]+)", "apache", Some(r"apache[/\s]([0-9.]+)"), &["web_server"]),
        rule(r"nginx[/\s]([0-9.]+)", "nginx", Some(r"nginx[/\s]([0-9.]+)"), &["web_server"]),
        rule(
            r"microsoft-iis[/\s]([0-9.]+)",
            "iis",
            Some(r"microsoft-iis[/\s]([0-9.]+)"),
            &["web_server", "microsoft"],
        ),
        rule(
            r"jetty[/\s(]([0-9.]+)",
            "jetty",
            Some(r"jetty[/\s(]([0-9.]+)"),
            &["application_server", "java"],
        ),
        rule(
            r"openssh[_\s]([0-9.]+)",
            "openssh",
            Some(r"openssh[_\s]([0-9.]+[a-z0-9]*)"),
            &["ssh_server"],
        ),
        rule(r"dropbear", "dropbear", Some(r"dropbear_([0-9.]+)"), &["ssh_server"]),
        rule(r"ssh-[0-9.]+", "ssh", Some(r"ssh-([0-9.]+)"), &["ssh_server"]),
        rule(r"vsftpd ([0-9.]+)", "vsftpd", Some(r"vsftpd ([0-9.]+)"), &["ftp_server"]),
        rule(r"proftpd ([0-9.]+)", "proftpd", Some(r"proftpd ([0-9.]+)"), &["ftp_server"]),
        rule(
            r"filezilla server",
            "filezilla",
            Some(r"filezilla server (?:version )?([0-9.]+)"),
            &["ftp_server"],
        ),
        rule(r"postfix", "postfix", None, &["mail_server", "smtp"]),
        rule(
            r"sendmail ([0-9.]+)",
            "sendmail",
            Some(r"sendmail ([0-9.]+)"),
            &["mail_server", "smtp"],
        ),
        rule(r"exim ([0-9.]+)", "exim", Some(r"exim ([0-9.]+)"), &["mail_server", "smtp"]),
        rule(r"mysql.*([0-9.]+)", "mysql", Some(r"([0-9]+\.[0-9]+\.[0-9]+)"), &["database"]),
        rule(r"mariadb", "mysql", Some(r"([0-9]+\.[0-9]+\.[0-9]+)-mariadb"), &["database"]),
        rule(r"postgresql ([0-9.]+)", "postgresql", Some(r"postgresql ([0-9.]+)"), &["database"]),
        rule(
            r"redis_version:([0-9.]+)",
            "redis",
            Some(r"redis_version:([0-9.]+)"),
            &["database", "cache"],
        ),
        rule(r"^-noauth", "redis", None, &["database", "cache", "auth_required"]),
        rule(r"mongodb ([0-9.]+)", "mongodb", Some(r"mongodb ([0-9.]+)"), &["database", "nosql"]),
        rule(
            r#"you know, for search|"cluster_name""#,
            "elasticsearch",
            Some(r#""number"\s*:\s*"([0-9.]+)""#),
            &["search_engine", "analytics"],
        ),
        rule(
            r#""apiversion":"([0-9.]+)""#,
            "docker",
            Some(r#""version":"([0-9.]+)""#),
            &["container_platform"],
        ),
        rule(r"^\* ok .*imap|^\* capability", "imap", None, &["mail_server"]),
        rule(r"^\+ok", "pop3", None, &["mail_server"]),
        rule(r"^220.*e?smtp", "smtp", None, &["mail_server"]),
        rule(r"^220.*ftp", "ftp", None, &["ftp_server"]),
        rule(r"^331 ", "ftp", None, &["ftp_server"]),
        rule(r"^http/[0-9.]+ ", "http", None, &["web_server"]),
    ]
});

/// Service id, version and tags for a banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub service: String,
    pub version: String,
    pub tags: Vec<String>,
}

/// Match `banner` against [`SIGNATURES`]; fall back to [`default_service`].
pub fn identify(banner: &str, port: u16) -> Identification {
    let lower = banner.to_lowercase();
    if !lower.is_empty() {
        if let Some(rule) = SIGNATURES.iter().find(|r| r.pattern.is_match(&lower)) {
            let version = rule
                .version
                .as_ref()
                .and_then(|re| re.captures(&lower))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "unknown".to_string());
            return Identification {
                service: rule.service.to_string(),
                version,
                tags: rule.tags.iter().map(|t| t.to_string()).collect(),
            };
        }
    }
    Identification {
        service: default_service(port),
        version: "unknown".to_string(),
        tags: Vec::new(),
    }
}

/// Capture a banner from `target:port` and identify the service behind it.
///
/// Connection failures in both the plaintext and TLS attempts give
/// [`Fingerprint::unknown`]. A connection that stays silent still goes
/// through the port fallback table.
pub async fn fingerprint(target: &ScanTarget, port: u16, timeout: Duration) -> Fingerprint {
    capture(target, port, timeout, ENCRYPTED_PORTS.contains(&port)).await
}

/// [`fingerprint`] with the TLS retry decided by the caller.
async fn capture(target: &ScanTarget, port: u16, timeout: Duration, try_tls: bool) -> Fingerprint {
    let addr = SocketAddr::new(target.ip, port);
    let plain = grab_plain(addr, port, timeout).await;
    let mut connected = plain.is_completed();
    let mut banner = plain.unwrap_or_else(|why| {
        debug!(port, ?why, "plaintext banner grab failed");
        String::new()
    });
    let mut encrypted = false;
    let mut tls_subject = None;

    if banner.is_empty() && try_tls {
        match grab_tls(addr, &target.host, port, timeout).await {
            ProbeOutcome::Completed(capture) => {
                connected = true;
                encrypted = true;
                banner = capture.banner;
                tls_subject = capture.subject;
            }
            ProbeOutcome::Transient(why) => debug!(port, ?why, "tls banner grab failed"),
        }
    }

    if !connected {
        return Fingerprint::unknown();
    }

    let id = identify(&banner, port);
    Fingerprint {
        banner,
        service_id: id.service,
        version: id.version,
        encrypted,
        tags: id.tags,
        tls_subject,
    }
}

async fn grab_plain(addr: SocketAddr, port: u16, timeout: Duration) -> ProbeOutcome<String> {
    let mut stream = match prober::connect(addr, timeout).await {
        ProbeOutcome::Completed(s) => s,
        ProbeOutcome::Transient(why) => return ProbeOutcome::Transient(why),
    };
    exchange(&mut stream, probe_for(port), timeout).await
}

struct TlsCapture {
    banner: String,
    subject: Option<String>,
}

async fn grab_tls(
    addr: SocketAddr,
    host: &str,
    port: u16,
    timeout: Duration,
) -> ProbeOutcome<TlsCapture> {
    let stream = match prober::connect(addr, timeout).await {
        ProbeOutcome::Completed(s) => s,
        ProbeOutcome::Transient(why) => return ProbeOutcome::Transient(why),
    };
    let is_ip = host.parse::<IpAddr>().is_ok();
    let connector = match native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .use_sni(!is_ip)
        .build()
    {
        Ok(c) => tokio_native_tls::TlsConnector::from(c),
        Err(e) => {
            debug!("tls connector build failed: {e}");
            return ProbeOutcome::Transient(TransientFailure::Tls);
        }
    };
    let mut tls = match time::timeout(timeout, connector.connect(host, stream)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            debug!(port, "tls handshake failed: {e}");
            return ProbeOutcome::Transient(TransientFailure::Tls);
        }
        Err(_) => return ProbeOutcome::Transient(TransientFailure::TimedOut),
    };
    let subject = peer_subject(&tls);
    let banner = exchange(&mut tls, probe_for(port), timeout)
        .await
        .unwrap_or_default();
    ProbeOutcome::Completed(TlsCapture { banner, subject })
}

fn peer_subject<S>(tls: &tokio_native_tls::TlsStream<S>) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cert = tls.get_ref().peer_certificate().ok().flatten()?;
    let der = cert.to_der().ok()?;
    describe_certificate(&der)
}

/// `"<subject> (issuer: <issuer>)"` for a DER certificate.
pub fn describe_certificate(der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    Some(format!("{} (issuer: {})", cert.subject(), cert.issuer()))
}

/// Send `probe` (if any), give the peer a moment, then read one chunk.
///
/// A read timeout or an immediate EOF is a silent peer, not a failure.
async fn exchange<S>(stream: &mut S, probe: &[u8], timeout: Duration) -> ProbeOutcome<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !probe.is_empty() {
        if let Err(e) = stream.write_all(probe).await {
            return e.into();
        }
        time::sleep(PROBE_SETTLE).await;
    }
    let mut buf = vec![0u8; MAX_BANNER_BYTES];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => {
            ProbeOutcome::Completed(String::from_utf8_lossy(&buf[..n]).trim().to_string())
        }
        Ok(Err(e)) => e.into(),
        Err(_) => ProbeOutcome::Completed(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const CERT_PEM: &[u8] = include_bytes!("../tests/fixtures/localhost.crt");
    const KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/localhost.key");

    fn local_target() -> ScanTarget {
        ScanTarget {
            host: "127.0.0.1".into(),
            ip: IpAddr::from([127, 0, 0, 1]),
        }
    }

    /// TLS-only listener that writes `reply` once the handshake completes.
    async fn tls_listener(reply: &'static [u8]) -> u16 {
        let identity = native_tls::Identity::from_pkcs8(CERT_PEM, KEY_PEM).unwrap();
        let acceptor =
            tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut tls) = acceptor.accept(sock).await {
                        let _ = tls.write_all(reply).await;
                        let _ = tls.flush().await;
                        time::sleep(Duration::from_millis(300)).await;
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn tls_grab_reads_banner_and_certificate() {
        let port = tls_listener(b"220 secure.example ESMTP ready\r\n").await;
        let addr = SocketAddr::new(local_target().ip, port);
        let capture = match grab_tls(addr, "127.0.0.1", port, Duration::from_secs(2)).await {
            ProbeOutcome::Completed(c) => c,
            ProbeOutcome::Transient(why) => panic!("tls grab failed: {why:?}"),
        };
        assert_eq!(capture.banner, "220 secure.example ESMTP ready");
        let subject = capture.subject.expect("peer certificate subject");
        assert!(subject.contains("CN=localhost"), "{subject}");
    }

    #[tokio::test]
    async fn silent_plaintext_falls_back_to_tls() {
        let port = tls_listener(b"220 secure.example ESMTP ready\r\n").await;
        let fp = capture(&local_target(), port, Duration::from_millis(500), true).await;
        assert!(fp.encrypted);
        assert_eq!(fp.service_id, "smtp");
        assert!(fp.banner.starts_with("220 secure.example"));
        assert!(fp.tls_subject.as_deref().is_some_and(|s| s.contains("CN=localhost")));
    }

    #[tokio::test]
    async fn no_tls_retry_outside_encrypted_ports() {
        let port = tls_listener(b"hello\r\n").await;
        let fp = capture(&local_target(), port, Duration::from_millis(300), false).await;
        assert!(!fp.encrypted);
        assert!(fp.banner.is_empty());
        assert_eq!(fp.tls_subject, None);
        assert_eq!(fp.service_id, default_service(port));
    }

    #[tokio::test]
    async fn unreachable_port_is_unknown() {
        let port = {
            let l = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            l.local_addr().unwrap().port()
        };
        let fp = capture(&local_target(), port, Duration::from_millis(300), true).await;
        assert_eq!(fp, Fingerprint::unknown());
    }

    #[test]
    fn specific_ssh_rule_beats_generic() {
        let id = identify("SSH-2.0-OpenSSH_8.2", 22);
        assert_eq!(id.service, "openssh");
        assert_eq!(id.version, "8.2");
        assert_eq!(id.tags, vec!["ssh_server"]);
    }

    #[test]
    fn generic_ssh_rule_still_matches() {
        let id = identify("SSH-2.0-libssh_0.9", 2222);
        assert_eq!(id.service, "ssh");
        assert_eq!(id.version, "2.0");
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        let apache_idx = SIGNATURES.iter().position(|r| r.service == "apache").unwrap();
        let http_idx = SIGNATURES.iter().position(|r| r.service == "http").unwrap();
        assert!(apache_idx < http_idx);
        let id = identify("HTTP/1.1 200 OK\r\nServer: Apache/2.4.49 (Unix)", 80);
        assert_eq!(id.service, "apache");
        assert_eq!(id.version, "2.4.49");
    }

    #[test]
    fn plain_http_falls_to_generic_rule() {
        let id = identify("HTTP/1.0 404 Not Found\r\nContent-Length: 0", 8000);
        assert_eq!(id.service, "http");
        assert_eq!(id.version, "unknown");
    }

    #[test]
    fn redis_info_version() {
        let id = identify("$3204\r\n# Server\r\nredis_version:7.2.4\r\n", 6379);
        assert_eq!(id.service, "redis");
        assert_eq!(id.version, "7.2.4");
    }

    #[test]
    fn unmatched_banner_uses_port_table() {
        assert_eq!(identify("zzz", 80).service, "http");
        assert_eq!(identify("", 27017).service, "mongodb");
        assert_eq!(identify("zzz", 4242).service, "port-4242");
    }

    #[test]
    fn probe_strings() {
        assert_eq!(probe_for(21), b"USER anonymous\r\n");
        assert_eq!(probe_for(25), b"EHLO banner-probe\r\n");
        assert_eq!(probe_for(993), b"A001 CAPABILITY\r\n");
        assert_eq!(probe_for(995), b"USER test\r\n");
        assert!(probe_for(9200).starts_with(b"GET / HTTP/1.1\r\n"));
        assert!(probe_for(9200).ends_with(b"Connection: close\r\n\r\n"));
        for port in [22, 23, 53, 1433, 3306, 5432, 27017] {
            assert!(probe_for(port).is_empty());
        }
    }

    #[test]
    fn garbage_certificate_yields_none() {
        assert_eq!(describe_certificate(b"not a certificate"), None);
    }
}
