use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A host to scan: the name the caller gave plus the address it resolved to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub ip: IpAddr,
}

/// Named port profiles expanded through the port catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Top-N frequently open ports.
    Quick,
    /// Every port, 1-65535.
    Full,
    /// Fixed list of well-known service ports.
    Common,
}

/// Which ports a scan should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// Inclusive range; bounds are validated before any work starts.
    Range { start: u32, end: u32 },
    List(Vec<u16>),
    Profile(Profile),
}

/// Phase-1 output for one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProbeResult {
    pub port: u16,
    pub open: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// One heuristic finding attached to an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub severity: Severity,
    pub description: String,
    pub recommendation: Option<String>,
}

/// Transport protocols a catalog entry is registered for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolFlags {
    pub tcp: bool,
    pub udp: bool,
    pub sctp: bool,
    pub dccp: bool,
}

impl ProtocolFlags {
    pub const fn new(tcp: bool, udp: bool, sctp: bool, dccp: bool) -> Self {
        Self { tcp, udp, sctp, dccp }
    }
}

/// Outcome of banner capture and signature matching for one port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub banner: String,
    pub service_id: String,
    pub version: String,
    pub encrypted: bool,
    pub tags: Vec<String>,
    pub tls_subject: Option<String>,
}

impl Fingerprint {
    /// The value used when nothing could be captured from the port.
    pub fn unknown() -> Self {
        Self {
            banner: String::new(),
            service_id: "unknown".to_string(),
            version: "unknown".to_string(),
            encrypted: false,
            tags: Vec::new(),
            tls_subject: None,
        }
    }
}

/// Final per-open-port record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub port: u16,
    pub state: String,
    pub service_name: String,
    /// IANA registration status from the catalog (`Official`, `Registered`...).
    pub registration: String,
    pub description: String,
    pub protocols: ProtocolFlags,
    pub category: String,
    pub suggested_commands: Vec<String>,
    pub detected_service: String,
    pub version: String,
    pub banner: String,
    pub encrypted: bool,
    pub tags: Vec<String>,
    pub tls_subject: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Finding counts across a whole result set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VulnSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Everything the binary hands to its output layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub target: String,
    pub address: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub ports_scanned: u64,
    pub summary: Option<VulnSummary>,
    pub results: Vec<ScanResult>,
}
