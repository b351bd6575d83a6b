use crate::catalog;
use crate::fingerprint;
use crate::types::{Fingerprint, ScanResult, Vulnerability};

/// Service id reported for a port: the fingerprint's guess, or the port
/// fallback table when fingerprinting produced nothing.
pub fn detected_service(port: u16, fp: &Fingerprint) -> String {
    if fp.service_id == "unknown" {
        fingerprint::default_service(port)
    } else {
        fp.service_id.clone()
    }
}

/// Stand-in used when banner capture is switched off: the catalog's name for
/// the port and no version.
pub fn catalog_fingerprint(port: u16) -> Fingerprint {
    Fingerprint {
        service_id: catalog::describe(port).service,
        ..Fingerprint::unknown()
    }
}

/// Merge catalog data, fingerprint and findings into one record.
pub fn build(port: u16, fp: Fingerprint, vulnerabilities: Vec<Vulnerability>) -> ScanResult {
    let info = catalog::describe(port);
    let detected = detected_service(port, &fp);
    ScanResult {
        port,
        state: "open".to_string(),
        service_name: info.service,
        registration: info.status.to_string(),
        description: info.description,
        protocols: info.protocols,
        category: info.category,
        suggested_commands: info.commands,
        detected_service: detected,
        version: fp.version,
        banner: fp.banner,
        encrypted: fp.encrypted,
        tags: fp.tags,
        tls_subject: fp.tls_subject,
        vulnerabilities,
    }
}

/// Sort by port and drop any repeated port, keeping the first record.
pub fn finalize(mut results: Vec<ScanResult>) -> Vec<ScanResult> {
    results.sort_by_key(|r| r.port);
    results.dedup_by_key(|r| r.port);
    results
}
