//! Library crate for recon-scan-rs: TCP connect scanning, banner
//! fingerprinting and heuristic vulnerability flags for a single host.
pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ports;
pub mod prober;
pub mod progress;
pub mod scanner;
pub mod types;
pub mod vuln;

pub use config::{ScanConfig, ScanOptions};
pub use error::{ScanError, Result};
pub use scanner::{scan, scan_specific, scan_specific_with_cancel, scan_with_cancel};
