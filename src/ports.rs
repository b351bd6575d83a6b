use anyhow::{bail, Context};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::catalog;
use crate::error::{Result, ScanError};
use crate::types::{PortSpec, Profile};

/// Check inclusive range bounds and return them as ports.
pub fn validate_range(start: u32, end: u32) -> Result<(u16, u16)> {
    if start < 1 || end > 65535 || start > end {
        return Err(ScanError::InvalidRange { start, end });
    }
    Ok((start as u16, end as u16))
}

/// Expand a port spec into distinct ports, keeping first-appearance order.
pub fn expand(spec: &PortSpec) -> Result<Vec<u16>> {
    let ports = match spec {
        PortSpec::Range { start, end } => {
            let (start, end) = validate_range(*start, *end)?;
            (start..=end).collect()
        }
        PortSpec::List(list) => dedup_ports(list.iter().copied()),
        PortSpec::Profile(Profile::Quick) => catalog::top_ports(catalog::QUICK_PROFILE_SIZE),
        PortSpec::Profile(Profile::Common) => catalog::common_ports(),
        PortSpec::Profile(Profile::Full) => (1..=u16::MAX).collect(),
    };
    if ports.is_empty() {
        return Err(ScanError::EmptyPortSet);
    }
    Ok(ports)
}

/// Drop port 0 and repeats.
pub fn dedup_ports(ports: impl IntoIterator<Item = u16>) -> Vec<u16> {
    let mut seen = HashSet::new();
    ports
        .into_iter()
        .filter(|&p| p != 0 && seen.insert(p))
        .collect()
}

/// Parse a port list into a deduplicated list of TCP ports (1..=65535).
///
/// Supported formats, per line or comma-separated item:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ports_str(s: &str) -> anyhow::Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port_str(item)
                .with_context(|| format!("line {line_no}: invalid port value: {item}"))?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

/// Load a ports list from a file path.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> anyhow::Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

fn parse_port_str(s: &str) -> anyhow::Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
