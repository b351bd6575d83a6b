//! Static port metadata: curated entries for well-known services plus a
//! synthesized descriptor for every other port, and the named port profiles.

use crate::types::ProtocolFlags;

/// Catalog view of a single port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub service: String,
    pub description: String,
    pub protocols: ProtocolFlags,
    pub status: &'static str,
    pub category: String,
    pub commands: Vec<String>,
}

struct Entry {
    port: u16,
    service: &'static str,
    description: &'static str,
    protocols: ProtocolFlags,
    status: &'static str,
    category: &'static str,
    commands: &'static [&'static str],
}

const T: ProtocolFlags = ProtocolFlags::new(true, false, false, false);
const TU: ProtocolFlags = ProtocolFlags::new(true, true, false, false);
const TS: ProtocolFlags = ProtocolFlags::new(true, false, true, false);
const U: ProtocolFlags = ProtocolFlags::new(false, true, false, false);

macro_rules! entry {
    (
        $port:expr,
        $svc:expr,
        $desc:expr,
        $proto:expr,
        $status:expr,
        $cat:expr,
        [$($cmd:expr),* $(,)?] $(,)?
    ) => {
        Entry {
            port: $port,
            service: $svc,
            description: $desc,
            protocols: $proto,
            status: $status,
            category: $cat,
            commands: &[$($cmd),*],
        }
    };
}

// Sorted by port for binary search.
static CURATED: &[Entry] = &[
    entry!(
        20,
        "ftp-data",
        "File Transfer Protocol (FTP) data transfer",
        TS,
        "Official",
        "File Transfer",
        ["nmap -p 20 <target>", "nc -v <target> 20"]
    ),
    entry!(
        21,
        "ftp",
        "File Transfer Protocol (FTP) control (command)",
        TS,
        "Official",
        "File Transfer",
        ["nmap -p 21 <target>", "ftp <target>", "nmap --script ftp-anon -p 21 <target>"]
    ),
    entry!(
        22,
        "ssh",
        "Secure Shell (SSH) - secure remote login and file transfer",
        TS,
        "Official",
        "Remote Access",
        [
            "nmap -p 22 <target>",
            "ssh <target>",
            "nmap --script ssh-hostkey -p 22 <target>",
            "ssh-keyscan <target>",
        ]
    ),
    entry!(
        23,
        "telnet",
        "Telnet protocol - unencrypted text communications",
        T,
        "Official",
        "Remote Access",
        ["nmap -p 23 <target>", "telnet <target>"]
    ),
    entry!(
        25,
        "smtp",
        "Simple Mail Transfer Protocol (SMTP) - email routing",
        T,
        "Official",
        "Mail",
        ["nmap -p 25 <target>", "telnet <target> 25", "nmap --script smtp-commands -p 25 <target>"]
    ),
    entry!(
        53,
        "dns",
        "Domain Name System (DNS)",
        TU,
        "Official",
        "Name Resolution",
        ["nmap -p 53 <target>", "dig @<target> example.com", "nmap -sU -p 53 <target>"]
    ),
    entry!(
        69,
        "tftp",
        "Trivial File Transfer Protocol (TFTP)",
        U,
        "Official",
        "File Transfer",
        ["nmap -sU -p 69 <target>"]
    ),
    entry!(
        80,
        "http",
        "Hypertext Transfer Protocol (HTTP)",
        ProtocolFlags::new(true, true, true, false),
        "Official",
        "Web",
        [
            "nmap -p 80 <target>",
            "curl -I http://<target>",
            "nmap --script http-title -p 80 <target>",
        ]
    ),
    entry!(
        110,
        "pop3",
        "Post Office Protocol v3 (POP3)",
        T,
        "Official",
        "Mail",
        ["nmap -p 110 <target>", "nc -v <target> 110"]
    ),
    entry!(
        111,
        "rpcbind",
        "Open Network Computing Remote Procedure Call (portmapper)",
        TU,
        "Official",
        "RPC",
        ["nmap -p 111 <target>", "rpcinfo -p <target>"]
    ),
    entry!(
        119,
        "nntp",
        "Network News Transfer Protocol (NNTP)",
        T,
        "Official",
        "News",
        ["nmap -p 119 <target>", "nc -v <target> 119"]
    ),
    entry!(
        123,
        "ntp",
        "Network Time Protocol (NTP)",
        U,
        "Official",
        "Time Services",
        ["nmap -sU -p 123 <target>", "ntpq -p <target>"]
    ),
    entry!(
        135,
        "msrpc",
        "Microsoft RPC endpoint mapper",
        TU,
        "Official",
        "RPC",
        ["nmap -p 135 <target>", "rpcdump.py <target>"]
    ),
    entry!(
        139,
        "netbios-ssn",
        "NetBIOS Session Service",
        TU,
        "Official",
        "File Sharing",
        ["nmap -p 139 <target>", "smbclient -L //<target>"]
    ),
    entry!(
        143,
        "imap",
        "Internet Message Access Protocol (IMAP)",
        T,
        "Official",
        "Mail",
        ["nmap -p 143 <target>", "nc -v <target> 143"]
    ),
    entry!(
        161,
        "snmp",
        "Simple Network Management Protocol (SNMP)",
        U,
        "Official",
        "Management",
        ["nmap -sU -p 161 <target>", "snmpwalk -v2c -c public <target>"]
    ),
    entry!(
        389,
        "ldap",
        "Lightweight Directory Access Protocol (LDAP)",
        TU,
        "Official",
        "Directory",
        ["nmap -p 389 <target>", "ldapsearch -x -H ldap://<target> -s base"]
    ),
    entry!(
        443,
        "https",
        "HTTP over TLS/SSL (HTTPS)",
        ProtocolFlags::new(true, true, true, false),
        "Official",
        "Web",
        [
            "nmap -p 443 <target>",
            "curl -kI https://<target>",
            "openssl s_client -connect <target>:443",
        ]
    ),
    entry!(
        445,
        "microsoft-ds",
        "Microsoft SMB over TCP",
        TU,
        "Official",
        "File Sharing",
        [
            "nmap -p 445 <target>",
            "smbclient -L //<target>",
            "nmap --script smb-vuln* -p 445 <target>",
        ]
    ),
    entry!(
        465,
        "smtps",
        "SMTP over implicit TLS",
        T,
        "Official",
        "Mail",
        ["nmap -p 465 <target>", "openssl s_client -connect <target>:465"]
    ),
    entry!(
        587,
        "submission",
        "Email message submission",
        T,
        "Official",
        "Mail",
        ["nmap -p 587 <target>", "openssl s_client -starttls smtp -connect <target>:587"]
    ),
    entry!(
        636,
        "ldaps",
        "LDAP over TLS/SSL",
        TU,
        "Official",
        "Directory",
        ["nmap -p 636 <target>", "openssl s_client -connect <target>:636"]
    ),
    entry!(
        873,
        "rsync",
        "rsync file synchronization protocol",
        T,
        "Official",
        "File Transfer",
        ["nmap -p 873 <target>", "rsync rsync://<target>/"]
    ),
    entry!(
        993,
        "imaps",
        "IMAP over TLS/SSL",
        T,
        "Official",
        "Mail",
        ["nmap -p 993 <target>", "openssl s_client -connect <target>:993"]
    ),
    entry!(
        995,
        "pop3s",
        "POP3 over TLS/SSL",
        T,
        "Official",
        "Mail",
        ["nmap -p 995 <target>", "openssl s_client -connect <target>:995"]
    ),
    entry!(
        1433,
        "mssql",
        "Microsoft SQL Server database management system",
        T,
        "Official",
        "Database",
        ["nmap -p 1433 <target>", "nmap --script ms-sql-info -p 1433 <target>"]
    ),
    entry!(
        1521,
        "oracle",
        "Oracle database listener",
        T,
        "Official",
        "Database",
        ["nmap -p 1521 <target>", "nmap --script oracle-tns-version -p 1521 <target>"]
    ),
    entry!(
        2049,
        "nfs",
        "Network File System (NFS)",
        ProtocolFlags::new(true, true, true, false),
        "Official",
        "File Sharing",
        ["nmap -p 2049 <target>", "showmount -e <target>"]
    ),
    entry!(
        2375,
        "docker",
        "Docker REST API (plain)",
        T,
        "Official",
        "Container",
        ["nmap -p 2375 <target>", "curl http://<target>:2375/version"]
    ),
    entry!(
        3306,
        "mysql",
        "MySQL database system",
        T,
        "Official",
        "Database",
        [
            "nmap -p 3306 <target>",
            "mysql -h <target> -u root",
            "nmap --script mysql-info -p 3306 <target>",
        ]
    ),
    entry!(
        3389,
        "rdp",
        "Microsoft Remote Desktop Protocol",
        TU,
        "Official",
        "Remote Access",
        ["nmap -p 3389 <target>", "nmap --script rdp-enum-encryption -p 3389 <target>"]
    ),
    entry!(
        5432,
        "postgresql",
        "PostgreSQL database system",
        T,
        "Official",
        "Database",
        ["nmap -p 5432 <target>", "psql -h <target> -U postgres"]
    ),
    entry!(
        5900,
        "vnc",
        "Virtual Network Computing (VNC) remote desktop",
        T,
        "Official",
        "Remote Access",
        ["nmap -p 5900 <target>", "nmap --script vnc-info -p 5900 <target>"]
    ),
    entry!(
        6379,
        "redis",
        "Redis key-value data store",
        T,
        "Official",
        "Database",
        ["nmap -p 6379 <target>", "redis-cli -h <target> info"]
    ),
    entry!(
        8080,
        "http-alt",
        "Alternative HTTP port (proxies, application servers)",
        T,
        "Unofficial",
        "Web",
        ["nmap -p 8080 <target>", "curl -I http://<target>:8080"]
    ),
    entry!(
        8443,
        "https-alt",
        "Alternative HTTPS port",
        T,
        "Unofficial",
        "Web",
        ["nmap -p 8443 <target>", "curl -kI https://<target>:8443"]
    ),
    entry!(
        9200,
        "elasticsearch",
        "Elasticsearch REST API",
        T,
        "Unofficial",
        "Search",
        ["nmap -p 9200 <target>", "curl http://<target>:9200"]
    ),
    entry!(
        11211,
        "memcached",
        "Memcached",
        TU,
        "Unofficial",
        "Database",
        ["nmap -p 11211 <target>", "echo \"stats\" | nc <target> 11211"]
    ),
    entry!(
        27017,
        "mongodb",
        "MongoDB NoSQL database",
        T,
        "Unofficial",
        "Database",
        ["nmap -p 27017 <target>", "mongosh --host <target>"]
    ),
];

const COMMON_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 67, 68, 69, 80, 110, 119, 123, 135, 139, 143, 161, 162, 179, 389, 443,
    445, 465, 587, 631, 636, 873, 993, 995, 1080, 1194, 1433, 1521, 1723, 2049, 2222, 3128, 3306,
    3389, 5432, 5900, 6379, 8080, 8443, 9050, 27017,
];

const TOP_PORTS: &[u16] = &[
    80, 443, 22, 21, 25, 53, 110, 993, 995, 143, 587, 465, 23, 135, 139, 445, 3389, 1433, 3306,
    5432, 1521, 27017, 6379, 5900, 8080, 8443, 111, 2049, 873, 631, 636, 389, 161, 162, 179, 123,
    1080, 1194, 1723, 9050, 1, 7, 9, 11, 13, 17, 19, 20, 67, 68, 69, 79, 88, 113, 119, 137, 138,
    2222, 3128,
];

/// Default size of the `quick` profile.
pub const QUICK_PROFILE_SIZE: usize = 1000;

/// Look up catalog data for a port; unknown ports get a band descriptor.
pub fn describe(port: u16) -> PortInfo {
    if let Ok(idx) = CURATED.binary_search_by_key(&port, |e| e.port) {
        let e = &CURATED[idx];
        return PortInfo {
            service: e.service.to_string(),
            description: e.description.to_string(),
            protocols: e.protocols,
            status: e.status,
            category: e.category.to_string(),
            commands: e.commands.iter().map(|c| c.to_string()).collect(),
        };
    }
    synthesize(port)
}

fn synthesize(port: u16) -> PortInfo {
    let (prefix, description, protocols, status, category) = if port < 1024 {
        (
            "well-known",
            format!("Well-known port {port} (see IANA registry)"),
            TU,
            "Reserved",
            "Well-Known",
        )
    } else if port < 49152 {
        ("registered", format!("Registered port {port}"), T, "Registered", "Registered")
    } else {
        ("dynamic", format!("Dynamic/Private port {port}"), T, "Dynamic", "Dynamic/Private")
    };
    PortInfo {
        service: format!("{prefix}-{port}"),
        description,
        protocols,
        status,
        category: category.to_string(),
        commands: vec![format!("nmap -p {port} <target>"), format!("nc -v <target> {port}")],
    }
}

/// Fixed list of well-known service ports.
pub fn common_ports() -> Vec<u16> {
    COMMON_PORTS.to_vec()
}

/// The `count` most frequently open ports: the curated top list first, then
/// sequential ports from 1024 upward.
pub fn top_ports(count: usize) -> Vec<u16> {
    let mut out: Vec<u16> = TOP_PORTS.iter().copied().take(count).collect();
    let mut next: u32 = 1024;
    while out.len() < count && next <= u16::MAX as u32 {
        let p = next as u16;
        if !TOP_PORTS.contains(&p) {
            out.push(p);
        }
        next += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_table_is_sorted() {
        assert!(CURATED.windows(2).all(|w| w[0].port < w[1].port));
    }

    #[test]
    fn curated_lookup() {
        let info = describe(80);
        assert_eq!(info.service, "http");
        assert_eq!(info.category, "Web");
        assert!(info.protocols.tcp);
        assert!(!info.commands.is_empty());
    }

    #[test]
    fn unknown_ports_synthesize_by_band() {
        assert_eq!(describe(999).service, "well-known-999");
        assert_eq!(describe(1024).service, "registered-1024");
        assert_eq!(describe(49151).category, "Registered");
        assert_eq!(describe(49152).service, "dynamic-49152");
        assert_eq!(describe(65535).category, "Dynamic/Private");
    }

    #[test]
    fn top_ports_extends_sequentially_without_duplicates() {
        let ports = top_ports(QUICK_PROFILE_SIZE);
        assert_eq!(ports.len(), QUICK_PROFILE_SIZE);
        assert_eq!(ports[0], 80);
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ports.len());
        assert_eq!(top_ports(3), vec![80, 443, 22]);
    }

    #[test]
    fn common_profile_has_web_ports() {
        let c = common_ports();
        assert!(c.contains(&80) && c.contains(&443));
    }
}
