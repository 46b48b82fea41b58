//! Well-known TCP port to service name table.

use std::collections::HashMap;
use std::sync::LazyLock;

const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
    (27017, "MongoDB"),
];

/// Built once on first use and only read afterwards.
static SERVICE_TABLE: LazyLock<HashMap<u16, &'static str>> =
    LazyLock::new(|| WELL_KNOWN.iter().copied().collect());

/// Look up the service name for a port, if it is a well-known one.
pub fn service_name(port: u16) -> Option<&'static str> {
    SERVICE_TABLE.get(&port).copied()
}

/// Like [`service_name`] but yields an empty label for unknown ports.
pub fn service_label(port: u16) -> &'static str {
    service_name(port).unwrap_or("")
}
