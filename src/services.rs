/// Label reported for ports with no well-known service.
pub const UNKNOWN_SERVICE: &str = "Unknown";

const WELL_KNOWN: &[(u16, &str)] = &[
    (20, "FTP-DATA"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (8080, "HTTP-Proxy"),
    (8888, "HTTP-Alt"),
    (9090, "HTTP-Alt"),
    (27017, "MongoDB"),
];

/// Look up the conventional service label for a TCP port.
///
/// This is a static table, not a probe: an open port 22 is reported as `SSH`
/// whether or not an SSH daemon is actually listening there.
pub fn service_name(port: u16) -> &'static str {
    WELL_KNOWN
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_SERVICE)
}

/// All ports with a known label, ascending.
pub fn known_ports() -> Vec<u16> {
    WELL_KNOWN.iter().map(|(p, _)| *p).collect()
}
