//! Hosts file line parser.
//!
//! Parses single lines of the standard `/etc/hosts` format, see hosts(5).

use std::net::IpAddr;

/// Maximum length of a domain name in its textual form.
const MAX_DOMAIN_NAME_LEN: usize = 253;

/// Maximum length of a single domain name label.
const MAX_LABEL_LEN: usize = 63;

/// Reason a candidate host name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidName {
    #[error("name is empty")]
    Empty,

    #[error("name is longer than {MAX_DOMAIN_NAME_LEN} bytes")]
    TooLong,

    #[error("label {0} is empty")]
    EmptyLabel(usize),

    #[error("label {0} is longer than {MAX_LABEL_LEN} bytes")]
    LabelTooLong(usize),

    #[error("label {0} contains an invalid character")]
    InvalidChar(usize),

    #[error("label {0} starts or ends with a hyphen")]
    EdgeHyphen(usize),
}

/// Parse a single line having the hosts syntax.
///
/// # Format
///
/// - `<ip> <host1> [host2] [host3]... [# comment]`
/// - A field starting with `#` turns the rest of the line into a comment
/// - A `#` inside a field truncates that field
///
/// Returns `None` for lines that carry no data: fewer than two fields, or a
/// first field that isn't an IP literal. Invalid host names are dropped one
/// by one, so the returned list may be empty.
///
/// # Example
///
/// ```
/// use hosts_container::hosts::parse_line;
///
/// let (ip, hosts) = parse_line("192.0.2.1 router router.lan # gateway").unwrap();
/// assert_eq!(ip.to_string(), "192.0.2.1");
/// assert_eq!(hosts, vec!["router", "router.lan"]);
/// ```
#[must_use]
pub fn parse_line(line: &str) -> Option<(IpAddr, Vec<String>)> {
    let mut fields = line.split_whitespace();
    let addr = fields.next()?;
    let mut fields = fields.peekable();
    fields.peek()?;

    let ip = addr.parse::<IpAddr>().ok()?.to_canonical();

    let mut hosts = Vec::new();
    for field in fields {
        let host = match field.find('#') {
            // The rest of the fields are a part of the comment.
            Some(0) => break,
            Some(idx) => &field[..idx],
            None => field,
        };

        if let Err(err) = validate_domain_name(host) {
            tracing::debug!(host, reason = %err, "host is invalid, ignoring");
            continue;
        }

        hosts.push(host.to_string());
    }

    Some((ip, hosts))
}

/// Check that `name` is a syntactically valid domain name.
///
/// Labels must be 1 to 63 bytes of ASCII letters, digits and hyphens, and
/// may neither start nor end with a hyphen.
///
/// # Errors
///
/// Returns the first violated constraint.
pub fn validate_domain_name(name: &str) -> Result<(), InvalidName> {
    if name.is_empty() {
        return Err(InvalidName::Empty);
    }
    if name.len() > MAX_DOMAIN_NAME_LEN {
        return Err(InvalidName::TooLong);
    }

    for (idx, label) in name.split('.').enumerate() {
        let bytes = label.as_bytes();
        let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
            return Err(InvalidName::EmptyLabel(idx));
        };

        if bytes.len() > MAX_LABEL_LEN {
            return Err(InvalidName::LabelTooLong(idx));
        }
        if !bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-') {
            return Err(InvalidName::InvalidChar(idx));
        }
        if *first == b'-' || *last == b'-' {
            return Err(InvalidName::EdgeHyphen(idx));
        }
    }

    Ok(())
}
