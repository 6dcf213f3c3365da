//! Rule synthesis from hosts data.
//!
//! Turns address-host pairs into `$dnsrewrite` rules understood by
//! [`RewriteEngine`](crate::rules::RewriteEngine):
//!
//! ```text
//! |router^$dnsrewrite=NOERROR;A;192.0.2.1
//! |1.2.0.192.in-addr.arpa^$dnsrewrite=NOERROR;PTR;router.
//! |router.lan^$dnsrewrite=NOERROR;CNAME;router
//! ```

use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};
use std::net::IpAddr;

use super::parser::parse_line;
use super::table::{AddOutcome, HostTable};

/// A/AAAA and PTR rules generated for the main host of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRule {
    /// The A or AAAA rule.
    pub forward_rule: String,
    /// The PTR rule.
    pub reverse_rule: String,
    /// The address both rules describe.
    pub address: IpAddr,
}

/// Builds the hosts table and the rules text within a single refresh.
#[derive(Debug, Default)]
pub struct RuleSynthesizer {
    /// Resulting rules list content.
    rules_text: String,
    /// Rules of the main hosts, used to build translations.
    rules: Vec<GeneratedRule>,
    /// Unordered alias-main pairs already written as CNAME rules.
    cname_set: HashSet<(String, String)>,
    /// Unique address-host pairs.
    table: HostTable,
}

impl RuleSynthesizer {
    /// Create a synthesizer for about `capacity` addresses, usually the size
    /// of the previous table.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rules_text: String::new(),
            rules: Vec::with_capacity(capacity),
            cname_set: HashSet::new(),
            table: HostTable::with_capacity(capacity),
        }
    }

    /// Parse the whole content of a hosts file.
    ///
    /// Lines are decoded lossily so a stray non-UTF-8 byte only affects
    /// its own line.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the underlying reader.
    pub fn parse_reader(&mut self, reader: &mut dyn BufRead) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let Some((ip, hosts)) = parse_line(&line) else {
                continue;
            };

            self.add_pairs(ip, &hosts);
        }

        Ok(())
    }

    /// Add the hosts for `ip`, writing the rules as needed.
    pub fn add_pairs<S: AsRef<str>>(&mut self, ip: IpAddr, hosts: &[S]) {
        let ip = ip.to_canonical();
        for host in hosts {
            let host = host.as_ref();
            match self.table.add(ip, host) {
                AddOutcome::Duplicate => continue,
                AddOutcome::First => {
                    let rule = self.write_main_rule(host, ip);
                    self.rules.push(rule);
                }
                // Names differing only in case resolve to the same rules.
                AddOutcome::Alias { main } if host.eq_ignore_ascii_case(&main) => {}
                AddOutcome::Alias { main } => {
                    let pair = unordered_pair(host, &main);
                    if self.cname_set.contains(&pair) {
                        continue;
                    }

                    self.write_alias_rule(host, &main);
                    self.cname_set.insert(pair);
                }
            }

            tracing::trace!(%ip, host, "added ip-host pair");
        }
    }

    /// Write the CNAME rule for the alias-host pair.
    fn write_alias_rule(&mut self, alias: &str, host: &str) {
        let rule = format!("|{alias}^$dnsrewrite=NOERROR;CNAME;{host}\n");
        self.rules_text.push_str(&rule);
    }

    /// Write the A/AAAA rule and the PTR rule for the host-ip pair.
    fn write_main_rule(&mut self, host: &str, ip: IpAddr) -> GeneratedRule {
        let qtype = if ip.is_ipv4() { "A" } else { "AAAA" };
        let forward_rule = format!("|{host}^$dnsrewrite=NOERROR;{qtype};{ip}");
        let reverse_rule = format!(
            "|{}^$dnsrewrite=NOERROR;PTR;{}",
            reverse_name(ip),
            fqdn(host)
        );

        self.rules_text.reserve(forward_rule.len() + reverse_rule.len() + 2);
        self.rules_text.push_str(&forward_rule);
        self.rules_text.push('\n');
        self.rules_text.push_str(&reverse_rule);
        self.rules_text.push('\n');

        GeneratedRule {
            forward_rule,
            reverse_rule,
            address: ip,
        }
    }

    /// The rules list content generated so far.
    #[must_use]
    pub fn rules_text(&self) -> &str {
        &self.rules_text
    }

    /// The rules generated for main hosts so far.
    #[must_use]
    pub fn rules(&self) -> &[GeneratedRule] {
        &self.rules
    }

    /// The hosts table built so far.
    #[must_use]
    pub const fn table(&self) -> &HostTable {
        &self.table
    }

    /// Build the map translating generated rules into hosts-syntax lines.
    ///
    /// Both rules of a [`GeneratedRule`] map to the same line.
    #[must_use]
    pub fn translations(&self) -> HashMap<String, String> {
        let mut trans = HashMap::with_capacity(self.rules.len() * 2);
        for rule in &self.rules {
            let Some(line) = self.table.hosts_line(&rule.address) else {
                continue;
            };

            trans.insert(rule.reverse_rule.clone(), line.clone());
            trans.insert(rule.forward_rule.clone(), line);
        }

        trans
    }

    /// Consume the synthesizer, keeping only the table.
    #[must_use]
    pub fn into_table(self) -> HostTable {
        self.table
    }
}

fn unordered_pair(a: &str, b: &str) -> (String, String) {
    let (a, b) = (a.to_ascii_lowercase(), b.to_ascii_lowercase());
    if a <= b { (a, b) } else { (b, a) }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Returns the fully-qualified form of `host`.
#[must_use]
pub fn fqdn(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    }
}

/// Returns the reverse DNS name of the address without the trailing dot.
///
/// ```
/// use hosts_container::hosts::reverse_name;
///
/// let ip = "192.0.2.1".parse().unwrap();
/// assert_eq!(reverse_name(ip), "1.2.0.192.in-addr.arpa");
/// ```
#[must_use]
pub fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(72);
            for byte in v6.octets().iter().rev() {
                for nibble in [byte & 0x0f, byte >> 4] {
                    name.push(char::from(HEX_DIGITS[usize::from(nibble)]));
                    name.push('.');
                }
            }
            name.push_str("ip6.arpa");
            name
        }
    }
}
