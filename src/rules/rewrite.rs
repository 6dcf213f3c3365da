//! Engine for the `$dnsrewrite` rule dialect.
//!
//! # Format
//!
//! One rule per line:
//!
//! ```text
//! |<hostname>^$dnsrewrite=<RCODE>;<TYPE>;<VALUE>
//! ```
//!
//! - `RCODE` is one of `NOERROR`, `NXDOMAIN`, `SERVFAIL`, `REFUSED`
//! - `TYPE` is one of `A`, `AAAA`, `CNAME`, `PTR`
//! - `VALUE` is an address of the matching family or a domain name
//! - Empty lines and lines starting with `!` or `#` are comments

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

use super::{
    CompileError, DnsRequest, DnsResult, DnsRewrite, DnsRewriteRule, RewriteValue, RuleCompiler,
    RuleEngine,
};

/// Compiles rules text into a [`RewriteEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteCompiler;

impl RuleCompiler for RewriteCompiler {
    type Engine = RewriteEngine;

    fn compile(&self, list_id: i32, rules_text: &str) -> Result<RewriteEngine, CompileError> {
        RewriteEngine::compile(list_id, rules_text)
    }
}

/// A compiled set of `$dnsrewrite` rules indexed by hostname.
///
/// Hostnames match exactly and case-insensitively, a trailing dot is
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
    list_id: i32,
    rules: HashMap<String, Vec<Arc<DnsRewriteRule>>>,
    len: usize,
}

impl RewriteEngine {
    /// Compile the rules list.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidRule`] for the first line that is
    /// neither a comment nor a valid rule.
    pub fn compile(list_id: i32, rules_text: &str) -> Result<Self, CompileError> {
        let mut rules: HashMap<String, Vec<Arc<DnsRewriteRule>>> = HashMap::new();
        let mut len = 0;

        for (idx, line) in rules_text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
                continue;
            }

            let rule = parse_rule(list_id, line).map_err(|reason| CompileError::InvalidRule {
                line: idx + 1,
                reason,
            })?;

            rules
                .entry(rule.hostname.clone())
                .or_default()
                .push(Arc::new(rule));
            len += 1;
        }

        Ok(Self {
            list_id,
            rules,
            len,
        })
    }

    /// The identifier of the compiled rules list.
    #[must_use]
    pub const fn list_id(&self) -> i32 {
        self.list_id
    }

    /// Returns the number of compiled rules.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the engine has no rules.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn rules_of<'a>(
        &'a self,
        hostname: &str,
        qtype: RecordType,
    ) -> impl Iterator<Item = &'a Arc<DnsRewriteRule>> + 'a {
        self.rules
            .get(&normalize(hostname))
            .into_iter()
            .flatten()
            .filter(move |rule| rule.rewrite.rr_type == qtype)
    }
}

impl RuleEngine for RewriteEngine {
    fn match_request(&self, request: &DnsRequest) -> Option<DnsResult> {
        let direct: Vec<_> = self
            .rules_of(&request.hostname, request.qtype)
            .cloned()
            .collect();
        if !direct.is_empty() {
            return Some(DnsResult { rules: direct });
        }

        // Follow the alias a single hop, aliases always point to main hosts.
        // A name shared by several hosts has one alias per main host, pick
        // the first one that can answer the requested type.
        let mut fallback = None;
        for cname in self.rules_of(&request.hostname, RecordType::CNAME) {
            let RewriteValue::Name(target) = &cname.rewrite.value else {
                continue;
            };
            let mut targets = self.rules_of(target, request.qtype).cloned().peekable();
            if targets.peek().is_some() {
                let rules = std::iter::once(Arc::clone(cname)).chain(targets).collect();
                return Some(DnsResult { rules });
            }
            fallback.get_or_insert(cname);
        }

        fallback.map(|cname| DnsResult {
            rules: vec![Arc::clone(cname)],
        })
    }

    fn rules_count(&self) -> usize {
        self.len
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim_end_matches('.').to_ascii_lowercase()
}

fn parse_rule(list_id: i32, text: &str) -> Result<DnsRewriteRule, String> {
    let rest = text
        .strip_prefix('|')
        .ok_or_else(|| "rule must start with '|'".to_string())?;
    let (pattern, modifier) = rest
        .split_once("^$")
        .ok_or_else(|| "rule must have a '^$' separator".to_string())?;
    let rewrite = modifier
        .strip_prefix("dnsrewrite=")
        .ok_or_else(|| format!("unsupported modifier {modifier:?}"))?;

    let hostname = normalize(pattern);
    if hostname.is_empty() {
        return Err("empty hostname".into());
    }
    if hostname.contains(['*', '|', '^', '$', '/']) {
        return Err(format!("unsupported hostname pattern {pattern:?}"));
    }

    let mut parts = rewrite.splitn(3, ';');
    let (Some(rcode), Some(rr_type), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("rewrite {rewrite:?} must be RCODE;TYPE;VALUE"));
    };

    let rewrite = DnsRewrite {
        rcode: parse_rcode(rcode)?,
        rr_type: parse_rr_type(rr_type)?,
        value: parse_value(rr_type, value)?,
    };

    Ok(DnsRewriteRule {
        text: text.to_string(),
        list_id,
        hostname,
        rewrite,
    })
}

fn parse_rcode(rcode: &str) -> Result<ResponseCode, String> {
    match rcode.to_ascii_uppercase().as_str() {
        "NOERROR" => Ok(ResponseCode::NoError),
        "NXDOMAIN" => Ok(ResponseCode::NXDomain),
        "SERVFAIL" => Ok(ResponseCode::ServFail),
        "REFUSED" => Ok(ResponseCode::Refused),
        _ => Err(format!("unsupported response code {rcode:?}")),
    }
}

fn parse_rr_type(rr_type: &str) -> Result<RecordType, String> {
    match rr_type.to_ascii_uppercase().as_str() {
        "A" => Ok(RecordType::A),
        "AAAA" => Ok(RecordType::AAAA),
        "CNAME" => Ok(RecordType::CNAME),
        "PTR" => Ok(RecordType::PTR),
        _ => Err(format!("unsupported record type {rr_type:?}")),
    }
}

fn parse_value(rr_type: &str, value: &str) -> Result<RewriteValue, String> {
    let invalid = |what: &str| format!("invalid {what} {value:?}");

    match rr_type.to_ascii_uppercase().as_str() {
        "A" => value
            .parse::<Ipv4Addr>()
            .map(|ip| RewriteValue::Addr(IpAddr::V4(ip)))
            .map_err(|_| invalid("IPv4 address")),
        "AAAA" => value
            .parse::<Ipv6Addr>()
            .map(|ip| RewriteValue::Addr(IpAddr::V6(ip)))
            .map_err(|_| invalid("IPv6 address")),
        _ if value.is_empty() || value.contains(char::is_whitespace) => Err(invalid("name")),
        _ => Ok(RewriteValue::Name(value.to_string())),
    }
}
