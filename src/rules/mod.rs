//! Rule engine abstraction.
//!
//! The container doesn't match requests itself. It compiles the rules text
//! produced by [`RuleSynthesizer`](crate::hosts::RuleSynthesizer) with a
//! [`RuleCompiler`] and asks the resulting [`RuleEngine`] to match requests,
//! which keeps the matching algorithm substitutable:
//!
//! ```rust
//! use hosts_container::rules::{DnsRequest, RewriteEngine, RuleEngine};
//! use hickory_proto::rr::RecordType;
//!
//! let text = "|router^$dnsrewrite=NOERROR;A;192.0.2.1\n";
//! let engine = RewriteEngine::compile(1, text).unwrap();
//!
//! let res = engine.match_request(&DnsRequest::new("router", RecordType::A)).unwrap();
//! assert_eq!(res.addresses().collect::<Vec<_>>(), vec!["192.0.2.1".parse::<std::net::IpAddr>().unwrap()]);
//! ```

mod rewrite;

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use hickory_proto::op::{Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, PTR};
use hickory_proto::rr::{Name, RData, Record, RecordType};

pub use rewrite::{RewriteCompiler, RewriteEngine};

use crate::hosts::fqdn;

/// Error type for rule compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A line of the rules text isn't a valid rule.
    #[error("invalid rule at line {line}: {reason}")]
    InvalidRule {
        /// Line number (1-indexed).
        line: usize,
        /// Reason for the error.
        reason: String,
    },
}

/// Trait for compiled, queryable rule sets.
pub trait RuleEngine: Send + Sync + 'static {
    /// Match the request against the rules.
    ///
    /// Returns `None` if no rule matches.
    fn match_request(&self, request: &DnsRequest) -> Option<DnsResult>;

    /// Returns the number of compiled rules.
    fn rules_count(&self) -> usize;
}

/// Trait for building a [`RuleEngine`] out of rules text.
pub trait RuleCompiler: Send + Sync + 'static {
    /// The engine produced by the compiler.
    type Engine: RuleEngine;

    /// Compile `rules_text`, a rules list identified by `list_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] if the text contains an invalid rule.
    fn compile(&self, list_id: i32, rules_text: &str) -> Result<Self::Engine, CompileError>;
}

/// A DNS request to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRequest {
    /// The requested name, with or without the trailing dot.
    pub hostname: String,
    /// The requested record type.
    pub qtype: RecordType,
}

impl DnsRequest {
    /// Create a new request.
    pub fn new(hostname: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            hostname: hostname.into(),
            qtype,
        }
    }
}

impl From<&Query> for DnsRequest {
    fn from(query: &Query) -> Self {
        Self::new(query.name().to_utf8(), query.query_type())
    }
}

/// The data a rewrite rule answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteValue {
    /// An address for A and AAAA rules.
    Addr(IpAddr),
    /// A domain name for CNAME and PTR rules.
    Name(String),
}

/// The rewrite a rule applies to matching requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRewrite {
    pub rcode: ResponseCode,
    pub rr_type: RecordType,
    pub value: RewriteValue,
}

/// A compiled `$dnsrewrite` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRewriteRule {
    /// The rule's text exactly as compiled.
    pub text: String,
    /// The identifier of the rules list the rule came from.
    pub list_id: i32,
    /// The matched hostname, lowercase and without the trailing dot.
    pub hostname: String,
    /// The rewrite to apply.
    pub rewrite: DnsRewrite,
}

/// Rules matching a request.
///
/// When the request hits an alias, the result holds the CNAME rule followed
/// by the rules of its target having the requested type, so the answer is
/// complete without resolving the CNAME again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResult {
    pub rules: Vec<Arc<DnsRewriteRule>>,
}

impl DnsResult {
    /// Returns the addresses the result rewrites to.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.rules.iter().filter_map(|rule| match rule.rewrite.value {
            RewriteValue::Addr(addr) => Some(addr),
            RewriteValue::Name(_) => None,
        })
    }

    /// Returns the canonical name if the request hit an alias.
    #[must_use]
    pub fn cname(&self) -> Option<&str> {
        self.names_of(RecordType::CNAME).next()
    }

    /// Returns the first host name for a PTR request.
    #[must_use]
    pub fn ptr(&self) -> Option<&str> {
        self.names_of(RecordType::PTR).next()
    }

    fn names_of(&self, rr_type: RecordType) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(move |rule| rule.rewrite.rr_type == rr_type)
            .filter_map(|rule| match &rule.rewrite.value {
                RewriteValue::Name(name) => Some(name.as_str()),
                RewriteValue::Addr(_) => None,
            })
    }

    /// Build the answer records for a request for `qname`.
    ///
    /// Records following a CNAME are owned by the CNAME's target. Rules with
    /// a response code other than `NOERROR` don't produce records.
    #[must_use]
    pub fn answers(&self, qname: &Name, ttl: u32) -> Vec<Record> {
        let mut owner = qname.clone();
        let mut records = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            if rule.rewrite.rcode != ResponseCode::NoError {
                continue;
            }

            let rdata = match &rule.rewrite.value {
                RewriteValue::Addr(IpAddr::V4(v4)) => RData::A(A(*v4)),
                RewriteValue::Addr(IpAddr::V6(v6)) => RData::AAAA(AAAA(*v6)),
                RewriteValue::Name(name) => {
                    let Ok(target) = Name::from_str(&fqdn(name)) else {
                        tracing::debug!(name, "can't build a record for invalid name");
                        continue;
                    };

                    if rule.rewrite.rr_type == RecordType::CNAME {
                        records.push(Record::from_rdata(
                            owner,
                            ttl,
                            RData::CNAME(CNAME(target.clone())),
                        ));
                        owner = target;
                        continue;
                    }

                    RData::PTR(PTR(target))
                }
            };

            records.push(Record::from_rdata(owner.clone(), ttl, rdata));
        }

        records
    }
}
