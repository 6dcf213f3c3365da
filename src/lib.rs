//! Hosts container - serve hosts files as DNS rewrite rules.
//!
//! The container reads operating-system hosts files, turns every entry into
//! `$dnsrewrite` rules answering A, AAAA and PTR requests, and keeps those
//! rules in sync with the files while they change.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`hosts`]: Hosts file parsing, tables and rule synthesis
//! - [`rules`]: Rule engine abstraction and the `$dnsrewrite` engine
//! - [`matcher`]: Thread-safe matching against the active engine
//! - [`updates`]: Feed of committed hosts tables
//! - [`watch`]: File-system change notifications
//! - [`container`]: Refresh cycle and watch loop orchestration
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The file system, the watcher and the rule engine are trait-based
//! abstractions, so every component can be tested without touching the
//! disk:
//!
//! ```rust
//! use hosts_container::hosts::RuleSynthesizer;
//! use hosts_container::rules::{DnsRequest, RewriteEngine, RuleEngine};
//! use hickory_proto::rr::RecordType;
//!
//! let mut synth = RuleSynthesizer::default();
//! synth.add_pairs("192.0.2.1".parse().unwrap(), &["router", "router.lan"]);
//!
//! let engine = RewriteEngine::compile(1, synth.rules_text()).unwrap();
//! let res = engine.match_request(&DnsRequest::new("router.lan", RecordType::A)).unwrap();
//! assert_eq!(res.cname(), Some("router"));
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod hosts;
pub mod matcher;
pub mod metrics;
pub mod rules;
pub mod updates;
pub mod watch;

pub use config::Config;
pub use container::HostsContainer;
pub use error::{Error, Result};
