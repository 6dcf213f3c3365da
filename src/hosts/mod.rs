//! Hosts file handling.
//!
//! This module turns the content of hosts files into the data the container
//! serves:
//!
//! - [`parse_line`] extracts the address and host names of a single line
//! - [`HostTable`] keeps the canonical main host and aliases of each address
//! - [`RuleSynthesizer`] writes `$dnsrewrite` rules and their translations
//! - [`HostsFs`] abstracts the file system the hosts files live in
//!
//! # Example
//!
//! ```
//! use hosts_container::hosts::RuleSynthesizer;
//! use std::io::BufReader;
//!
//! let content = "# Comment\n192.0.2.1 router router.lan\n";
//! let mut synth = RuleSynthesizer::default();
//! synth.parse_reader(&mut BufReader::new(content.as_bytes())).unwrap();
//!
//! assert_eq!(synth.table().len(), 1);
//! assert_eq!(synth.rules_text().lines().count(), 3);
//! ```

pub mod fs;
mod parser;
mod synth;
mod table;

pub use fs::{DirFs, EntryKind, HostsFs, PathPattern, paths_to_patterns, resolve_in};
pub use parser::{InvalidName, parse_line, validate_domain_name};
pub use synth::{GeneratedRule, RuleSynthesizer, fqdn, reverse_name};
pub use table::{AddOutcome, HostRecord, HostTable};
