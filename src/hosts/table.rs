//! Canonical address-to-hosts table.

use std::collections::hash_map::{Entry, Iter};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::IpAddr;

/// All the names bound to a single address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    /// The first name seen for the address.
    pub main: String,
    /// Every other distinct name seen for the address.
    pub aliases: BTreeSet<String>,
}

impl HostRecord {
    fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            aliases: BTreeSet::new(),
        }
    }
}

/// Result of adding an address-host pair to a [`HostTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The host is the first one for the address and became its main host.
    First,
    /// The host is a new alias of `main`.
    Alias { main: String },
    /// The pair is already known.
    Duplicate,
}

/// Hosts table built from hosts files within a single refresh.
///
/// Maps each address to its [`HostRecord`]. Equality ignores iteration
/// order, so two tables built from the same content always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTable {
    entries: HashMap<IpAddr, HostRecord>,
}

impl HostTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table able to hold `capacity` addresses without
    /// reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Add the address-host pair.
    ///
    /// The first host added for an address becomes its main host, every
    /// later distinct host becomes an alias. IPv4-mapped IPv6 addresses are
    /// stored as IPv4.
    ///
    /// # Example
    ///
    /// ```
    /// use hosts_container::hosts::{AddOutcome, HostTable};
    ///
    /// let mut table = HostTable::new();
    /// let ip = "10.0.0.1".parse().unwrap();
    ///
    /// assert_eq!(table.add(ip, "a"), AddOutcome::First);
    /// assert_eq!(table.add(ip, "b"), AddOutcome::Alias { main: "a".into() });
    /// assert_eq!(table.add(ip, "a"), AddOutcome::Duplicate);
    /// ```
    pub fn add(&mut self, ip: IpAddr, host: &str) -> AddOutcome {
        let record = match self.entries.entry(ip.to_canonical()) {
            Entry::Vacant(entry) => {
                entry.insert(HostRecord::new(host));
                return AddOutcome::First;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        if record.main == host || record.aliases.contains(host) {
            return AddOutcome::Duplicate;
        }

        record.aliases.insert(host.to_string());
        AddOutcome::Alias {
            main: record.main.clone(),
        }
    }

    /// Get the record for the address.
    #[must_use]
    pub fn get(&self, ip: &IpAddr) -> Option<&HostRecord> {
        self.entries.get(&ip.to_canonical())
    }

    /// Returns the number of addresses in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the addresses and their records in arbitrary order.
    pub fn iter(&self) -> Iter<'_, IpAddr, HostRecord> {
        self.entries.iter()
    }

    /// Render the hosts-syntax line for the address: `ip main alias...`.
    #[must_use]
    pub fn hosts_line(&self, ip: &IpAddr) -> Option<String> {
        self.get(ip).map(|record| HostsLine { ip, record }.to_string())
    }
}

impl<'a> IntoIterator for &'a HostTable {
    type Item = (&'a IpAddr, &'a HostRecord);
    type IntoIter = Iter<'a, IpAddr, HostRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct HostsLine<'a> {
    ip: &'a IpAddr,
    record: &'a HostRecord,
}

impl fmt::Display for HostsLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ip, self.record.main)?;
        for alias in &self.record.aliases {
            write!(f, " {alias}")?;
        }
        Ok(())
    }
}
