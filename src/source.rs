//! Labeled prefix sets consumed by the compiler.

use std::collections::BTreeMap;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::selector::normalize_label;
use crate::IpScope;

/// Read-only access to labeled prefix sets.
///
/// The compiler only ever asks for the list of labels and for the prefixes
/// of a single label; it never mutates the source.
pub trait PrefixSource {
    /// All labels known to the source, sorted ascending.
    fn labels(&self) -> Vec<String>;

    /// The prefix set of a label, or `None` if the label is unknown.
    fn get(&self, label: &str) -> Option<&PrefixSet>;
}

/// Non-overlapping IPv4 and IPv6 prefixes of one label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    ipv4: Vec<Ipv4Net>,
    ipv6: Vec<Ipv6Net>,
}

impl PrefixSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary (possibly overlapping) prefixes.
    pub fn from_prefixes<I: IntoIterator<Item = IpNet>>(prefixes: I) -> Self {
        let mut set = Self::new();
        set.extend(prefixes);
        set
    }

    /// Add prefixes and re-aggregate.
    ///
    /// Aggregation runs over the whole set on every call, so pass prefixes in
    /// batches rather than one at a time.
    pub fn extend<I: IntoIterator<Item = IpNet>>(&mut self, prefixes: I) {
        for net in prefixes {
            match net {
                IpNet::V4(v4) => self.ipv4.push(v4),
                IpNet::V6(v6) => match ipv4_mapped(&v6) {
                    Some(v4) => self.ipv4.push(v4),
                    None => self.ipv6.push(v6),
                },
            }
        }
        self.ipv4 = Ipv4Net::aggregate(&self.ipv4);
        self.ipv6 = Ipv6Net::aggregate(&self.ipv6);
    }

    /// Add a single prefix.
    pub fn insert(&mut self, net: IpNet) {
        self.extend(std::iter::once(net));
    }

    /// Aggregated IPv4 prefixes, sorted by address.
    pub fn ipv4(&self) -> &[Ipv4Net] {
        &self.ipv4
    }

    /// Aggregated IPv6 prefixes, sorted by address.
    pub fn ipv6(&self) -> &[Ipv6Net] {
        &self.ipv6
    }

    /// Prefixes of the families allowed by `scope`, IPv4 first.
    pub fn prefixes(&self, scope: IpScope) -> impl Iterator<Item = IpNet> + '_ {
        let v4 = self
            .ipv4
            .iter()
            .filter(move |_| scope.includes_v4())
            .map(|n| IpNet::V4(*n));
        let v6 = self
            .ipv6
            .iter()
            .filter(move |_| scope.includes_v6())
            .map(|n| IpNet::V6(*n));
        v4.chain(v6)
    }

    /// Drop every prefix outside `scope`.
    pub fn retain_scope(&mut self, scope: IpScope) {
        if !scope.includes_v4() {
            self.ipv4.clear();
        }
        if !scope.includes_v6() {
            self.ipv6.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

/// `::ffff:a.b.c.d/n` with n >= 96 is an IPv4 network in disguise.
fn ipv4_mapped(net: &Ipv6Net) -> Option<Ipv4Net> {
    if net.prefix_len() < 96 {
        return None;
    }
    let v4 = net.network().to_ipv4_mapped()?;
    Ipv4Net::new(v4, net.prefix_len() - 96).ok()
}

/// In-memory prefix source keyed by normalized label.
#[derive(Debug, Clone, Default)]
pub struct Container {
    entries: BTreeMap<String, PrefixSet>,
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add prefixes to a label, creating the entry if needed.
    ///
    /// Returns `false` if the label is empty after normalization.
    pub fn add<I: IntoIterator<Item = IpNet>>(&mut self, label: &str, prefixes: I) -> bool {
        let Some(label) = normalize_label(label) else {
            return false;
        };
        self.entries.entry(label).or_default().extend(prefixes);
        true
    }

    /// Insert a prefix set, merging with an existing entry of the same label.
    pub fn add_set(&mut self, label: &str, set: PrefixSet) -> bool {
        let Some(label) = normalize_label(label) else {
            return false;
        };
        match self.entries.get_mut(&label) {
            Some(existing) => {
                existing.extend(set.prefixes(IpScope::Any).collect::<Vec<_>>());
            }
            None => {
                self.entries.insert(label, set);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PrefixSource for Container {
    fn labels(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn get(&self, label: &str) -> Option<&PrefixSet> {
        self.entries.get(label)
    }
}
