//! Binary search tree over address bits.
//!
//! Nodes live in an arena and reference each other by index. Insertion walks
//! the prefix bits from the most significant one, splitting leaves and empty
//! slots into internal nodes on the way, and finally points the slot for the
//! last prefix bit at the record. Whatever was below that slot is discarded,
//! so a later insertion always wins over the range it covers.

use std::collections::VecDeque;
use std::net::IpAddr;

use ipnet::IpNet;

use super::format::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::{Error, Result};

/// Reference stored in one of the two slots of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// No data for this range
    Empty,
    /// Internal node (arena index)
    Node(u32),
    /// Offset into the data section
    Record(u32),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    children: [NodeRef; 2],
}

/// Networks that alias the IPv4 subtree (::/96) in an IPv6 tree.
const IPV4_ALIASES: [(u128, u8); 3] = [
    // ::ffff:0:0/96, IPv4-mapped
    (0xFFFF << 32, 96),
    // 2001::/32, Teredo
    (0x2001 << 112, 32),
    // 2002::/16, 6to4
    (0x2002 << 112, 16),
];

/// Mutable search tree used while inserting prefixes.
pub struct TrieBuilder {
    ip_version: IpVersion,
    nodes: Vec<Node>,
    has_ipv4: bool,
    inserted: usize,
}

impl TrieBuilder {
    /// Create an empty tree with a root node.
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            ip_version,
            nodes: vec![Node {
                children: [NodeRef::Empty; 2],
            }],
            has_ipv4: false,
            inserted: 0,
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Number of prefixes inserted so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Point every address of `net` at the record at `data_offset`.
    pub fn insert(&mut self, net: IpNet, data_offset: u32) -> Result<()> {
        let (bits, len) = self.tree_bits(&net)?;
        self.set(bits, len, NodeRef::Record(data_offset));
        self.has_ipv4 |= matches!(net, IpNet::V4(_));
        self.inserted += 1;
        Ok(())
    }

    /// Record offset an address resolves to, if any.
    pub fn lookup(&self, addr: IpAddr) -> Option<u32> {
        let (bits, len) = address_bits(self.ip_version, addr)?;
        let mut current = NodeRef::Node(0);
        for depth in 0..len {
            match current {
                NodeRef::Node(id) => {
                    current = self.nodes[id as usize].children[bit_at(bits, depth)];
                }
                _ => break,
            }
        }
        match current {
            NodeRef::Record(offset) => Some(offset),
            _ => None,
        }
    }

    /// Alias the IPv4 subtree, drop unreachable nodes, collapse redundant
    /// nodes and number the rest breadth-first.
    pub fn finish(mut self) -> SearchTree {
        if self.ip_version == IpVersion::V6 && self.has_ipv4 {
            self.alias_ipv4();
        }
        let mut memo = vec![None; self.nodes.len()];
        self.simplify(0, &mut memo);
        self.renumber()
    }

    fn tree_bits(&self, net: &IpNet) -> Result<(u128, u8)> {
        match (net, self.ip_version) {
            (IpNet::V4(v4), IpVersion::V4) => {
                Ok(((u32::from(v4.network()) as u128) << 96, v4.prefix_len()))
            }
            // IPv4 lives in ::a.b.c.d of an IPv6 tree.
            (IpNet::V4(v4), IpVersion::V6) => {
                Ok((u32::from(v4.network()) as u128, 96 + v4.prefix_len()))
            }
            (IpNet::V6(v6), IpVersion::V6) => Ok((u128::from(v6.network()), v6.prefix_len())),
            (IpNet::V6(v6), IpVersion::V4) => Err(Error::Encoding(format!(
                "cannot insert IPv6 network {} into an IPv4 tree",
                v6
            ))),
        }
    }

    fn set(&mut self, bits: u128, len: u8, value: NodeRef) {
        if len == 0 {
            self.nodes[0].children = [value; 2];
            return;
        }

        let mut node = 0usize;
        for depth in 0..len - 1 {
            let bit = bit_at(bits, depth);
            node = match self.nodes[node].children[bit] {
                NodeRef::Node(id) => id as usize,
                leaf => {
                    // Split: both halves keep what the slot covered before.
                    let id = self.allocate([leaf; 2]);
                    self.nodes[node].children[bit] = NodeRef::Node(id);
                    id as usize
                }
            };
        }
        self.nodes[node].children[bit_at(bits, len - 1)] = value;
    }

    fn allocate(&mut self, children: [NodeRef; 2]) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node { children });
        id
    }

    /// Slot reached after following `len` bits of `bits` through internal
    /// nodes only.
    fn slot_at(&self, bits: u128, len: u8) -> Option<NodeRef> {
        let mut current = NodeRef::Node(0);
        for depth in 0..len {
            match current {
                NodeRef::Node(id) => {
                    current = self.nodes[id as usize].children[bit_at(bits, depth)];
                }
                _ => return None,
            }
        }
        Some(current)
    }

    fn alias_ipv4(&mut self) {
        let ipv4_root = match self.slot_at(0, 96) {
            Some(NodeRef::Empty) | None => return,
            Some(slot) => slot,
        };
        for (bits, len) in IPV4_ALIASES {
            self.set(bits, len, ipv4_root);
        }
    }

    /// Post-order pass replacing nodes whose slots hold the same leaf with
    /// that leaf. The root always stays a node.
    fn simplify(&mut self, id: u32, memo: &mut [Option<NodeRef>]) -> NodeRef {
        if let Some(done) = memo[id as usize] {
            return done;
        }

        let mut children = self.nodes[id as usize].children;
        for child in children.iter_mut() {
            if let NodeRef::Node(child_id) = *child {
                *child = self.simplify(child_id, memo);
            }
        }
        self.nodes[id as usize].children = children;

        let result = match children {
            [a, b] if id != 0 && a == b && !matches!(a, NodeRef::Node(_)) => a,
            _ => NodeRef::Node(id),
        };
        memo[id as usize] = Some(result);
        result
    }

    fn renumber(self) -> SearchTree {
        let mut new_ids: Vec<Option<u32>> = vec![None; self.nodes.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([0u32]);
        new_ids[0] = Some(0);

        while let Some(old) = queue.pop_front() {
            order.push(old);
            for child in self.nodes[old as usize].children {
                if let NodeRef::Node(child_id) = child {
                    if new_ids[child_id as usize].is_none() {
                        new_ids[child_id as usize] = Some((order.len() + queue.len()) as u32);
                        queue.push_back(child_id);
                    }
                }
            }
        }

        let nodes = order
            .into_iter()
            .map(|old| {
                self.nodes[old as usize].children.map(|child| match child {
                    NodeRef::Node(child_id) => {
                        NodeRef::Node(new_ids[child_id as usize].unwrap_or_default())
                    }
                    leaf => leaf,
                })
            })
            .collect();

        SearchTree {
            ip_version: self.ip_version,
            nodes,
        }
    }
}

/// Finished, compacted search tree ready for serialization.
#[derive(Debug, Clone)]
pub struct SearchTree {
    ip_version: IpVersion,
    nodes: Vec<[NodeRef; 2]>,
}

impl SearchTree {
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Record offset an address resolves to, if any.
    pub fn lookup(&self, addr: IpAddr) -> Option<u32> {
        let (bits, len) = address_bits(self.ip_version, addr)?;
        let mut current = NodeRef::Node(0);
        for depth in 0..len {
            match current {
                NodeRef::Node(id) => current = self.nodes[id as usize][bit_at(bits, depth)],
                _ => break,
            }
        }
        match current {
            NodeRef::Record(offset) => Some(offset),
            _ => None,
        }
    }

    /// Distinct record offsets referenced by the tree, sorted.
    pub fn record_offsets(&self) -> Vec<u32> {
        let mut offsets: Vec<u32> = self
            .nodes
            .iter()
            .flatten()
            .filter_map(|slot| match slot {
                NodeRef::Record(offset) => Some(*offset),
                _ => None,
            })
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    /// Number of slots pointing at a given record offset.
    pub fn leaves_for(&self, offset: u32) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|slot| **slot == NodeRef::Record(offset))
            .count()
    }

    /// Largest value any record can take given the data section length.
    pub fn max_record_value(&self, data_len: usize) -> u64 {
        self.nodes.len() as u64 + DATA_SECTION_SEPARATOR_SIZE as u64 + data_len as u64
    }

    /// Serialize the node array.
    pub fn to_bytes(&self, record_size: RecordSize) -> Result<Vec<u8>> {
        let node_count = self.nodes.len() as u64;
        let node_bytes = record_size.node_bytes();
        let mut out = vec![0u8; self.nodes.len() * node_bytes];

        for (i, [left, right]) in self.nodes.iter().enumerate() {
            let left = record_value(*left, node_count, record_size)?;
            let right = record_value(*right, node_count, record_size)?;
            record_size.write_node(&mut out[i * node_bytes..(i + 1) * node_bytes], left, right);
        }

        Ok(out)
    }
}

fn record_value(slot: NodeRef, node_count: u64, record_size: RecordSize) -> Result<u32> {
    let value = match slot {
        NodeRef::Empty => node_count,
        NodeRef::Node(id) => id as u64,
        NodeRef::Record(offset) => node_count + DATA_SECTION_SEPARATOR_SIZE as u64 + offset as u64,
    };
    if value > record_size.max_value() {
        return Err(Error::Encoding(format!(
            "record value {} does not fit in {}-bit records",
            value,
            record_size.bits()
        )));
    }
    Ok(value as u32)
}

fn address_bits(ip_version: IpVersion, addr: IpAddr) -> Option<(u128, u8)> {
    match (addr, ip_version) {
        (IpAddr::V4(v4), IpVersion::V4) => Some(((u32::from(v4) as u128) << 96, 32)),
        (IpAddr::V4(v4), IpVersion::V6) => Some((u32::from(v4) as u128, 128)),
        (IpAddr::V6(v6), IpVersion::V6) => Some((u128::from(v6), 128)),
        (IpAddr::V6(_), IpVersion::V4) => None,
    }
}

/// Bit at `depth`, counting from the most significant bit.
fn bit_at(bits: u128, depth: u8) -> usize {
    ((bits >> (127 - depth as u32)) & 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_more_specific_after_less_specific() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("10.0.0.0/8"), 1).unwrap();
        builder.insert(net("10.1.0.0/16"), 2).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("10.1.2.3")), Some(2));
        assert_eq!(tree.lookup(ip("10.1.255.255")), Some(2));
        assert_eq!(tree.lookup(ip("10.0.0.1")), Some(1));
        assert_eq!(tree.lookup(ip("10.2.0.0")), Some(1));
        assert_eq!(tree.lookup(ip("10.255.255.255")), Some(1));
        assert_eq!(tree.lookup(ip("11.0.0.0")), None);
    }

    #[test]
    fn test_later_covering_prefix_replaces_subtree() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("10.1.0.0/16"), 2).unwrap();
        builder.insert(net("10.0.0.0/8"), 1).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("10.1.2.3")), Some(1));
        assert_eq!(tree.lookup(ip("10.0.0.1")), Some(1));
        // Orphaned /16 nodes are gone: same shape as a lone /8.
        assert_eq!(tree.node_count(), 8);
    }

    #[test]
    fn test_equal_prefix_last_write_wins() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("192.0.2.0/24"), 1).unwrap();
        builder.insert(net("192.0.2.0/24"), 2).unwrap();

        assert_eq!(builder.lookup(ip("192.0.2.10")), Some(2));
    }

    #[test]
    fn test_uncovered_addresses_have_no_record() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("192.0.2.0/24"), 5).unwrap();

        assert_eq!(builder.lookup(ip("192.0.3.0")), None);
        assert_eq!(builder.lookup(ip("0.0.0.0")), None);
        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("192.0.1.255")), None);
        assert_eq!(tree.lookup(ip("192.0.2.255")), Some(5));
    }

    #[test]
    fn test_siblings_with_same_record_collapse() {
        let mut split = TrieBuilder::new(IpVersion::V4);
        split.insert(net("10.0.0.0/9"), 1).unwrap();
        split.insert(net("10.128.0.0/9"), 1).unwrap();

        let mut whole = TrieBuilder::new(IpVersion::V4);
        whole.insert(net("10.0.0.0/8"), 1).unwrap();

        assert_eq!(split.finish().node_count(), whole.finish().node_count());
    }

    #[test]
    fn test_default_route() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("0.0.0.0/0"), 7).unwrap();
        builder.insert(net("8.8.8.0/24"), 9).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("1.1.1.1")), Some(7));
        assert_eq!(tree.lookup(ip("8.8.8.8")), Some(9));
    }

    #[test]
    fn test_ipv6_into_ipv4_tree_fails() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        assert!(matches!(
            builder.insert(net("2001:db8::/32"), 1),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_ipv4_in_ipv6_tree_and_aliases() {
        let mut builder = TrieBuilder::new(IpVersion::V6);
        builder.insert(net("192.0.2.0/24"), 3).unwrap();
        builder.insert(net("2001:db8::/32"), 4).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("192.0.2.1")), Some(3));
        assert_eq!(tree.lookup(ip("::192.0.2.1")), Some(3));
        assert_eq!(tree.lookup(ip("::ffff:192.0.2.1")), Some(3));
        assert_eq!(tree.lookup(ip("2002:c000:0201::1")), Some(3));
        assert_eq!(tree.lookup(ip("2001:0:c000:0201::")), Some(3));
        assert_eq!(tree.lookup(ip("2001:0:c633:6401::")), None);
        assert_eq!(tree.lookup(ip("2001:db8::1")), Some(4));
        assert_eq!(tree.lookup(ip("::ffff:198.51.100.1")), None);
        assert_eq!(tree.lookup(ip("2001:db9::1")), None);
    }

    #[test]
    fn test_no_aliases_without_ipv4() {
        let mut builder = TrieBuilder::new(IpVersion::V6);
        builder.insert(net("2001:db8::/32"), 4).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.lookup(ip("2002::1")), None);
        assert_eq!(tree.lookup(ip("2001:0:c000:0201::")), None);
        assert_eq!(tree.node_count(), 32);
    }

    #[test]
    fn test_empty_tree() {
        let tree = TrieBuilder::new(IpVersion::V4).finish();
        assert_eq!(tree.node_count(), 1);

        let bytes = tree.to_bytes(RecordSize::Bits24).unwrap();
        // Both records point at node_count (= 1): "no data".
        assert_eq!(bytes, vec![0, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn test_serialized_record_values() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("128.0.0.0/1"), 0).unwrap();
        let tree = builder.finish();
        assert_eq!(tree.node_count(), 1);

        let bytes = tree.to_bytes(RecordSize::Bits32).unwrap();
        // Left: empty (1). Right: data offset 0 => 1 + 16.
        assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 17]);
    }

    #[test]
    fn test_record_value_overflow() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("128.0.0.0/1"), 1 << 24).unwrap();
        let tree = builder.finish();

        assert!(tree.to_bytes(RecordSize::Bits24).is_err());
        assert!(tree.to_bytes(RecordSize::Bits28).is_ok());
    }

    #[test]
    fn test_record_offsets_and_leaves() {
        let mut builder = TrieBuilder::new(IpVersion::V4);
        builder.insert(net("10.0.0.0/8"), 0).unwrap();
        builder.insert(net("172.16.0.0/12"), 0).unwrap();
        builder.insert(net("192.168.0.0/16"), 20).unwrap();

        let tree = builder.finish();
        assert_eq!(tree.record_offsets(), vec![0, 20]);
        assert_eq!(tree.leaves_for(0), 2);
        assert_eq!(tree.leaves_for(20), 1);
    }
}
