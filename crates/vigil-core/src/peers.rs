//! Peer registry and deterministic rank.
//!
//! Every instance loads the same peer list and derives the same rank
//! from it: peers sorted by the lexicographic order of their IPv4
//! strings, ranked `1..=N` ascending. Rank is the only coordination
//! mechanism the instances share, so it must come out identical on
//! every node that loaded the same configuration.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// A configured peer validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub ip: Ipv4Addr,
}

/// Errors building a [`PeerRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("at least one peer must be defined")]
    Empty,

    #[error("duplicate IP address {ip} found for peer {name}")]
    DuplicateIp { name: String, ip: Ipv4Addr },

    #[error("duplicate peer name {0}")]
    DuplicateName(String),
}

/// Immutable set of peers, keyed by name, with rank derived at
/// construction time.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    peers: BTreeMap<String, Peer>,
    /// IPs sorted lexicographically ascending by string form. The
    /// string sort is deliberate: it matches what every other instance
    /// computes, which matters more than numeric order.
    ranked: Vec<Ipv4Addr>,
}

impl PeerRegistry {
    /// Builds a registry from a peer list.
    ///
    /// Fails on an empty list, a repeated name, or a repeated IP.
    pub fn new(peers: impl IntoIterator<Item = Peer>) -> Result<Self, RegistryError> {
        let mut by_name = BTreeMap::new();
        let mut seen_ips = BTreeMap::new();

        for peer in peers {
            if seen_ips.contains_key(&peer.ip) {
                return Err(RegistryError::DuplicateIp {
                    name: peer.name,
                    ip: peer.ip,
                });
            }
            seen_ips.insert(peer.ip, ());
            if by_name.insert(peer.name.clone(), peer.clone()).is_some() {
                return Err(RegistryError::DuplicateName(peer.name));
            }
        }

        if by_name.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut ranked: Vec<Ipv4Addr> = by_name.values().map(|p| p.ip).collect();
        ranked.sort_by_key(|ip| ip.to_string());

        Ok(Self {
            peers: by_name,
            ranked,
        })
    }

    /// 1-based rank of `ip`, or `None` if the IP is not a configured peer.
    pub fn rank(&self, ip: Ipv4Addr) -> Option<usize> {
        self.ranked.iter().position(|r| *r == ip).map(|i| i + 1)
    }

    /// All peer IPs in rank order.
    pub fn ips(&self) -> &[Ipv4Addr] {
        &self.ranked
    }

    /// Returns `true` if `ip` belongs to a configured peer.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.ranked.contains(&ip)
    }

    /// Returns `true` if a peer with this name is configured.
    pub fn has_name(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    /// Number of configured peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterates peers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }
}
