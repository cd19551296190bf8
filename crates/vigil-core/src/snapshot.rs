//! Tick-scoped view of cluster state.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Instant;

/// Immutable cluster observation taken at the start of a tick.
///
/// `active_peers` is the subset of `known_peers` currently observed
/// discharging the active role. `alive_peers` is the subset the probe
/// believes responsive; peers whose liveness could not be determined
/// are kept in the set, since an unreachable peer might still outrank
/// us at takeover time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub taken_at: Instant,
    pub self_healthy: bool,
    pub self_in_gossip: bool,
    pub self_delinquent: bool,
    pub active_peers: BTreeSet<Ipv4Addr>,
    pub alive_peers: BTreeSet<Ipv4Addr>,
    pub known_peers: BTreeSet<Ipv4Addr>,
}

impl ClusterSnapshot {
    /// Snapshot with every field at its pessimistic degraded value.
    ///
    /// Used when visibility is impaired: the decision engine then sees
    /// an unhealthy, gossip-absent, delinquent self with no visible
    /// active peer, and every known peer still counted as alive.
    pub fn degraded(taken_at: Instant, known_peers: BTreeSet<Ipv4Addr>) -> Self {
        Self {
            taken_at,
            self_healthy: false,
            self_in_gossip: false,
            self_delinquent: true,
            active_peers: BTreeSet::new(),
            alive_peers: known_peers.clone(),
            known_peers,
        }
    }

    /// Returns `true` if any peer other than `self_ip` is observed active.
    pub fn other_active_visible(&self, self_ip: Ipv4Addr) -> bool {
        self.active_peers.iter().any(|ip| *ip != self_ip)
    }
}
