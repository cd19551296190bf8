//! Probe facade over the cluster query interface.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use vigil_core::ClusterSnapshot;

use crate::error::ProbeError;

/// The questions the controller asks about the cluster each tick.
///
/// Every query is independent: a failure in one must not poison the
/// others, and each implementation applies its own timeout.
#[async_trait]
pub trait ClusterQueries: Send + Sync {
    /// Is the local validator process reporting healthy?
    async fn self_healthy(&self) -> Result<bool, ProbeError>;

    /// Is the local node visible in cluster gossip?
    async fn self_in_gossip(&self) -> Result<bool, ProbeError>;

    /// Is the HA identity currently delinquent (not voting recently)?
    async fn self_delinquent(&self) -> Result<bool, ProbeError>;

    /// IPs currently observed discharging the active role.
    async fn active_peer_ips(&self) -> Result<BTreeSet<Ipv4Addr>, ProbeError>;

    /// Is the peer at `ip` responsive, as far as we can tell?
    async fn peer_alive(&self, ip: Ipv4Addr) -> Result<bool, ProbeError>;
}

/// Per-tick snapshot producer with degraded-value semantics.
pub struct ClusterProbe {
    queries: Arc<dyn ClusterQueries>,
    known_peers: BTreeSet<Ipv4Addr>,
}

impl ClusterProbe {
    pub fn new(queries: Arc<dyn ClusterQueries>, known_peers: BTreeSet<Ipv4Addr>) -> Self {
        Self {
            queries,
            known_peers,
        }
    }

    /// Takes one snapshot of cluster state.
    ///
    /// Never fails: each query that errors collapses to its pessimistic
    /// value (`self_healthy=false`, `self_in_gossip=false`,
    /// `self_delinquent=true`, `active_peers=∅`), and a peer whose
    /// liveness cannot be determined stays in `alive_peers` because it
    /// might still outrank us at takeover time.
    pub async fn snapshot(&self) -> ClusterSnapshot {
        let taken_at = Instant::now();

        let self_healthy = match self.queries.self_healthy().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "health query failed, assuming unhealthy");
                false
            }
        };

        let self_in_gossip = match self.queries.self_in_gossip().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "gossip query failed, assuming absent");
                false
            }
        };

        let self_delinquent = match self.queries.self_delinquent().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "delinquency query failed, assuming delinquent");
                true
            }
        };

        let active_peers = match self.queries.active_peer_ips().await {
            // only configured peers count; anything else in gossip is noise
            Ok(ips) => ips.intersection(&self.known_peers).copied().collect(),
            Err(e) => {
                warn!(error = %e, "active peer query failed, assuming none visible");
                BTreeSet::new()
            }
        };

        let mut alive_peers = BTreeSet::new();
        for peer in &self.known_peers {
            match self.queries.peer_alive(*peer).await {
                Ok(true) => {
                    alive_peers.insert(*peer);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(peer = %peer, error = %e, "liveness query failed, keeping peer as candidate");
                    alive_peers.insert(*peer);
                }
            }
        }

        ClusterSnapshot {
            taken_at,
            self_healthy,
            self_in_gossip,
            self_delinquent,
            active_peers,
            alive_peers,
            known_peers: self.known_peers.clone(),
        }
    }
}
