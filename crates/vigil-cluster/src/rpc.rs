//! Solana JSON-RPC implementation of the cluster queries.
//!
//! Deliberately thin: three RPC methods cover the whole interface.
//! `getHealth` answers self health, `getClusterNodes` answers gossip
//! presence, active-identity discovery, and peer liveness, and
//! `getVoteAccounts` answers delinquency. The control loop only ever
//! sees the [`ClusterQueries`] trait, so none of this leaks upward.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ProbeError;
use crate::probe::ClusterQueries;

/// JSON-RPC client against a validator RPC endpoint.
pub struct RpcClusterQueries {
    client: reqwest::Client,
    url: String,
    self_ip: Ipv4Addr,
    active_identity_pubkey: String,
    cancel: CancellationToken,
}

/// One entry of a `getClusterNodes` response.
#[derive(Debug, Deserialize)]
struct ClusterNode {
    pubkey: String,
    gossip: Option<String>,
}

/// Delinquent entry of a `getVoteAccounts` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteAccount {
    node_pubkey: String,
}

impl RpcClusterQueries {
    /// Builds a client with a per-call `timeout`.
    ///
    /// `cancel` is raced against every HTTP call, so shutdown never
    /// waits on a slow RPC endpoint.
    pub fn new(
        url: impl Into<String>,
        self_ip: Ipv4Addr,
        active_identity_pubkey: impl Into<String>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            self_ip,
            active_identity_pubkey: active_identity_pubkey.into(),
            cancel,
        })
    }

    async fn call(&self, method: &str) -> Result<Value, ProbeError> {
        // an in-flight response that is already ready still completes;
        // anything pending is abandoned once the token fires
        tokio::select! {
            biased;
            result = self.request(method) => result,
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
        }
    }

    async fn request(&self, method: &str) -> Result<Value, ProbeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [],
        });

        trace!(method, url = %self.url, "rpc call");
        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(ProbeError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| ProbeError::Malformed(format!("{method}: no result field")))
    }

    async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>, ProbeError> {
        let result = self.call("getClusterNodes").await?;
        serde_json::from_value(result)
            .map_err(|e| ProbeError::Malformed(format!("getClusterNodes: {e}")))
    }
}

#[async_trait]
impl ClusterQueries for RpcClusterQueries {
    async fn self_healthy(&self) -> Result<bool, ProbeError> {
        // getHealth reports an unhealthy node as a JSON-RPC error, not
        // as a result value
        match self.call("getHealth").await {
            Ok(result) => Ok(result == "ok"),
            Err(ProbeError::Rpc { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn self_in_gossip(&self) -> Result<bool, ProbeError> {
        let nodes = self.cluster_nodes().await?;
        Ok(nodes_contain_ip(&nodes, self.self_ip))
    }

    async fn self_delinquent(&self) -> Result<bool, ProbeError> {
        let result = self.call("getVoteAccounts").await?;
        let delinquent: Vec<VoteAccount> = result
            .get("delinquent")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ProbeError::Malformed(format!("getVoteAccounts: {e}")))?
            .unwrap_or_default();

        Ok(delinquent
            .iter()
            .any(|v| v.node_pubkey == self.active_identity_pubkey))
    }

    async fn active_peer_ips(&self) -> Result<BTreeSet<Ipv4Addr>, ProbeError> {
        let nodes = self.cluster_nodes().await?;
        Ok(nodes_with_pubkey(&nodes, &self.active_identity_pubkey))
    }

    async fn peer_alive(&self, ip: Ipv4Addr) -> Result<bool, ProbeError> {
        let nodes = self.cluster_nodes().await?;
        Ok(nodes_contain_ip(&nodes, ip))
    }
}

/// Extracts the IPv4 address of a `host:port` gossip endpoint.
fn gossip_ip(endpoint: &str) -> Option<Ipv4Addr> {
    endpoint.split(':').next()?.parse().ok()
}

fn nodes_contain_ip(nodes: &[ClusterNode], ip: Ipv4Addr) -> bool {
    nodes
        .iter()
        .filter_map(|n| n.gossip.as_deref().and_then(gossip_ip))
        .any(|node_ip| node_ip == ip)
}

fn nodes_with_pubkey(nodes: &[ClusterNode], pubkey: &str) -> BTreeSet<Ipv4Addr> {
    nodes
        .iter()
        .filter(|n| n.pubkey == pubkey)
        .filter_map(|n| n.gossip.as_deref().and_then(gossip_ip))
        .collect()
}
