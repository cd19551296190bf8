//! vigil-cluster: cluster observation for the vigil HA controller.
//!
//! The control loop never talks to the chain directly. It asks a
//! [`ClusterProbe`] for a snapshot once per tick; the probe fans the
//! request out over the [`ClusterQueries`] interface and collapses any
//! single-source failure into that field's pessimistic degraded value,
//! so impaired visibility translates into conservative decisions rather
//! than errors.
//!
//! [`RpcClusterQueries`] is the production implementation, a thin
//! JSON-RPC client against the local validator's RPC port. Tests supply
//! their own `ClusterQueries`.

mod error;
mod probe;
mod rpc;

pub use error::ProbeError;
pub use probe::{ClusterProbe, ClusterQueries};
pub use rpc::RpcClusterQueries;
