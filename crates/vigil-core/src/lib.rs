//! vigil-core: pure failover logic for the vigil HA controller.
//!
//! This crate holds everything that can be reasoned about without IO:
//!
//! - **Peer registry**: the configured peer set and the deterministic
//!   rank derived from it, the only implicit coordination mechanism
//!   between instances
//! - **Cluster snapshot**: the tick-scoped view of self health and peer
//!   activity the control loop feeds to the decision engine
//! - **Decision engine**: the role state machine that maps
//!   (current role, snapshot, timers) to a desired role
//! - **Templates**: the fixed five-field data record role commands are
//!   rendered against
//!
//! Nothing here spawns processes, opens sockets, or sleeps. The one
//! impure corner is takeover-jitter sampling inside
//! [`FailoverTimers::set`], which the decision laws explicitly carve out.

mod decision;
mod peers;
mod role;
mod snapshot;
pub mod template;

pub use decision::{
    decide, Decision, DecisionInputs, DecisionParams, DecisionReason, FailoverTimers, SideEffect,
};
pub use peers::{Peer, PeerRegistry, RegistryError};
pub use role::{NodeRole, RoleKind};
pub use snapshot::ClusterSnapshot;
pub use template::{TemplateData, TemplateError};
