//! Role decision state machine.
//!
//! Once per tick the control loop hands the engine its current role and
//! a fresh [`ClusterSnapshot`]; the engine answers with the role the
//! node should hold and why. The rules, in evaluation order:
//!
//! 1. `Unknown` (bootstrap) always resolves to `Passive` — a node never
//!    boots straight into the voting role.
//! 2. An `Active` node demotes itself when it is unfit (unhealthy,
//!    delinquent, or absent from gossip) or when a lower-ranked peer is
//!    also asserting the active role. Lower rank wins the tie, so when
//!    two nodes briefly both believe they are active, the higher-ranked
//!    one yields within a tick.
//! 3. A `Passive` node takes over only when it is fit, no other peer
//!    has been visible as active for the leaderless threshold plus a
//!    sampled jitter, and it holds the lowest rank among peers still
//!    believed alive. The jitter de-correlates two standbys whose
//!    leaderless timers started on the same tick.
//!
//! The function is pure: identical inputs produce identical outputs.
//! Jitter sampling is the one impure step and lives in
//! [`FailoverTimers::set`], invoked by the caller when the engine asks
//! for it via [`SideEffect::SetLeaderless`].

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::peers::PeerRegistry;
use crate::role::{NodeRole, RoleKind};
use crate::snapshot::ClusterSnapshot;

/// Tunables the engine consults each tick.
#[derive(Debug, Clone, Copy)]
pub struct DecisionParams {
    /// How long the cluster must look leaderless before takeover.
    pub leaderless_threshold: Duration,
    /// Upper bound of the per-episode takeover jitter.
    pub takeover_jitter_max: Duration,
}

/// Per-tick inputs that are not part of the snapshot itself.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub self_ip: Ipv4Addr,
    pub registry: &'a PeerRegistry,
    pub params: DecisionParams,
}

/// Why the engine chose the role it chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// First tick; a node always bootstraps passive.
    Bootstrap,
    /// Self failed a fitness check (health, gossip, delinquency).
    SelfUnfit,
    /// A lower-ranked peer is also active; yield to it.
    YieldToLowerRank,
    /// Another peer is discharging the active role.
    ActivePeerVisible,
    /// Leaderless, but the takeover delay has not elapsed.
    LeaderlessWait,
    /// Leaderless threshold plus jitter elapsed and self has the lowest
    /// alive rank.
    Takeover,
    /// Nothing to do.
    Steady,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Bootstrap => "bootstrap",
            DecisionReason::SelfUnfit => "self_unfit",
            DecisionReason::YieldToLowerRank => "yield_to_lower_rank",
            DecisionReason::ActivePeerVisible => "active_peer_visible",
            DecisionReason::LeaderlessWait => "leaderless_wait",
            DecisionReason::Takeover => "takeover",
            DecisionReason::Steady => "steady",
        }
    }
}

/// Timer mutation the caller must apply after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    /// Start the leaderless timer (samples a fresh jitter).
    SetLeaderless,
    /// An active peer reappeared; discard the leaderless timer.
    ClearLeaderless,
}

/// The engine's verdict for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub desired_role: RoleKind,
    pub reason: DecisionReason,
    pub side_effect: SideEffect,
}

impl Decision {
    fn passive(reason: DecisionReason, side_effect: SideEffect) -> Self {
        Self {
            desired_role: RoleKind::Passive,
            reason,
            side_effect,
        }
    }

    fn active(reason: DecisionReason) -> Self {
        Self {
            desired_role: RoleKind::Active,
            reason,
            side_effect: SideEffect::None,
        }
    }
}

/// Leaderless observation slot plus the jitter sampled for the episode.
///
/// Set on the first tick with no visible active peer, cleared when one
/// reappears or self becomes active. The jitter is resampled only on a
/// clear-and-reset, never while an episode is running.
#[derive(Debug, Clone, Default)]
pub struct FailoverTimers {
    first_observed_at: Option<Instant>,
    jitter: Duration,
}

impl FailoverTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the leaderless episode at `now`, sampling a jitter in
    /// `[0, jitter_max)`. No-op if an episode is already running.
    pub fn set(&mut self, now: Instant, jitter_max: Duration) {
        let jitter = if jitter_max.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_max.as_millis() as u64))
        };
        self.set_with_jitter(now, jitter);
    }

    /// Starts the episode with an explicit jitter. No-op when already set.
    pub fn set_with_jitter(&mut self, now: Instant, jitter: Duration) {
        if self.first_observed_at.is_none() {
            self.first_observed_at = Some(now);
            self.jitter = jitter;
        }
    }

    pub fn clear(&mut self) {
        self.first_observed_at = None;
        self.jitter = Duration::ZERO;
    }

    pub fn is_set(&self) -> bool {
        self.first_observed_at.is_some()
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Returns `true` once `now` is at least `threshold + jitter` past
    /// the first leaderless observation.
    pub fn takeover_due(&self, now: Instant, threshold: Duration) -> bool {
        match self.first_observed_at {
            Some(first) => now.saturating_duration_since(first) >= threshold + self.jitter,
            None => false,
        }
    }
}

/// Maps (current role, snapshot, timers) to a desired role.
///
/// Pure apart from nothing: jitter sampling happens in the caller when
/// it applies [`SideEffect::SetLeaderless`].
pub fn decide(
    current: NodeRole,
    snapshot: &ClusterSnapshot,
    timers: &FailoverTimers,
    now: Instant,
    inputs: &DecisionInputs<'_>,
) -> Decision {
    match current {
        // Bootstrap: never into Active, whatever the cluster looks like.
        NodeRole::Unknown => Decision::passive(DecisionReason::Bootstrap, SideEffect::None),

        NodeRole::Active => decide_active(snapshot, inputs),

        NodeRole::Passive => decide_passive(snapshot, timers, now, inputs),
    }
}

fn self_fit(snapshot: &ClusterSnapshot) -> bool {
    snapshot.self_healthy && snapshot.self_in_gossip && !snapshot.self_delinquent
}

fn decide_active(snapshot: &ClusterSnapshot, inputs: &DecisionInputs<'_>) -> Decision {
    if !self_fit(snapshot) {
        return Decision::passive(DecisionReason::SelfUnfit, SideEffect::None);
    }

    // Split-brain resolver: yield only to a peer that outranks us.
    let self_rank = inputs.registry.rank(inputs.self_ip);
    let lower_ranked_active = snapshot
        .active_peers
        .iter()
        .filter(|ip| **ip != inputs.self_ip)
        .filter_map(|ip| inputs.registry.rank(*ip))
        .any(|peer_rank| match self_rank {
            Some(own) => peer_rank < own,
            // Self missing from the registry cannot win any tie.
            None => true,
        });

    if lower_ranked_active {
        Decision::passive(DecisionReason::YieldToLowerRank, SideEffect::None)
    } else {
        Decision::active(DecisionReason::Steady)
    }
}

fn decide_passive(
    snapshot: &ClusterSnapshot,
    timers: &FailoverTimers,
    now: Instant,
    inputs: &DecisionInputs<'_>,
) -> Decision {
    if !self_fit(snapshot) {
        return Decision::passive(DecisionReason::SelfUnfit, SideEffect::None);
    }

    if snapshot.other_active_visible(inputs.self_ip) {
        return Decision::passive(DecisionReason::ActivePeerVisible, SideEffect::ClearLeaderless);
    }

    if !timers.is_set() {
        return Decision::passive(DecisionReason::LeaderlessWait, SideEffect::SetLeaderless);
    }

    if timers.takeover_due(now, inputs.params.leaderless_threshold)
        && lowest_alive_rank(snapshot, inputs)
    {
        return Decision::active(DecisionReason::Takeover);
    }

    Decision::passive(DecisionReason::LeaderlessWait, SideEffect::None)
}

/// Whether self holds the lowest rank among peers still believed alive.
///
/// Candidates are `known_peers ∩ alive_peers`; self is always a
/// candidate. The probe keeps peers of undeterminable health in
/// `alive_peers`, so an unreachable peer that might outrank us blocks
/// the takeover.
fn lowest_alive_rank(snapshot: &ClusterSnapshot, inputs: &DecisionInputs<'_>) -> bool {
    let Some(self_rank) = inputs.registry.rank(inputs.self_ip) else {
        return false;
    };

    snapshot
        .alive_peers
        .intersection(&snapshot.known_peers)
        .filter(|ip| **ip != inputs.self_ip)
        .filter_map(|ip| inputs.registry.rank(*ip))
        .all(|peer_rank| self_rank < peer_rank)
}
