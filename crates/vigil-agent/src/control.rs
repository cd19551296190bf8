//! The failover control loop.
//!
//! One task owns everything mutable: role state, the leaderless timer,
//! the previous snapshot. Each tick it probes the cluster, asks the
//! decision engine what role this node should hold, applies the timer
//! side effects, performs the transition if one is called for, and
//! emits events for whatever changed since the last tick.
//!
//! Cancellation is cooperative with one checkpoint inside the
//! transition: a transition that has not yet stopped the previous role
//! process aborts and changes nothing, one already past the stop runs
//! to completion, and no new transition starts afterwards. The running
//! role process is deliberately left alive for the operator.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use vigil_cluster::ClusterProbe;
use vigil_core::{
    decide, ClusterSnapshot, DecisionInputs, DecisionParams, FailoverTimers, PeerRegistry,
    RoleKind, SideEffect,
};
use vigil_notify::{EventType, NotifyManager};

use crate::executor::{RoleExecutor, TransitionOutcome};

/// Everything the control loop needs, supplied by `main` or by tests.
pub struct ControlLoopOptions {
    pub probe: ClusterProbe,
    pub executor: RoleExecutor,
    pub notify: Arc<NotifyManager>,
    pub registry: PeerRegistry,
    pub self_ip: Ipv4Addr,
    pub params: DecisionParams,
    pub poll_interval: Duration,
}

/// Ticker-driven orchestrator for one controller instance.
pub struct ControlLoop {
    probe: ClusterProbe,
    executor: RoleExecutor,
    notify: Arc<NotifyManager>,
    registry: PeerRegistry,
    self_ip: Ipv4Addr,
    params: DecisionParams,
    poll_interval: Duration,
    timers: FailoverTimers,
    previous: Option<ClusterSnapshot>,
}

impl ControlLoop {
    pub fn new(opts: ControlLoopOptions) -> Self {
        Self {
            probe: opts.probe,
            executor: opts.executor,
            notify: opts.notify,
            registry: opts.registry,
            self_ip: opts.self_ip,
            params: opts.params,
            poll_interval: opts.poll_interval,
            timers: FailoverTimers::new(),
            previous: None,
        }
    }

    /// Runs until `cancel` fires.
    ///
    /// The select only races the ticker against cancellation between
    /// ticks. Within a tick, the token is consulted again before a
    /// transition starts, and the executor holds the checkpoint before
    /// its stop step; a transition past that point finishes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval = ?self.poll_interval,
            leaderless_threshold = ?self.params.leaderless_threshold,
            "control loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(&cancel).await,
            }
        }

        info!("control loop stopped, leaving role process running");
        self.notify.emit(
            EventType::Shutdown,
            "controller shutting down; role process left running",
            BTreeMap::new(),
        );
    }

    async fn tick(&mut self, cancel: &CancellationToken) {
        let snapshot = self.probe.snapshot().await;
        let now = snapshot.taken_at;

        let decision = decide(
            self.executor.current_role(),
            &snapshot,
            &self.timers,
            now,
            &DecisionInputs {
                self_ip: self.self_ip,
                registry: &self.registry,
                params: self.params,
            },
        );

        match decision.side_effect {
            SideEffect::SetLeaderless => {
                self.timers.set(now, self.params.takeover_jitter_max);
                info!(
                    jitter = ?self.timers.jitter(),
                    threshold = ?self.params.leaderless_threshold,
                    "no active peer visible, takeover timer started"
                );
            }
            SideEffect::ClearLeaderless => {
                if self.timers.is_set() {
                    debug!("active peer visible again, takeover timer cleared");
                }
                self.timers.clear();
            }
            SideEffect::None => {}
        }

        if !self.executor.current_role().is(decision.desired_role) {
            if cancel.is_cancelled() {
                debug!(role = %decision.desired_role, "cancellation requested, not starting transition");
            } else {
                self.transition(decision.desired_role, decision.reason.as_str())
                    .await;
            }
        }

        self.emit_derived_events(&snapshot);
        self.previous = Some(snapshot);
    }

    async fn transition(&mut self, target: RoleKind, reason: &str) {
        let (becoming, became) = match target {
            RoleKind::Active => (EventType::BecomingActive, EventType::BecameActive),
            RoleKind::Passive => (EventType::BecomingPassive, EventType::BecamePassive),
        };

        let details = BTreeMap::from([("reason".to_string(), reason.to_string())]);
        self.notify.emit(
            becoming,
            format!("transitioning to {target} role ({reason})"),
            details.clone(),
        );

        match self.executor.transition(target).await {
            Ok(TransitionOutcome::Completed) => {
                if target == RoleKind::Active {
                    // self is active now; the leaderless episode is over
                    self.timers.clear();
                }
                self.notify
                    .emit(became, format!("now running {target} role"), details);
            }
            Ok(TransitionOutcome::Cancelled) => {
                // clean shutdown path, not a failure; the previous role
                // is still in place
                info!(role = %target, "transition abandoned by shutdown");
            }
            Err(e) => {
                error!(role = %target, error = %e, "role transition failed");
                let mut details = details;
                details.insert("error".to_string(), e.to_string());
                self.notify.emit(
                    EventType::HealthUnhealthy,
                    format!("transition to {target} failed; validator process is not running"),
                    details,
                );
            }
        }
    }

    /// Emits edge events by diffing this snapshot against the previous.
    fn emit_derived_events(&self, snapshot: &ClusterSnapshot) {
        let Some(prev) = &self.previous else {
            return;
        };

        match (prev.self_healthy, snapshot.self_healthy) {
            (true, false) => self.notify.emit(
                EventType::HealthUnhealthy,
                "validator health check failing",
                BTreeMap::new(),
            ),
            (false, true) => self.notify.emit(
                EventType::HealthRecovered,
                "validator health check recovered",
                BTreeMap::new(),
            ),
            _ => {}
        }

        match (prev.self_in_gossip, snapshot.self_in_gossip) {
            (true, false) => self.notify.emit(
                EventType::GossipLost,
                "node no longer visible in gossip",
                BTreeMap::new(),
            ),
            (false, true) => self.notify.emit(
                EventType::GossipRecovered,
                "node visible in gossip again",
                BTreeMap::new(),
            ),
            _ => {}
        }

        if !prev.self_delinquent && snapshot.self_delinquent {
            self.notify.emit(
                EventType::Delinquent,
                "validator is delinquent",
                BTreeMap::new(),
            );
        }

        for peer in snapshot.alive_peers.difference(&prev.alive_peers) {
            self.notify.emit(
                EventType::PeerDiscovered,
                format!("peer {peer} is visible"),
                BTreeMap::from([("peer".to_string(), peer.to_string())]),
            );
        }
        for peer in prev.alive_peers.difference(&snapshot.alive_peers) {
            self.notify.emit(
                EventType::PeerLost,
                format!("peer {peer} is no longer visible"),
                BTreeMap::from([("peer".to_string(), peer.to_string())]),
            );
        }
    }
}
