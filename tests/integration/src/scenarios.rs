//! End-to-end failover scenarios.
//!
//! Timing: ticks run every 50ms and the leaderless threshold is 800ms
//! (see `helpers`), so "must not have promoted yet" windows sit well
//! inside the threshold and "must promote" deadlines well outside it.

use std::collections::BTreeMap;
use std::time::Duration;

use vigil_agent::config::RoleConfig;
use vigil_command::{Hook, Hooks};
use vigil_notify::EventType;

use crate::helpers::{shell_script, sleeper_role, Controller, ControllerOptions, THRESHOLD};

fn two_peers() -> Vec<(&'static str, &'static str)> {
    vec![("validator-a", "10.0.0.1"), ("validator-b", "10.0.0.2")]
}

/// Steady state: the lowest-ranked peer bootstraps passive and takes
/// over once the leaderless timer fires; a peer that sees an active
/// leader from the start stays passive.
#[tokio::test]
async fn s1_steady_state_two_peers() {
    // A sees no active peer: passive first, then takeover
    let mut a = Controller::start(ControllerOptions::new("10.0.0.1", two_peers()));
    a.expect_event(EventType::BecomingPassive).await;
    a.expect_event(EventType::BecamePassive).await;
    a.expect_event(EventType::BecomingActive).await;
    a.expect_event(EventType::BecameActive).await;
    a.shutdown().await;

    // B sees A active from the start: passive, and stays there
    let mut b = Controller::start(ControllerOptions::new("10.0.0.2", two_peers()));
    b.set_state(|s| {
        s.active = ["10.0.0.1".parse().unwrap()].into();
    });
    b.expect_event(EventType::BecamePassive).await;
    b.expect_quiet(EventType::BecomingActive, THRESHOLD + Duration::from_secs(1))
        .await;
    b.shutdown().await;
}

/// Clean failover: the surviving passive peer must respect the
/// leaderless threshold before promoting, then promote and emit
/// becoming/became in order.
#[tokio::test]
async fn s2_clean_failover() {
    let mut b = Controller::start(ControllerOptions::new("10.0.0.2", two_peers()));
    b.set_state(|s| {
        s.active = ["10.0.0.1".parse().unwrap()].into();
    });
    b.expect_event(EventType::BecamePassive).await;

    // the active peer disappears entirely
    b.set_state(|s| {
        s.active.clear();
        s.dead = ["10.0.0.1".parse().unwrap()].into();
    });
    b.expect_event(EventType::PeerLost).await;

    // well inside the threshold no promotion may happen
    b.expect_quiet(EventType::BecomingActive, THRESHOLD / 2).await;

    let becoming = b.expect_event(EventType::BecomingActive).await;
    assert_eq!(becoming.details.get("reason").unwrap(), "takeover");
    b.expect_event(EventType::BecameActive).await;
    b.shutdown().await;
}

/// Split-brain: when both peers observe each other active, the
/// higher-ranked one yields within a tick and the lower-ranked one
/// stays active.
#[tokio::test]
async fn s3_split_brain_resolution() {
    // B (rank 2) becomes active while A is believed dead
    let mut b = Controller::start(ControllerOptions::new("10.0.0.2", two_peers()));
    b.set_state(|s| {
        s.dead = ["10.0.0.1".parse().unwrap()].into();
    });
    b.expect_event(EventType::BecameActive).await;

    // A comes back, also asserting the active role
    b.set_state(|s| {
        s.dead.clear();
        s.active = ["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()].into();
    });

    let becoming = b.expect_event(EventType::BecomingPassive).await;
    assert_eq!(
        becoming.details.get("reason").unwrap(),
        "yield_to_lower_rank"
    );
    b.expect_event(EventType::BecamePassive).await;
    b.shutdown().await;

    // A (rank 1) in the same situation keeps the active role
    let mut a = Controller::start(ControllerOptions::new("10.0.0.1", two_peers()));
    a.expect_event(EventType::BecameActive).await;
    a.set_state(|s| {
        s.active = ["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()].into();
    });
    a.expect_quiet(EventType::BecomingPassive, Duration::from_secs(1))
        .await;
    a.shutdown().await;
}

/// Pre-hook veto: the transition aborts after the passive process was
/// stopped, the failure is reported, and the next ticks retry until
/// the hook allows promotion.
#[tokio::test]
async fn s4_pre_hook_veto() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("armed");
    let guard = shell_script(&dir, "guard.sh", &format!("test -f {}", marker.display()));
    let mut active = sleeper_role(&dir, "active.sh");
    active.hooks = Hooks {
        pre: vec![Hook {
            name: "guard".into(),
            command: guard.display().to_string(),
            args: Vec::new(),
            must_succeed: true,
        }],
        post: Vec::new(),
    };

    let mut opts = ControllerOptions::new("10.0.0.2", two_peers());
    opts.active_role = Some(active);
    let mut b = Controller::start(opts);
    b.set_state(|s| {
        s.dead = ["10.0.0.1".parse().unwrap()].into();
    });

    b.expect_event(EventType::BecamePassive).await;
    b.expect_event(EventType::BecomingActive).await;

    // hook veto: failure event carries the error, role does not change
    let unhealthy = b.expect_event(EventType::HealthUnhealthy).await;
    assert!(unhealthy.details.contains_key("error"));

    // next tick retries and fails again
    b.expect_event(EventType::BecomingActive).await;
    b.expect_event(EventType::HealthUnhealthy).await;

    // arm the guard; a retry must now complete the transition
    std::fs::write(&marker, b"").unwrap();
    b.expect_event(EventType::BecameActive).await;
    b.shutdown().await;
}

/// Gossip flap: an active node losing gossip demotes itself with
/// `self_unfit` and emits `gossip_lost`; once gossip recovers the
/// normal takeover path brings it back.
#[tokio::test]
async fn s5_gossip_flap_recovery() {
    let peers = vec![("validator-a", "10.0.0.1")];
    let mut a = Controller::start(ControllerOptions::new("10.0.0.1", peers));
    a.expect_event(EventType::BecameActive).await;

    a.set_state(|s| s.in_gossip = false);
    let becoming = a.expect_event(EventType::BecomingPassive).await;
    assert_eq!(becoming.details.get("reason").unwrap(), "self_unfit");
    a.expect_event(EventType::BecamePassive).await;
    a.expect_event(EventType::GossipLost).await;

    a.set_state(|s| s.in_gossip = true);
    a.expect_event(EventType::GossipRecovered).await;

    // leaderless timer restarts, then the takeover proceeds as usual
    a.expect_event(EventType::BecomingActive).await;
    a.expect_event(EventType::BecameActive).await;
    a.shutdown().await;
}

/// Dry run: the full event narrative is produced but nothing is ever
/// spawned.
#[tokio::test]
async fn s6_dry_run_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let active_marker = dir.path().join("active-ran");
    let passive_marker = dir.path().join("passive-ran");
    let active = RoleConfig {
        command: shell_script(
            &dir,
            "active.sh",
            &format!("touch {}; sleep 600", active_marker.display()),
        )
        .display()
        .to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        hooks: Hooks::default(),
    };
    let passive = RoleConfig {
        command: shell_script(
            &dir,
            "passive.sh",
            &format!("touch {}; sleep 600", passive_marker.display()),
        )
        .display()
        .to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        hooks: Hooks::default(),
    };

    let mut opts = ControllerOptions::new("10.0.0.2", two_peers());
    opts.active_role = Some(active);
    opts.passive_role = Some(passive);
    opts.dry_run = true;
    let mut b = Controller::start(opts);
    b.set_state(|s| {
        s.active = ["10.0.0.1".parse().unwrap()].into();
    });

    b.expect_event(EventType::BecamePassive).await;

    b.set_state(|s| {
        s.active.clear();
        s.dead = ["10.0.0.1".parse().unwrap()].into();
    });
    b.expect_event(EventType::BecomingActive).await;
    b.expect_event(EventType::BecameActive).await;
    b.shutdown().await;

    assert!(!active_marker.exists(), "dry run spawned the active command");
    assert!(
        !passive_marker.exists(),
        "dry run spawned the passive command"
    );
}

/// Takeover is jittered: with a nonzero jitter bound the promotion
/// still happens, bounded by threshold + jitter.
#[tokio::test]
async fn takeover_with_jitter_still_completes() {
    let mut opts = ControllerOptions::new("10.0.0.1", two_peers());
    opts.jitter_max = Duration::from_millis(300);
    let mut a = Controller::start(opts);
    a.set_state(|s| {
        s.dead = ["10.0.0.2".parse().unwrap()].into();
    });

    a.expect_event(EventType::BecamePassive).await;
    a.expect_quiet(EventType::BecomingActive, THRESHOLD / 2).await;
    a.expect_event(EventType::BecameActive).await;
    a.shutdown().await;
}

/// Degraded probe: when every query fails the node demotes (or never
/// promotes) instead of flapping into the active role.
#[tokio::test]
async fn degraded_visibility_never_promotes() {
    let mut a = Controller::start(ControllerOptions::new("10.0.0.1", two_peers()));
    a.set_state(|s| {
        s.healthy = false;
        s.in_gossip = false;
    });

    a.expect_event(EventType::BecamePassive).await;
    a.expect_quiet(EventType::BecomingActive, THRESHOLD + Duration::from_secs(1))
        .await;
    a.shutdown().await;
}
