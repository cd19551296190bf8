//! Test harness: scripted probe, channel event sink, and controller
//! assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::net::Ipv4Addr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vigil_agent::config::RoleConfig;
use vigil_agent::control::{ControlLoop, ControlLoopOptions};
use vigil_agent::executor::RoleExecutor;
use vigil_cluster::{ClusterProbe, ClusterQueries, ProbeError};
use vigil_command::Hooks;
use vigil_core::{DecisionParams, Peer, PeerRegistry, TemplateData};
use vigil_notify::{
    Event, EventContext, EventFilter, EventType, Notifier, NotifyError, NotifyManager,
};

/// Tick period used by every scenario.
pub const POLL: Duration = Duration::from_millis(50);
/// Leaderless threshold used by every scenario.
pub const THRESHOLD: Duration = Duration::from_millis(800);
/// Generous deadline for "this event must arrive".
pub const EVENT_DEADLINE: Duration = Duration::from_secs(10);

/// Mutable cluster state the scripted probe reads on every query.
pub struct ProbeState {
    pub healthy: bool,
    pub in_gossip: bool,
    pub delinquent: bool,
    pub active: BTreeSet<Ipv4Addr>,
    pub dead: BTreeSet<Ipv4Addr>,
}

impl ProbeState {
    pub fn fit() -> Self {
        Self {
            healthy: true,
            in_gossip: true,
            delinquent: false,
            active: BTreeSet::new(),
            dead: BTreeSet::new(),
        }
    }
}

/// `ClusterQueries` implementation backed by shared mutable state.
pub struct ScriptedQueries {
    state: Arc<Mutex<ProbeState>>,
}

#[async_trait]
impl ClusterQueries for ScriptedQueries {
    async fn self_healthy(&self) -> Result<bool, ProbeError> {
        Ok(self.state.lock().unwrap().healthy)
    }
    async fn self_in_gossip(&self) -> Result<bool, ProbeError> {
        Ok(self.state.lock().unwrap().in_gossip)
    }
    async fn self_delinquent(&self) -> Result<bool, ProbeError> {
        Ok(self.state.lock().unwrap().delinquent)
    }
    async fn active_peer_ips(&self) -> Result<BTreeSet<Ipv4Addr>, ProbeError> {
        Ok(self.state.lock().unwrap().active.clone())
    }
    async fn peer_alive(&self, ip: Ipv4Addr) -> Result<bool, ProbeError> {
        Ok(!self.state.lock().unwrap().dead.contains(&ip))
    }
}

/// Sink that forwards every event to the test.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl Notifier for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }
    async fn send(&self, event: &Event) -> Result<(), NotifyError> {
        self.tx
            .send(event.clone())
            .map_err(|e| NotifyError(e.to_string()))
    }
}

/// Writes an executable shell script into `dir`.
pub fn shell_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{body}").unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Role config that just parks a process.
pub fn sleeper_role(dir: &tempfile::TempDir, name: &str) -> RoleConfig {
    let path = shell_script(dir, name, "sleep 600");
    RoleConfig {
        command: path.display().to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        hooks: Hooks::default(),
    }
}

/// Options for assembling one controller under test.
pub struct ControllerOptions {
    pub self_ip: &'static str,
    pub peers: Vec<(&'static str, &'static str)>,
    pub active_role: Option<RoleConfig>,
    pub passive_role: Option<RoleConfig>,
    pub dry_run: bool,
    pub jitter_max: Duration,
}

impl ControllerOptions {
    pub fn new(self_ip: &'static str, peers: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            self_ip,
            peers,
            active_role: None,
            passive_role: None,
            dry_run: false,
            // deterministic takeover timing unless a test opts in
            jitter_max: Duration::ZERO,
        }
    }
}

/// One running controller instance plus the handles tests poke at.
pub struct Controller {
    pub state: Arc<Mutex<ProbeState>>,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
    pub dir: tempfile::TempDir,
}

impl Controller {
    pub fn start(opts: ControllerOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let active = opts
            .active_role
            .unwrap_or_else(|| sleeper_role(&dir, "active.sh"));
        let passive = opts
            .passive_role
            .unwrap_or_else(|| sleeper_role(&dir, "passive.sh"));

        let registry = PeerRegistry::new(opts.peers.iter().map(|(name, ip)| Peer {
            name: name.to_string(),
            ip: ip.parse().unwrap(),
        }))
        .unwrap();
        let self_ip: Ipv4Addr = opts.self_ip.parse().unwrap();

        let state = Arc::new(Mutex::new(ProbeState::fit()));
        let probe = ClusterProbe::new(
            Arc::new(ScriptedQueries {
                state: Arc::clone(&state),
            }),
            registry.ips().iter().copied().collect(),
        );

        // the same token the loop runs under is handed to every
        // component that can block
        let cancel = CancellationToken::new();

        let (tx, events) = mpsc::unbounded_channel();
        let notify = Arc::new(NotifyManager::new(
            EventContext {
                validator_name: format!("validator-{}", opts.self_ip),
                cluster: "testnet".into(),
                public_ip: opts.self_ip.to_string(),
                active_pubkey: "active-pk".into(),
                passive_pubkey: "passive-pk".into(),
            },
            EventFilter::default(),
            vec![Arc::new(ChannelSink { tx })],
            cancel.clone(),
        ));

        let executor = RoleExecutor::new(
            active,
            passive,
            TemplateData {
                active_identity_pubkey: "active-pk".into(),
                active_identity_keypair_file: "/keys/active.json".into(),
                passive_identity_pubkey: "passive-pk".into(),
                passive_identity_keypair_file: "/keys/passive.json".into(),
                self_name: format!("validator-{}", opts.self_ip),
            },
            opts.dry_run,
            Duration::from_secs(5),
            cancel.clone(),
        );

        let control = ControlLoop::new(ControlLoopOptions {
            probe,
            executor,
            notify,
            registry,
            self_ip,
            params: DecisionParams {
                leaderless_threshold: THRESHOLD,
                takeover_jitter_max: opts.jitter_max,
            },
            poll_interval: POLL,
        });

        let handle = tokio::spawn(control.run(cancel.clone()));

        Self {
            state,
            events,
            cancel,
            handle,
            dir,
        }
    }

    /// Mutates the scripted cluster state.
    pub fn set_state(&self, mutate: impl FnOnce(&mut ProbeState)) {
        mutate(&mut self.state.lock().unwrap());
    }

    /// Waits (up to `EVENT_DEADLINE`) for the next event of `kind`,
    /// skipping unrelated events.
    pub async fn expect_event(&mut self, kind: EventType) -> Event {
        let deadline = tokio::time::Instant::now() + EVENT_DEADLINE;
        loop {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind} event"))
                .expect("event channel closed");
            if event.kind == kind {
                return event;
            }
        }
    }

    /// Asserts that no event of `kind` arrives within `window`.
    pub async fn expect_quiet(&mut self, kind: EventType, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return,
                Ok(Some(event)) => {
                    assert_ne!(event.kind, kind, "unexpected {kind} event: {event:?}");
                }
                Ok(None) => panic!("event channel closed"),
            }
        }
    }

    /// Cancels the loop and waits for the shutdown event.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.handle).await;
        self.expect_event(EventType::Shutdown).await;
    }
}
