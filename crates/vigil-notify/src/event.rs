//! Event model: types, severities, and the per-type filter.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The lifecycle events the controller can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Startup,
    Shutdown,
    BecomingActive,
    BecameActive,
    BecomingPassive,
    BecamePassive,
    HealthUnhealthy,
    HealthRecovered,
    Delinquent,
    GossipLost,
    GossipRecovered,
    PeerDiscovered,
    PeerLost,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Startup => "startup",
            EventType::Shutdown => "shutdown",
            EventType::BecomingActive => "becoming_active",
            EventType::BecameActive => "became_active",
            EventType::BecomingPassive => "becoming_passive",
            EventType::BecamePassive => "became_passive",
            EventType::HealthUnhealthy => "health_unhealthy",
            EventType::HealthRecovered => "health_recovered",
            EventType::Delinquent => "delinquent",
            EventType::GossipLost => "gossip_lost",
            EventType::GossipRecovered => "gossip_recovered",
            EventType::PeerDiscovered => "peer_discovered",
            EventType::PeerLost => "peer_lost",
        }
    }

    /// Severity an event of this type carries unless overridden.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventType::BecomingActive | EventType::Delinquent => Severity::Critical,
            EventType::HealthUnhealthy | EventType::GossipLost | EventType::PeerLost => {
                Severity::Error
            }
            EventType::BecomingPassive | EventType::Shutdown => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-populated lifecycle event as handed to sinks.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub validator_name: String,
    pub cluster: String,
    pub public_ip: String,
    pub active_pubkey: String,
    pub passive_pubkey: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

fn enabled() -> bool {
    true
}

/// Which event types reach the sinks. Everything defaults to on.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EventFilter {
    #[serde(default = "enabled")]
    pub startup: bool,
    #[serde(default = "enabled")]
    pub shutdown: bool,
    #[serde(default = "enabled")]
    pub becoming_active: bool,
    #[serde(default = "enabled")]
    pub became_active: bool,
    #[serde(default = "enabled")]
    pub becoming_passive: bool,
    #[serde(default = "enabled")]
    pub became_passive: bool,
    #[serde(default = "enabled")]
    pub health_unhealthy: bool,
    #[serde(default = "enabled")]
    pub health_recovered: bool,
    #[serde(default = "enabled")]
    pub delinquent: bool,
    #[serde(default = "enabled")]
    pub gossip_lost: bool,
    #[serde(default = "enabled")]
    pub gossip_recovered: bool,
    #[serde(default = "enabled")]
    pub peer_discovered: bool,
    #[serde(default = "enabled")]
    pub peer_lost: bool,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            startup: true,
            shutdown: true,
            becoming_active: true,
            became_active: true,
            becoming_passive: true,
            became_passive: true,
            health_unhealthy: true,
            health_recovered: true,
            delinquent: true,
            gossip_lost: true,
            gossip_recovered: true,
            peer_discovered: true,
            peer_lost: true,
        }
    }
}

impl EventFilter {
    pub fn allows(&self, kind: EventType) -> bool {
        match kind {
            EventType::Startup => self.startup,
            EventType::Shutdown => self.shutdown,
            EventType::BecomingActive => self.becoming_active,
            EventType::BecameActive => self.became_active,
            EventType::BecomingPassive => self.becoming_passive,
            EventType::BecamePassive => self.became_passive,
            EventType::HealthUnhealthy => self.health_unhealthy,
            EventType::HealthRecovered => self.health_recovered,
            EventType::Delinquent => self.delinquent,
            EventType::GossipLost => self.gossip_lost,
            EventType::GossipRecovered => self.gossip_recovered,
            EventType::PeerDiscovered => self.peer_discovered,
            EventType::PeerLost => self.peer_lost,
        }
    }
}
