//! Configuration loading and validation.
//!
//! The controller reads one TOML file at startup. Durations are given
//! as human strings ("5s", "1m30s") and parsed by [`parse_duration`].
//! Validation is strict and happens once, before anything runs: bad
//! durations, missing role commands, malformed hooks, duplicate peer
//! IPs, and templates referencing unknown placeholders all fail the
//! process here rather than surfacing mid-failover.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use vigil_command::{HookError, Hooks};
use vigil_core::template::{self, TemplateError};
use vigil_core::{Peer, PeerRegistry, RegistryError, TemplateData};
use vigil_notify::EventFilter;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub validator: ValidatorConfig,
    pub identity: IdentityConfig,
    pub rpc: RpcConfig,
    pub failover: FailoverConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Identity of this node as reported in events.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    /// Cluster tag carried on events (e.g. "mainnet-beta").
    pub cluster: String,
    /// This node's public IPv4, which must also appear in the peer set.
    pub public_ip: Ipv4Addr,
}

/// The HA identity pair fed to command templates.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub active_pubkey: String,
    pub active_keypair_file: String,
    pub passive_pubkey: String,
    pub passive_keypair_file: String,
}

/// Local validator RPC endpoint used by the cluster probe.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(
        default = "default_rpc_timeout",
        deserialize_with = "de_duration"
    )]
    pub timeout_duration: Duration,
}

/// Failover decision parameters and the two role definitions.
#[derive(Debug, Clone, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "de_duration"
    )]
    pub poll_interval_duration: Duration,
    #[serde(
        default = "default_leaderless_threshold",
        deserialize_with = "de_duration"
    )]
    pub leaderless_threshold_duration: Duration,
    #[serde(default = "default_takeover_jitter")]
    pub takeover_jitter_seconds: u64,
    #[serde(
        default = "default_stop_timeout",
        deserialize_with = "de_duration"
    )]
    pub stop_timeout_duration: Duration,
    pub active: RoleConfig,
    pub passive: RoleConfig,
    pub peers: BTreeMap<String, PeerConfig>,
}

/// Command, arguments, environment, and hooks for one role.
///
/// All strings may use `{{placeholder}}` template syntax.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub hooks: Hooks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    pub ip: Ipv4Addr,
}

/// Notification fan-out settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub events: EventFilter,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events: EventFilter::default(),
        }
    }
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_leaderless_threshold() -> Duration {
    Duration::from_secs(15)
}

fn default_takeover_jitter() -> u64 {
    3
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_notifications_enabled() -> bool {
    true
}

/// Configuration failures; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failover.poll_interval_duration must be greater than zero")]
    ZeroPollInterval,

    #[error("failover.leaderless_threshold_duration must be positive and non-zero")]
    ZeroLeaderlessThreshold,

    #[error("failover.stop_timeout_duration must be greater than zero")]
    ZeroStopTimeout,

    #[error("failover.{role}.command must be defined")]
    MissingRoleCommand { role: &'static str },

    #[error("failover.{role}.hooks: {source}")]
    Hooks {
        role: &'static str,
        #[source]
        source: HookError,
    },

    #[error("failover.peers: {0}")]
    Peers(#[from] RegistryError),

    #[error("failover.peers must include this node's public IP {0}")]
    SelfNotInPeers(Ipv4Addr),

    #[error("failover.{role}.{field}: {source}")]
    Template {
        role: &'static str,
        field: String,
        #[source]
        source: TemplateError,
    },
}

impl Config {
    /// Reads, parses, and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every invariant the rest of the system assumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failover.poll_interval_duration.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.failover.leaderless_threshold_duration.is_zero() {
            return Err(ConfigError::ZeroLeaderlessThreshold);
        }
        if self.failover.stop_timeout_duration.is_zero() {
            return Err(ConfigError::ZeroStopTimeout);
        }

        validate_role("active", &self.failover.active)?;
        validate_role("passive", &self.failover.passive)?;

        let registry = self.registry()?;
        if !registry.contains(self.validator.public_ip) {
            return Err(ConfigError::SelfNotInPeers(self.validator.public_ip));
        }

        Ok(())
    }

    /// Builds the peer registry from the configured peer map.
    pub fn registry(&self) -> Result<PeerRegistry, ConfigError> {
        let peers = self.failover.peers.iter().map(|(name, peer)| Peer {
            name: name.clone(),
            ip: peer.ip,
        });
        Ok(PeerRegistry::new(peers)?)
    }

    /// Data record for role command template expansion.
    pub fn template_data(&self) -> TemplateData {
        TemplateData {
            active_identity_pubkey: self.identity.active_pubkey.clone(),
            active_identity_keypair_file: self.identity.active_keypair_file.clone(),
            passive_identity_pubkey: self.identity.passive_pubkey.clone(),
            passive_identity_keypair_file: self.identity.passive_keypair_file.clone(),
            self_name: self.validator.name.clone(),
        }
    }
}

fn validate_role(role: &'static str, cfg: &RoleConfig) -> Result<(), ConfigError> {
    if cfg.command.is_empty() {
        return Err(ConfigError::MissingRoleCommand { role });
    }

    cfg.hooks
        .validate()
        .map_err(|source| ConfigError::Hooks { role, source })?;

    check_template(role, "command".to_string(), &cfg.command)?;
    for (i, arg) in cfg.args.iter().enumerate() {
        check_template(role, format!("args[{i}]"), arg)?;
    }
    for (key, value) in &cfg.env {
        check_template(role, format!("env[{key}]"), value)?;
    }
    for hook in cfg.hooks.pre.iter().chain(cfg.hooks.post.iter()) {
        check_template(role, format!("hooks.{}.command", hook.name), &hook.command)?;
        for (i, arg) in hook.args.iter().enumerate() {
            check_template(role, format!("hooks.{}.args[{i}]", hook.name), arg)?;
        }
    }
    Ok(())
}

fn check_template(role: &'static str, field: String, value: &str) -> Result<(), ConfigError> {
    template::validate(value).map_err(|source| ConfigError::Template {
        role,
        field,
        source,
    })
}

/// Parses a human-readable duration string.
///
/// Accepts one or more `<number><unit>` segments where unit is `ms`,
/// `s`, `m`, or `h`; segments accumulate, so "1m30s" is 90 seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration string".into());
    }

    let bytes = s.as_bytes();
    let mut i = 0;
    let mut total = Duration::ZERO;

    while i < bytes.len() {
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if digits_start == i {
            return Err(format!("invalid duration: '{input}'"));
        }
        let value: u64 = s[digits_start..i]
            .parse()
            .map_err(|_| format!("invalid duration: '{input}'"))?;

        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        total += match &s[unit_start..i] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "" => return Err(format!("missing unit in duration: '{input}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration: '{input}'")),
        };
    }

    Ok(total)
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}
