//! Role tags for the validator process.

use std::fmt;

/// The two roles a validator instance can be driven into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// Voting, leader-eligible.
    Active,
    /// Hot standby, non-voting.
    Passive,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Active => "active",
            RoleKind::Passive => "passive",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role the local process currently holds.
///
/// `Unknown` exists only between startup and the first successful
/// transition; the first tick must resolve it to a concrete role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Unknown,
    Active,
    Passive,
}

impl NodeRole {
    /// Returns `true` if this role already matches `kind`.
    pub fn is(&self, kind: RoleKind) -> bool {
        matches!(
            (self, kind),
            (NodeRole::Active, RoleKind::Active) | (NodeRole::Passive, RoleKind::Passive)
        )
    }
}

impl From<RoleKind> for NodeRole {
    fn from(kind: RoleKind) -> Self {
        match kind {
            RoleKind::Active => NodeRole::Active,
            RoleKind::Passive => NodeRole::Passive,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Unknown => "unknown",
            NodeRole::Active => "active",
            NodeRole::Passive => "passive",
        };
        f.write_str(s)
    }
}
