//! Pre/post hook chains around role transitions.
//!
//! Hooks run in listed order. A pre-hook marked `must_succeed` aborts
//! the chain (and the transition) on failure; any other failure is
//! logged and the chain continues. Post-hooks can never abort: by the
//! time they run the transition is already complete, so their failures
//! are logged and dropped. `must_succeed` on a post-hook is therefore a
//! configuration error, caught by [`Hooks::validate`].

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::CommandError;
use crate::runner::{self, CommandSpec};

/// One hook command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Hook {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub must_succeed: bool,
}

/// Ordered pre and post hook chains for one role.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Hooks {
    #[serde(default)]
    pub pre: Vec<Hook>,
    #[serde(default)]
    pub post: Vec<Hook>,
}

/// Hook configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HookError {
    #[error("hooks.{kind}[{index}] must have a name")]
    MissingName { kind: &'static str, index: usize },

    #[error("hooks.{kind}[{index}] must have a command")]
    MissingCommand { kind: &'static str, index: usize },

    #[error("hook {name}: must_succeed is not allowed on post hooks")]
    MustSucceedOnPost { name: String },
}

impl Hook {
    fn spec(&self, kind: &str, dry_run: bool) -> CommandSpec {
        CommandSpec {
            name: format!("{kind}-hook {}", self.name),
            command: self.command.clone(),
            args: self.args.clone(),
            env: BTreeMap::new(),
            dry_run,
            stream_output: true,
        }
    }
}

impl Hooks {
    /// Validates hook definitions; called at config-load time.
    pub fn validate(&self) -> Result<(), HookError> {
        for (index, hook) in self.pre.iter().enumerate() {
            check_hook(hook, "pre", index)?;
        }
        for (index, hook) in self.post.iter().enumerate() {
            check_hook(hook, "post", index)?;
            if hook.must_succeed {
                return Err(HookError::MustSucceedOnPost {
                    name: hook.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Runs the pre chain in order.
    ///
    /// A failing `must_succeed` hook aborts and returns its error;
    /// other failures are logged and the chain continues.
    pub async fn run_pre(&self, dry_run: bool, role: &str) -> Result<(), CommandError> {
        for hook in &self.pre {
            info!(hook = %hook.name, role, dry_run, "running pre hook");
            if let Err(e) = runner::run(&hook.spec("pre", dry_run)).await {
                if hook.must_succeed {
                    error!(hook = %hook.name, role, error = %e, "pre hook failed, aborting");
                    return Err(e);
                }
                warn!(hook = %hook.name, role, error = %e, "pre hook failed, continuing");
            }
        }
        Ok(())
    }

    /// Runs the post chain in order. Failures are logged only.
    pub async fn run_post(&self, dry_run: bool, role: &str) {
        for hook in &self.post {
            info!(hook = %hook.name, role, dry_run, "running post hook");
            if let Err(e) = runner::run(&hook.spec("post", dry_run)).await {
                warn!(hook = %hook.name, role, error = %e, "post hook failed");
            }
        }
    }
}

fn check_hook(hook: &Hook, kind: &'static str, index: usize) -> Result<(), HookError> {
    if hook.name.is_empty() {
        return Err(HookError::MissingName { kind, index });
    }
    if hook.command.is_empty() {
        return Err(HookError::MissingCommand { kind, index });
    }
    Ok(())
}
