//! Role executor: drives the validator process into a target role.
//!
//! A transition is a fixed sequence: render the target role's templates,
//! stop whatever role process is running (termination signal, bounded
//! wait, hard kill on overrun), run the pre hooks, launch the rendered
//! command with streamed output, run the post hooks, update state.
//!
//! Two failure points matter operationally. A template render failure
//! aborts before the old process is touched, so the validator keeps
//! running its previous role. A pre-hook veto or spawn failure happens
//! after the stop, which leaves the validator OFF; the executor reports
//! the failure and the control loop retries the whole sequence on the
//! next tick.
//!
//! Cancellation has one checkpoint, just before the stop step: a
//! transition that has not yet stopped the previous process aborts
//! there and changes nothing, while one already past it runs to
//! completion so the validator is never abandoned half-switched.
//!
//! All calls come from the single control-loop task, so transitions are
//! serial by construction.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_command::{self as command, CommandError, CommandSpec, Hook, Hooks, RunningCommand};
use vigil_core::template::{self, TemplateError};
use vigil_core::{NodeRole, RoleKind, TemplateData};

use crate::config::RoleConfig;

/// Ways a role transition can fail. All are retried on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("failed to render {field}: {source}")]
    Render {
        field: String,
        #[source]
        source: TemplateError,
    },

    #[error("pre hook rejected transition: {0}")]
    PreHook(#[source] CommandError),

    #[error("failed to start role command: {0}")]
    Start(#[source] CommandError),
}

/// How a transition call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The target role is in place.
    Completed,
    /// Cancellation arrived before the previous process was stopped;
    /// nothing was changed. Not an error: this is the clean shutdown
    /// path.
    Cancelled,
}

/// A role's config after template expansion.
struct RenderedRole {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    hooks: Hooks,
}

/// Owns the lifecycle of the running validator process.
pub struct RoleExecutor {
    active: RoleConfig,
    passive: RoleConfig,
    data: TemplateData,
    dry_run: bool,
    stop_timeout: Duration,
    cancel: CancellationToken,

    current_role: NodeRole,
    process: Option<RunningCommand>,
    last_transition_at: Option<Instant>,
}

impl RoleExecutor {
    pub fn new(
        active: RoleConfig,
        passive: RoleConfig,
        data: TemplateData,
        dry_run: bool,
        stop_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            active,
            passive,
            data,
            dry_run,
            stop_timeout,
            cancel,
            current_role: NodeRole::Unknown,
            process: None,
            last_transition_at: None,
        }
    }

    pub fn current_role(&self) -> NodeRole {
        self.current_role
    }

    /// OS pid of the running role process, if any.
    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.id())
    }

    pub fn last_transition_at(&self) -> Option<Instant> {
        self.last_transition_at
    }

    /// Drives the validator into `target`.
    ///
    /// Calling with the role already held (and its process running) is
    /// a no-op and must not restart anything. A failed transition
    /// leaves `current_role` unchanged; if the failure happened after
    /// the stop step there is no running process until a retry
    /// succeeds.
    pub async fn transition(
        &mut self,
        target: RoleKind,
    ) -> Result<TransitionOutcome, TransitionError> {
        if self.current_role.is(target) && (self.dry_run || self.process.is_some()) {
            debug!(role = %target, "already in target role, nothing to do");
            return Ok(TransitionOutcome::Completed);
        }

        info!(
            from = %self.current_role,
            to = %target,
            dry_run = self.dry_run,
            "starting role transition"
        );

        let role_config = match target {
            RoleKind::Active => &self.active,
            RoleKind::Passive => &self.passive,
        };

        // Render before stopping anything: a bad template must not take
        // the running process down.
        let rendered = render_role(target, role_config, &self.data)?;

        // Cancellation checkpoint. Past this point the previous process
        // is gone and the transition must run to completion.
        if self.cancel.is_cancelled() {
            info!(role = %target, "cancellation requested, aborting transition before stop");
            return Ok(TransitionOutcome::Cancelled);
        }

        if let Some(process) = self.process.take() {
            if let Err(e) = process.stop(self.stop_timeout, &self.cancel).await {
                warn!(error = %e, "error while stopping previous role process");
            }
        }

        rendered
            .hooks
            .run_pre(self.dry_run, target.as_str())
            .await
            .map_err(TransitionError::PreHook)?;

        if self.dry_run {
            info!(
                role = %target,
                command = %rendered.command,
                args = ?rendered.args,
                "dry run, role command not spawned"
            );
        } else {
            let spec = CommandSpec {
                name: format!("{target} role command"),
                command: rendered.command,
                args: rendered.args,
                env: rendered.env,
                dry_run: false,
                stream_output: true,
            };
            self.process = Some(command::start(&spec).map_err(TransitionError::Start)?);
        }

        rendered.hooks.run_post(self.dry_run, target.as_str()).await;

        self.current_role = target.into();
        self.last_transition_at = Some(Instant::now());
        info!(role = %target, pid = ?self.process_id(), "role transition complete");
        Ok(TransitionOutcome::Completed)
    }
}

fn render_role(
    kind: RoleKind,
    config: &RoleConfig,
    data: &TemplateData,
) -> Result<RenderedRole, TransitionError> {
    let role = kind.as_str();
    let render = |field: String, value: &str| -> Result<String, TransitionError> {
        template::render(value, data).map_err(|source| TransitionError::Render { field, source })
    };

    let command = render(format!("{role}.command"), &config.command)?;

    let mut args = Vec::with_capacity(config.args.len());
    for (i, arg) in config.args.iter().enumerate() {
        args.push(render(format!("{role}.args[{i}]"), arg)?);
    }

    let mut env = BTreeMap::new();
    for (key, value) in &config.env {
        env.insert(key.clone(), render(format!("{role}.env[{key}]"), value)?);
    }

    let mut hooks = Hooks::default();
    for (chain, source_hooks, target_hooks) in [
        ("pre", &config.hooks.pre, &mut hooks.pre),
        ("post", &config.hooks.post, &mut hooks.post),
    ] {
        for hook in source_hooks {
            let mut rendered_args = Vec::with_capacity(hook.args.len());
            for (i, arg) in hook.args.iter().enumerate() {
                rendered_args.push(render(
                    format!("{role}.hooks.{chain}.{}.args[{i}]", hook.name),
                    arg,
                )?);
            }
            target_hooks.push(Hook {
                name: hook.name.clone(),
                command: render(
                    format!("{role}.hooks.{chain}.{}.command", hook.name),
                    &hook.command,
                )?,
                args: rendered_args,
                must_succeed: hook.must_succeed,
            });
        }
    }

    Ok(RenderedRole {
        command,
        args,
        env,
        hooks,
    })
}
