//! vigil-command: external command execution for the vigil HA controller.
//!
//! Role transitions ultimately come down to running operator-configured
//! programs: the role command itself plus the pre/post hook chains
//! around it. This crate owns that surface:
//!
//! - [`run`] executes a command to completion, with bulk or line-streamed
//!   output logging and a dry-run mode that never spawns
//! - [`start`] launches a long-lived command (the validator process)
//!   with streaming output and returns a [`RunningCommand`] handle that
//!   supports graceful stop with a hard-kill bound
//! - [`Hooks`] runs the ordered pre/post chains with the
//!   `must_succeed` abort semantics on the pre side

mod error;
mod hooks;
mod runner;

pub use error::CommandError;
pub use hooks::{Hook, HookError, Hooks};
pub use runner::{run, start, CommandSpec, RunningCommand};
