//! vigil-notify: lifecycle events for the vigil HA controller.
//!
//! The control loop narrates what it does through events: role
//! transitions, health and gossip edges, peer visibility changes. This
//! crate defines the event model and the fan-out machinery:
//!
//! - [`Event`] / [`EventType`] / [`Severity`]: the thirteen lifecycle
//!   events and their default severities
//! - [`EventFilter`]: per-type enable flags, everything on by default
//! - [`NotifyManager`]: hands each event to every registered
//!   [`Notifier`] sink from a detached task, with a per-sink deadline;
//!   sinks are independent and best-effort, and a sink failure is never
//!   anyone else's problem
//! - [`LogNotifier`]: the built-in sink that writes events to the log

mod event;
mod manager;
mod sinks;

pub use event::{Event, EventFilter, EventType, Severity};
pub use manager::{EventContext, Notifier, NotifyError, NotifyManager, SINK_DEADLINE};
pub use sinks::LogNotifier;
