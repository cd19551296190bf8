//! vigil-agent: the HA controller daemon.
//!
//! Wires the pieces together: configuration, the role executor that
//! drives the validator process, and the control loop that polls the
//! cluster and applies role decisions. The binary in `main.rs` is a
//! thin shell over this library; integration tests construct the same
//! components directly.

pub mod config;
pub mod control;
pub mod executor;
