//! Integration tests for the vigil controller.
//!
//! Each test wires a real control loop, role executor, and notification
//! manager against a scripted cluster probe and shell-script role
//! commands, then drives cluster state changes and asserts on the
//! emitted event stream.

mod helpers;

mod scenarios;

fn main() {}
