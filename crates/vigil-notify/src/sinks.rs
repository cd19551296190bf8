//! Built-in notification sinks.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::event::{Event, Severity};
use crate::manager::{Notifier, NotifyError};

/// Sink that writes every event to the process log.
///
/// Always registered, so an operator running without webhook transports
/// still gets the full lifecycle narrative in the journal.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &Event) -> Result<(), NotifyError> {
        match event.severity {
            Severity::Critical | Severity::Error => error!(
                event = %event.kind,
                severity = %event.severity,
                validator = %event.validator_name,
                cluster = %event.cluster,
                details = ?event.details,
                "{}",
                event.message
            ),
            Severity::Warning => warn!(
                event = %event.kind,
                severity = %event.severity,
                validator = %event.validator_name,
                cluster = %event.cluster,
                details = ?event.details,
                "{}",
                event.message
            ),
            Severity::Info => info!(
                event = %event.kind,
                severity = %event.severity,
                validator = %event.validator_name,
                cluster = %event.cluster,
                details = ?event.details,
                "{}",
                event.message
            ),
        }
        Ok(())
    }
}
