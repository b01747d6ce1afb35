//! Structured-log audit sink.

use ledgerid_core::{AuditEvent, AuditSink};

/// Audit sink that emits each event as a structured tracing record.
///
/// Recording cannot fail and never blocks the calling operation; a dropped
/// subscriber just drops the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "ledgerid::audit",
            action = ?event.action,
            actor = ?event.actor,
            client_ip = event.client_ip.as_deref(),
            user_agent = event.user_agent.as_deref(),
            "{}",
            event.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerid_core::AuditAction;

    #[test]
    fn record_never_panics_without_subscriber() {
        LogAuditSink.record(AuditEvent::new(None, AuditAction::GetUsers, "listing"));
    }
}
