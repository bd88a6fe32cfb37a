//! Failure escalation: the failure ledger and the external event sink.
//!
//! Both channels are best-effort and independent. Their errors end up in the
//! returned report and are never raised.

pub mod events;

pub use events::{
    BACKUP_EVENT_CATEGORY, BACKUP_FAILED_EVENT_ID, EventRecord, EventSink, LoggerCommandSink,
    MemoryEventSink, Severity,
};

use crate::archive::LedgerWriter;
use crate::core::RunId;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EscalationChannel {
    Ledger,
    EventRegistration,
    EventEmission,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationDiagnostic {
    pub channel: EscalationChannel,
    pub error: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct EscalationReport {
    pub ledger_appended: bool,
    pub event_emitted: bool,
    pub diagnostics: Vec<EscalationDiagnostic>,
}

pub struct FailureEscalator {
    ledger: Option<Arc<dyn LedgerWriter>>,
    events: Option<Arc<dyn EventSink>>,
    source: String,
    invoker: String,
}

impl FailureEscalator {
    /// `source` is the event source name; `invoker` identifies this program
    /// in event messages.
    pub fn new(source: impl Into<String>, invoker: impl Into<String>) -> Self {
        Self {
            ledger: None,
            events: None,
            source: source.into(),
            invoker: invoker.into(),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerWriter>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn event_for(&self, target: &Path) -> EventRecord {
        EventRecord {
            source: self.source.clone(),
            severity: Severity::Error,
            category: BACKUP_EVENT_CATEGORY,
            event_id: BACKUP_FAILED_EVENT_ID,
            message: format!(
                "Database backup failed. Target: {}. Invoked by: {}",
                target.display(),
                self.invoker
            ),
        }
    }

    pub async fn escalate(&self, run: &RunId, target: &Path) -> EscalationReport {
        let mut report = EscalationReport::default();

        if let Some(ledger) = &self.ledger {
            match ledger.record_failure(run) {
                Ok(()) => report.ledger_appended = true,
                Err(err) => report.diagnostics.push(EscalationDiagnostic {
                    channel: EscalationChannel::Ledger,
                    error: err.to_string(),
                }),
            }
        }

        if let Some(events) = &self.events {
            match events.ensure_source(&self.source).await {
                Ok(()) => match events.emit(&self.event_for(target)).await {
                    Ok(()) => report.event_emitted = true,
                    Err(err) => report.diagnostics.push(EscalationDiagnostic {
                        channel: EscalationChannel::EventEmission,
                        error: err.to_string(),
                    }),
                },
                Err(err) => report.diagnostics.push(EscalationDiagnostic {
                    channel: EscalationChannel::EventRegistration,
                    error: err.to_string(),
                }),
            }
        }

        for diagnostic in &report.diagnostics {
            event!(
                Level::WARN,
                run = %run,
                channel = ?diagnostic.channel,
                error = %diagnostic.error,
                "failure escalation channel failed"
            );
        }
        report
    }
}
