use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use textflow_core::event::EventBus;
use textflow_core::traits::RunHistoryStore;
use textflow_core::types::{Outcome, RunEvent, RunId, RunInput, RunRecord};

/// What happened when a run record was handed to the history store.
///
/// A failed write is a secondary condition: it is reported here and logged,
/// never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistResult {
    Stored,
    Failed(String),
}

impl PersistResult {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Turns an execution outcome into exactly one immutable run record and
/// appends it to the history store.
pub struct RunRecorder {
    store: Arc<dyn RunHistoryStore>,
    event_bus: Option<Arc<EventBus>>,
}

impl RunRecorder {
    pub fn new(store: Arc<dyn RunHistoryStore>) -> Self {
        Self {
            store,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Build the record for a finished run. Pure.
    pub fn record(run_id: RunId, input: &RunInput, outcome: &Outcome) -> RunRecord {
        RunRecord {
            id: run_id,
            workflow_id: input.workflow_id.clone(),
            workflow_name: input.workflow_name.clone(),
            input_text: input.input_text.clone(),
            steps: input.steps.clone(),
            results: outcome.results().to_vec(),
            status: outcome.status(),
            error: outcome.error().map(str::to_string),
            created_at: Utc::now(),
        }
    }

    /// Append `record` to the history store. Never fails.
    pub async fn persist(&self, record: &RunRecord) -> PersistResult {
        match self.store.append(record).await {
            Ok(()) => {
                debug!(run_id = %record.id, status = %record.status, "Run record persisted");
                self.publish(RunEvent::RecordPersisted {
                    run_id: record.id.clone(),
                });
                PersistResult::Stored
            }
            Err(e) => {
                let message = e.to_string();
                error!(
                    run_id = %record.id,
                    workflow_id = %record.workflow_id,
                    status = %record.status,
                    error = %message,
                    "Failed to persist run record; run history is missing this run"
                );
                self.publish(RunEvent::RecordPersistFailed {
                    run_id: record.id.clone(),
                    error: message.clone(),
                });
                PersistResult::Failed(message)
            }
        }
    }

    /// Build and persist the record for a finished run.
    pub async fn commit(
        &self,
        run_id: RunId,
        input: &RunInput,
        outcome: &Outcome,
    ) -> (RunRecord, PersistResult) {
        let record = Self::record(run_id, input, outcome);
        let persisted = self.persist(&record).await;
        (record, persisted)
    }

    fn publish(&self, event: RunEvent) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(event);
        }
    }
}
