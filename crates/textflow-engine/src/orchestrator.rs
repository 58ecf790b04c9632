use std::sync::Arc;

use tracing::{info, warn};

use textflow_core::error::{Result, TextflowError};
use textflow_core::event::EventBus;
use textflow_core::traits::{RunHistoryStore, StepProcessor};
use textflow_core::types::{Outcome, RunEvent, RunId, RunInput, StepResult};

use crate::executor::PipelineExecutor;
use crate::recorder::{PersistResult, RunRecorder};

/// A run whose every step succeeded.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub results: Vec<StepResult>,
    pub persisted: PersistResult,
}

/// Entry point for running a workflow: validate, execute, record.
///
/// Holds no mutable state of its own; share it behind an `Arc` and call
/// [`WorkflowRunner::run`] from as many tasks as needed.
pub struct WorkflowRunner {
    executor: PipelineExecutor,
    recorder: RunRecorder,
    event_bus: Option<Arc<EventBus>>,
}

impl WorkflowRunner {
    pub fn new(processor: Arc<dyn StepProcessor>, history: Arc<dyn RunHistoryStore>) -> Self {
        Self {
            executor: PipelineExecutor::new(processor),
            recorder: RunRecorder::new(history),
            event_bus: None,
        }
    }

    /// Publish run, step and persistence events on `event_bus`.
    pub fn with_event_bus(self, event_bus: Arc<EventBus>) -> Self {
        Self {
            executor: self.executor.with_event_bus(event_bus.clone()),
            recorder: self.recorder.with_event_bus(event_bus.clone()),
            event_bus: Some(event_bus),
        }
    }

    pub fn processor(&self) -> &Arc<dyn StepProcessor> {
        self.executor.processor()
    }

    /// Run a workflow and return the per-step results.
    ///
    /// Rejected input returns a validation error and leaves no record. Any
    /// run that passes validation leaves exactly one record, and a failure
    /// to store it never changes what is returned here.
    pub async fn run(&self, input: RunInput) -> Result<Vec<StepResult>> {
        self.execute(input).await.map(|run| run.results)
    }

    /// Like [`WorkflowRunner::run`], also reporting the run id and whether
    /// the record was stored.
    pub async fn execute(&self, input: RunInput) -> Result<CompletedRun> {
        input.validate()?;

        let run_id = RunId::new();
        let steps = input.step_kinds();

        info!(
            run_id = %run_id,
            workflow_id = %input.workflow_id,
            steps = steps.len(),
            "Run started"
        );
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id: input.workflow_id.clone(),
            step_count: steps.len(),
        });

        let outcome = self
            .executor
            .execute(&run_id, &input.input_text, &steps)
            .await;

        match outcome {
            Outcome::Success { .. } => {
                info!(run_id = %run_id, workflow_id = %input.workflow_id, "Run completed");
                self.publish(RunEvent::RunCompleted {
                    run_id: run_id.clone(),
                    workflow_id: input.workflow_id.clone(),
                });
            }
            Outcome::Failure { ref error, .. } => {
                warn!(
                    run_id = %run_id,
                    workflow_id = %input.workflow_id,
                    error = %error,
                    "Run failed"
                );
                self.publish(RunEvent::RunFailed {
                    run_id: run_id.clone(),
                    workflow_id: input.workflow_id.clone(),
                    error: error.clone(),
                });
            }
        }

        let (_, persisted) = self.recorder.commit(run_id.clone(), &input, &outcome).await;

        match outcome {
            Outcome::Success { results } => Ok(CompletedRun {
                run_id,
                results,
                persisted,
            }),
            Outcome::Failure {
                partial_results,
                error,
            } => {
                let index = partial_results.len();
                Err(TextflowError::StepExecution {
                    step: steps[index],
                    index,
                    message: error,
                })
            }
        }
    }

    fn publish(&self, event: RunEvent) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textflow_core::types::{RunStatus, StepKind};
    use textflow_test_utils::{run_input, EchoProcessor, MemoryHistoryStore, ScriptedProcessor};

    fn runner(
        processor: impl StepProcessor,
        store: &Arc<MemoryHistoryStore>,
    ) -> WorkflowRunner {
        WorkflowRunner::new(Arc::new(processor), store.clone())
    }

    #[tokio::test]
    async fn test_successful_run_is_recorded() {
        let store = Arc::new(MemoryHistoryStore::new());
        let runner = runner(
            ScriptedProcessor::new()
                .respond(StepKind::CleanText, "clean text")
                .respond(StepKind::Summarize, "Summary."),
            &store,
        );

        let results = runner
            .run(run_input("raw noisy text...", &[StepKind::CleanText, StepKind::Summarize]))
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![
                StepResult::new(StepKind::CleanText, "raw noisy text...", "clean text"),
                StepResult::new(StepKind::Summarize, "clean text", "Summary."),
            ]
        );

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RunStatus::Completed);
        assert_eq!(records[0].results, results);
        assert!(records[0].error.is_none());
    }

    #[tokio::test]
    async fn test_failed_run_surfaces_step_error_and_records_partial() {
        let store = Arc::new(MemoryHistoryStore::new());
        let runner = runner(
            ScriptedProcessor::new()
                .respond(StepKind::CleanText, "clean text")
                .fail(StepKind::TagCategory, "rate limited"),
            &store,
        );

        let err = runner
            .run(run_input("original", &[StepKind::CleanText, StepKind::TagCategory]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "rate limited");
        assert!(matches!(
            err,
            TextflowError::StepExecution {
                step: StepKind::TagCategory,
                index: 1,
                ..
            }
        ));

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RunStatus::Failed);
        assert_eq!(records[0].error.as_deref(), Some("rate limited"));
        assert_eq!(
            records[0].results,
            vec![StepResult::new(StepKind::CleanText, "original", "clean text")]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_no_record() {
        let store = Arc::new(MemoryHistoryStore::new());
        let processor = Arc::new(EchoProcessor::new());
        let runner = WorkflowRunner::new(processor.clone(), store.clone());

        let empty = runner
            .run(run_input("", &[StepKind::CleanText, StepKind::Summarize]))
            .await
            .unwrap_err();
        assert!(empty.is_validation());

        let one_step = runner
            .run(run_input("text", &[StepKind::Summarize]))
            .await
            .unwrap_err();
        assert!(one_step.is_validation());

        assert_eq!(processor.call_count(), 0);
        assert_eq!(store.append_attempts(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_change_success() {
        let store = Arc::new(MemoryHistoryStore::failing());
        let runner = runner(EchoProcessor::new(), &store);

        let run = runner
            .execute(run_input("x", &[StepKind::CleanText, StepKind::Summarize]))
            .await
            .unwrap();

        assert_eq!(run.results.len(), 2);
        assert!(!run.persisted.is_stored());
        assert_eq!(store.append_attempts(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_mask_step_error() {
        let store = Arc::new(MemoryHistoryStore::failing());
        let runner = runner(EchoProcessor::failing_on_call(2, "rate limited"), &store);

        let err = runner
            .run(run_input("x", &[StepKind::CleanText, StepKind::Summarize]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(store.append_attempts(), 1);
    }

    #[tokio::test]
    async fn test_publishes_run_lifecycle() {
        let store = Arc::new(MemoryHistoryStore::new());
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let runner = runner(EchoProcessor::new(), &store).with_event_bus(bus);

        let run = runner
            .execute(run_input("x", &[StepKind::CleanText, StepKind::Summarize]))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id(), &run.run_id);
            kinds.push(match event {
                RunEvent::RunStarted { step_count, .. } => {
                    assert_eq!(step_count, 2);
                    "started"
                }
                RunEvent::StepCompleted { .. } => "step",
                RunEvent::RunCompleted { .. } => "completed",
                RunEvent::RecordPersisted { .. } => "persisted",
                other => panic!("unexpected event: {:?}", other),
            });
        }
        assert_eq!(kinds, vec!["started", "step", "step", "completed", "persisted"]);
    }
}
