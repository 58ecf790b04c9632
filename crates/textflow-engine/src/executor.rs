use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use textflow_core::event::EventBus;
use textflow_core::traits::StepProcessor;
use textflow_core::types::{Outcome, RunEvent, RunId, StepKind, StepResult};

/// Drives an ordered list of steps through a step processor.
///
/// Each step after the first consumes the previous step's output. The first
/// failing step ends the pipeline; nothing is retried and nothing is persisted
/// here.
pub struct PipelineExecutor {
    processor: Arc<dyn StepProcessor>,
    event_bus: Option<Arc<EventBus>>,
}

impl PipelineExecutor {
    pub fn new(processor: Arc<dyn StepProcessor>) -> Self {
        Self {
            processor,
            event_bus: None,
        }
    }

    /// Publish per-step events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn processor(&self) -> &Arc<dyn StepProcessor> {
        &self.processor
    }

    /// Execute `steps` in order starting from `input_text`.
    ///
    /// The caller guarantees non-empty text and at least two steps. No upper
    /// bound is applied: the chain is as long as `steps`.
    pub async fn execute(&self, run_id: &RunId, input_text: &str, steps: &[StepKind]) -> Outcome {
        let start = Instant::now();
        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());
        let mut current = input_text.to_string();

        for (index, &step) in steps.iter().enumerate() {
            debug!(run_id = %run_id, index, step = %step, "Executing step");

            match self.processor.process(step, &current).await {
                Ok(output) => {
                    self.publish(RunEvent::StepCompleted {
                        run_id: run_id.clone(),
                        index,
                        step,
                    });
                    let input = std::mem::replace(&mut current, output.clone());
                    results.push(StepResult::new(step, input, output));
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(
                        run_id = %run_id,
                        index,
                        step = %step,
                        error = %error,
                        "Step failed, stopping pipeline"
                    );
                    self.publish(RunEvent::StepFailed {
                        run_id: run_id.clone(),
                        index,
                        step,
                        error: error.clone(),
                    });
                    return Outcome::Failure {
                        partial_results: results,
                        error,
                    };
                }
            }
        }

        info!(
            run_id = %run_id,
            steps = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline completed"
        );
        Outcome::Success { results }
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
    use textflow_test_utils::{EchoProcessor, ScriptedProcessor};

    #[tokio::test]
    async fn test_outputs_chain_into_next_input() {
        let processor = Arc::new(
            ScriptedProcessor::new()
                .respond(StepKind::CleanText, "clean text")
                .respond(StepKind::Summarize, "Summary."),
        );
        let executor = PipelineExecutor::new(processor.clone());

        let outcome = executor
            .execute(
                &RunId::new(),
                "raw noisy text...",
                &[StepKind::CleanText, StepKind::Summarize],
            )
            .await;

        assert_eq!(
            outcome,
            Outcome::Success {
                results: vec![
                    StepResult::new(StepKind::CleanText, "raw noisy text...", "clean text"),
                    StepResult::new(StepKind::Summarize, "clean text", "Summary."),
                ]
            }
        );
        assert_eq!(
            processor.calls(),
            vec![
                (StepKind::CleanText, "raw noisy text...".to_string()),
                (StepKind::Summarize, "clean text".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_failure_stops_pipeline() {
        let processor = Arc::new(
            ScriptedProcessor::new()
                .respond(StepKind::CleanText, "clean text")
                .fail(StepKind::Summarize, "rate limited")
                .respond(StepKind::TagCategory, "Technology"),
        );
        let executor = PipelineExecutor::new(processor.clone());

        let outcome = executor
            .execute(
                &RunId::new(),
                "raw",
                &[StepKind::CleanText, StepKind::Summarize, StepKind::TagCategory],
            )
            .await;

        assert_eq!(outcome.error(), Some("rate limited"));
        assert_eq!(
            outcome.results(),
            &[StepResult::new(StepKind::CleanText, "raw", "clean text")]
        );
        // tag-category never ran
        assert_eq!(processor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_on_first_step_has_no_results() {
        let processor = Arc::new(EchoProcessor::failing_on_call(1, "backend unreachable"));
        let executor = PipelineExecutor::new(processor.clone());

        let outcome = executor
            .execute(&RunId::new(), "text", &[StepKind::CleanText, StepKind::Summarize])
            .await;

        assert!(outcome.results().is_empty());
        assert_eq!(outcome.error(), Some("backend unreachable"));
        assert_eq!(processor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_upper_bound_on_steps() {
        let processor = Arc::new(EchoProcessor::new());
        let executor = PipelineExecutor::new(processor.clone());
        let steps = [
            StepKind::CleanText,
            StepKind::Summarize,
            StepKind::ExtractKeyPoints,
            StepKind::TagCategory,
            StepKind::Summarize,
            StepKind::CleanText,
        ];

        let outcome = executor.execute(&RunId::new(), "x", &steps).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.results().len(), steps.len());
    }

    #[tokio::test]
    async fn test_publishes_step_events() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let executor = PipelineExecutor::new(Arc::new(EchoProcessor::failing_on_call(2, "boom")))
            .with_event_bus(bus.clone());
        let run_id = RunId::new();

        executor
            .execute(&run_id, "x", &[StepKind::CleanText, StepKind::Summarize])
            .await;

        match rx.recv().await.unwrap() {
            RunEvent::StepCompleted { index, step, .. } => {
                assert_eq!(index, 0);
                assert_eq!(step, StepKind::CleanText);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            RunEvent::StepFailed {
                run_id: id,
                index,
                error,
                ..
            } => {
                assert_eq!(id, run_id);
                assert_eq!(index, 1);
                assert_eq!(error, "boom");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
