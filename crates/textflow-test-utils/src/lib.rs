//! Test doubles for the step processor and run history store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use textflow_core::error::{Result, TextflowError};
use textflow_core::traits::{RunHistoryStore, StepProcessor};
use textflow_core::types::*;

/// Build step definitions from kinds.
pub fn steps(kinds: &[StepKind]) -> Vec<StepDefinition> {
    kinds.iter().copied().map(StepDefinition::from).collect()
}

/// A run input for an ad-hoc workflow.
pub fn run_input(text: &str, kinds: &[StepKind]) -> RunInput {
    RunInput::new(WorkflowId::from_string("wf-test"), "Test workflow", text, steps(kinds))
}

/// Processor with a fixed response per step kind.
///
/// Kinds without a scripted response fail.
#[derive(Default)]
pub struct ScriptedProcessor {
    responses: HashMap<StepKind, std::result::Result<String, String>>,
    calls: Mutex<Vec<(StepKind, String)>>,
    delay: Option<Duration>,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, kind: StepKind, output: &str) -> Self {
        self.responses.insert(kind, Ok(output.to_string()));
        self
    }

    pub fn fail(mut self, kind: StepKind, message: &str) -> Self {
        self.responses.insert(kind, Err(message.to_string()));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every (kind, input) pair seen so far, in call order.
    pub fn calls(&self) -> Vec<(StepKind, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl StepProcessor for ScriptedProcessor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn process(&self, kind: StepKind, text: &str) -> BoxFuture<'_, Result<String>> {
        let text = text.to_string();
        Box::pin(async move {
            self.calls.lock().unwrap().push((kind, text));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.responses.get(&kind) {
                Some(Ok(output)) => Ok(output.clone()),
                Some(Err(message)) => Err(TextflowError::Processor(message.clone())),
                None => Err(TextflowError::Processor(format!(
                    "no scripted response for {}",
                    kind
                ))),
            }
        })
    }
}

/// Deterministic processor: wraps its input as `<kind>(<input>)`.
///
/// Optionally fails on the n-th call (1-based).
#[derive(Default)]
pub struct EchoProcessor {
    fail_on_call: Option<(usize, String)>,
    calls: AtomicUsize,
}

impl EchoProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(call: usize, message: &str) -> Self {
        Self {
            fail_on_call: Some((call, message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn expected_output(kind: StepKind, input: &str) -> String {
        format!("{}({})", kind, input)
    }
}

impl StepProcessor for EchoProcessor {
    fn name(&self) -> &str {
        "echo"
    }

    fn process(&self, kind: StepKind, text: &str) -> BoxFuture<'_, Result<String>> {
        let text = text.to_string();
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Give other tasks a chance to interleave.
            tokio::task::yield_now().await;
            match self.fail_on_call {
                Some((n, ref message)) if n == call => {
                    Err(TextflowError::Processor(message.clone()))
                }
                _ => Ok(Self::expected_output(kind, &text)),
            }
        })
    }

    fn health(&self) -> BoxFuture<'_, BackendHealth> {
        Box::pin(async { BackendHealth::healthy() })
    }
}

/// In-memory run history with switchable append failures.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<RunRecord>>,
    fail_appends: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every append fails.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    /// Records successfully appended, oldest first.
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of append calls, including failed ones.
    pub fn append_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RunHistoryStore for MemoryHistoryStore {
    fn append(&self, record: &RunRecord) -> BoxFuture<'_, Result<()>> {
        let record = record.clone();
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(TextflowError::Database("disk full".to_string()));
            }
            self.records.lock().unwrap().push(record);
            Ok(())
        })
    }

    fn list_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<RunRecord>>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            Ok(records.iter().rev().take(limit).cloned().collect())
        })
    }

    fn list_for_workflow(
        &self,
        id: &WorkflowId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RunRecord>>> {
        let id = id.clone();
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .rev()
                .filter(|r| r.workflow_id == id)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(TextflowError::Database("store unavailable".to_string()));
            }
            Ok(())
        })
    }
}
