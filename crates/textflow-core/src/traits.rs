use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Step processor performing one text transformation.
pub trait StepProcessor: Send + Sync + 'static {
    /// Processor name (e.g., "gemini", "backend").
    fn name(&self) -> &str;

    /// Run a single step over `text` and return the transformed text.
    fn process(&self, kind: StepKind, text: &str) -> BoxFuture<'_, Result<String>>;

    /// Probe the backend. Never fails; problems are reported in the result.
    fn health(&self) -> BoxFuture<'_, BackendHealth> {
        Box::pin(async { BackendHealth::healthy() })
    }
}

/// CRUD over workflow definitions.
pub trait WorkflowStore: Send + Sync + 'static {
    /// Persist a newly created workflow.
    fn create_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>>;

    /// All workflows, newest first.
    fn list_workflows(&self) -> BoxFuture<'_, Result<Vec<Workflow>>>;

    /// Look up a workflow by id.
    fn get_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>>;

    /// Delete a workflow. Returns false if it did not exist.
    fn delete_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<bool>>;
}

/// Append-only collection of run records.
pub trait RunHistoryStore: Send + Sync + 'static {
    /// Append a run record. Records are never updated or deleted through this trait.
    fn append(&self, record: &RunRecord) -> BoxFuture<'_, Result<()>>;

    /// Most recent runs across all workflows, newest first.
    fn list_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<RunRecord>>>;

    /// Most recent runs of one workflow, newest first.
    fn list_for_workflow(
        &self,
        id: &WorkflowId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<RunRecord>>>;

    /// Check that the store is reachable.
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
