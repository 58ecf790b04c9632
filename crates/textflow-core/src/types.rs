use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TextflowError};

/// Fewest steps a workflow (and a run) may have.
pub const MIN_STEPS: usize = 2;
/// Most steps a workflow may have. Only checked when a workflow is created.
pub const MAX_STEPS: usize = 4;

/// Unique workflow identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique run identifier. Every orchestrator invocation gets a fresh one.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of text transformations a step can perform.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    CleanText,
    Summarize,
    ExtractKeyPoints,
    TagCategory,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::CleanText,
        StepKind::Summarize,
        StepKind::ExtractKeyPoints,
        StepKind::TagCategory,
    ];

    /// Wire name, e.g. `extract-key-points`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CleanText => "clean-text",
            Self::Summarize => "summarize",
            Self::ExtractKeyPoints => "extract-key-points",
            Self::TagCategory => "tag-category",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = TextflowError;

    fn from_str(s: &str) -> Result<Self> {
        StepKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TextflowError::Validation(format!("Unknown step type: {}", s)))
    }
}

/// One entry of a workflow's pipeline. Serialized as `{"type": "<kind>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(rename = "type")]
    pub kind: StepKind,
}

impl From<StepKind> for StepDefinition {
    fn from(kind: StepKind) -> Self {
        Self { kind }
    }
}

/// Extract the bare kinds from a list of step definitions.
pub fn step_kinds(steps: &[StepDefinition]) -> Vec<StepKind> {
    steps.iter().map(|s| s.kind).collect()
}

/// A workflow creation request, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorkflow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// A named, validated pipeline of 2 to 4 steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Validate a creation request and assign a fresh identity.
    pub fn create(new: NewWorkflow) -> Result<Self> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(TextflowError::Validation(
                "Workflow must have a name".to_string(),
            ));
        }
        if !(MIN_STEPS..=MAX_STEPS).contains(&new.steps.len()) {
            return Err(TextflowError::Validation(format!(
                "Workflow must have between {} and {} steps",
                MIN_STEPS, MAX_STEPS
            )));
        }

        let description = new
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id: WorkflowId::new(),
            name: name.to_string(),
            description,
            steps: new.steps,
            created_at: Utc::now(),
        })
    }

    pub fn step_kinds(&self) -> Vec<StepKind> {
        step_kinds(&self.steps)
    }
}

/// Everything a run needs, captured once before execution starts.
///
/// The workflow name and step list are copies: editing or deleting the
/// workflow later never changes what a past run recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl RunInput {
    pub fn new(
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        input_text: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Self {
        Self {
            workflow_id,
            workflow_name: workflow_name.into(),
            input_text: input_text.into(),
            steps,
        }
    }

    /// Snapshot a stored workflow for a run.
    pub fn from_workflow(workflow: &Workflow, input_text: impl Into<String>) -> Self {
        Self::new(
            workflow.id.clone(),
            workflow.name.clone(),
            input_text,
            workflow.steps.clone(),
        )
    }

    /// Reject input that must never start executing.
    ///
    /// The upper step bound is intentionally not re-checked here.
    pub fn validate(&self) -> Result<()> {
        if self.input_text.trim().is_empty() || self.steps.len() < MIN_STEPS {
            return Err(TextflowError::Validation(format!(
                "Input text and at least {} steps are required",
                MIN_STEPS
            )));
        }
        Ok(())
    }

    pub fn step_kinds(&self) -> Vec<StepKind> {
        step_kinds(&self.steps)
    }
}

/// What one executed step consumed and produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepKind,
    pub input: String,
    pub output: String,
}

impl StepResult {
    pub fn new(step: StepKind, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            step,
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = TextflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TextflowError::Database(format!("Unknown run status: {}", other))),
        }
    }
}

/// Result of driving a pipeline through the step processor.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every step ran; one result per step, in order.
    Success { results: Vec<StepResult> },
    /// Execution stopped at the first failing step.
    Failure {
        partial_results: Vec<StepResult>,
        error: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn results(&self) -> &[StepResult] {
        match self {
            Self::Success { results } => results,
            Self::Failure {
                partial_results, ..
            } => partial_results,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Self::Success { .. } => RunStatus::Completed,
            Self::Failure { .. } => RunStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}

/// Immutable history entry for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub input_text: String,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub results: Vec<StepResult>,
    pub status: RunStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Health of the step-processing backend as seen by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub reachable: bool,
    pub llm_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendHealth {
    pub fn healthy() -> Self {
        Self {
            reachable: true,
            llm_connected: true,
            detail: None,
        }
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            llm_connected: false,
            detail: Some(detail.into()),
        }
    }
}

/// Run lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Validation passed and the first step is about to run.
    RunStarted {
        run_id: RunId,
        workflow_id: WorkflowId,
        step_count: usize,
    },
    /// A step produced output.
    StepCompleted {
        run_id: RunId,
        index: usize,
        step: StepKind,
    },
    /// A step failed; no later step will run.
    StepFailed {
        run_id: RunId,
        index: usize,
        step: StepKind,
        error: String,
    },
    /// All steps succeeded.
    RunCompleted {
        run_id: RunId,
        workflow_id: WorkflowId,
    },
    /// The run stopped at a failing step.
    RunFailed {
        run_id: RunId,
        workflow_id: WorkflowId,
        error: String,
    },
    /// The run record reached the history store.
    RecordPersisted { run_id: RunId },
    /// The history store rejected the run record.
    RecordPersistFailed { run_id: RunId, error: String },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RecordPersisted { run_id }
            | Self::RecordPersistFailed { run_id, .. } => run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(kinds: &[StepKind]) -> Vec<StepDefinition> {
        kinds.iter().copied().map(StepDefinition::from).collect()
    }

    #[test]
    fn test_step_kind_wire_names() {
        let json = serde_json::to_string(&StepDefinition::from(StepKind::ExtractKeyPoints)).unwrap();
        assert_eq!(json, r#"{"type":"extract-key-points"}"#);

        let parsed: StepDefinition = serde_json::from_str(r#"{"type":"tag-category"}"#).unwrap();
        assert_eq!(parsed.kind, StepKind::TagCategory);
    }

    #[test]
    fn test_unknown_step_kind_rejected() {
        assert!(serde_json::from_str::<StepDefinition>(r#"{"type":"translate"}"#).is_err());

        let err = "translate".parse::<StepKind>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Unknown step type: translate"));
    }

    #[test]
    fn test_step_kind_from_str_round_trips_all() {
        for kind in StepKind::ALL {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_workflow_create_trims_and_validates() {
        let wf = Workflow::create(NewWorkflow {
            name: "  Digest  ".to_string(),
            description: Some("   ".to_string()),
            steps: steps(&[StepKind::CleanText, StepKind::Summarize]),
        })
        .unwrap();
        assert_eq!(wf.name, "Digest");
        assert!(wf.description.is_none());
        assert_eq!(wf.step_kinds(), vec![StepKind::CleanText, StepKind::Summarize]);
    }

    #[test]
    fn test_workflow_create_step_bounds() {
        let too_few = NewWorkflow {
            name: "one".to_string(),
            description: None,
            steps: steps(&[StepKind::Summarize]),
        };
        assert!(Workflow::create(too_few).unwrap_err().is_validation());

        let too_many = NewWorkflow {
            name: "five".to_string(),
            description: None,
            steps: steps(&[
                StepKind::CleanText,
                StepKind::Summarize,
                StepKind::ExtractKeyPoints,
                StepKind::TagCategory,
                StepKind::Summarize,
            ]),
        };
        assert!(Workflow::create(too_many).unwrap_err().is_validation());

        let blank_name = NewWorkflow {
            name: " ".to_string(),
            description: None,
            steps: steps(&[StepKind::CleanText, StepKind::Summarize]),
        };
        assert!(Workflow::create(blank_name).unwrap_err().is_validation());
    }

    #[test]
    fn test_run_input_validation() {
        let two = steps(&[StepKind::CleanText, StepKind::Summarize]);

        let ok = RunInput::new(WorkflowId::new(), "wf", "some text", two.clone());
        assert!(ok.validate().is_ok());

        let empty = RunInput::new(WorkflowId::new(), "wf", "", two.clone());
        assert!(empty.validate().unwrap_err().is_validation());

        let blank = RunInput::new(WorkflowId::new(), "wf", "  \n ", two);
        assert!(blank.validate().is_err());

        let one = RunInput::new(WorkflowId::new(), "wf", "text", steps(&[StepKind::Summarize]));
        assert!(one.validate().is_err());
    }

    #[test]
    fn test_run_input_does_not_recheck_upper_bound() {
        let five = steps(&[
            StepKind::CleanText,
            StepKind::Summarize,
            StepKind::ExtractKeyPoints,
            StepKind::TagCategory,
            StepKind::Summarize,
        ]);
        let input = RunInput::new(WorkflowId::new(), "wf", "text", five);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_run_input_wire_format_is_camel_case() {
        let body = r#"{
            "workflowId": "wf-1",
            "workflowName": "Digest",
            "inputText": "hello",
            "steps": [{"type": "clean-text"}, {"type": "summarize"}]
        }"#;
        let input: RunInput = serde_json::from_str(body).unwrap();
        assert_eq!(input.workflow_id, WorkflowId::from_string("wf-1"));
        assert_eq!(input.input_text, "hello");
        assert_eq!(input.step_kinds(), vec![StepKind::CleanText, StepKind::Summarize]);
    }

    #[test]
    fn test_outcome_accessors() {
        let partial = vec![StepResult::new(StepKind::CleanText, "raw", "clean")];
        let failure = Outcome::Failure {
            partial_results: partial.clone(),
            error: "rate limited".to_string(),
        };
        assert!(!failure.is_success());
        assert_eq!(failure.status(), RunStatus::Failed);
        assert_eq!(failure.error(), Some("rate limited"));
        assert_eq!(failure.results(), partial.as_slice());

        let success = Outcome::Success { results: partial };
        assert_eq!(success.status(), RunStatus::Completed);
        assert!(success.error().is_none());
    }

    #[test]
    fn test_run_status_parse() {
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!("pending".parse::<RunStatus>().is_err());
        assert_eq!(serde_json::to_string(&RunStatus::Completed).unwrap(), "\"completed\"");
    }
}
