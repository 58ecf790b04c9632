pub mod executor;
pub mod orchestrator;
pub mod recorder;
pub mod run_log;

pub use executor::PipelineExecutor;
pub use orchestrator::{CompletedRun, WorkflowRunner};
pub use recorder::{PersistResult, RunRecorder};
pub use run_log::RunLogger;
