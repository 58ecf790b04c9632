use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use textflow_core::event::EventBus;
use textflow_core::types::RunEvent;

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per line to
/// `{log_dir}/{timestamp}.jsonl`. Lines are flushed as they are written, so a
/// crash loses at most the entry in flight.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = runs and persistence, 2 = also steps.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and log in a background task.
    ///
    /// Events published after this returns are guaranteed to be seen.
    pub fn spawn(self, event_bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    /// Write entries until cancellation or until the bus is dropped.
    pub async fn run(self, mut rx: broadcast::Receiver<RunEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = self.log_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            // Queued events are written before cancellation is honoured.
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let entry = match self.event_to_entry(&event) {
                                Some(e) => e,
                                None => continue,
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert a RunEvent to a log entry (None if filtered by level).
    fn event_to_entry(&self, event: &RunEvent) -> Option<LogEntry> {
        let entry = |event_type: &'static str,
                     step_index: Option<usize>,
                     detail: Option<serde_json::Value>| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().0.clone(),
            event_type,
            step_index,
            detail,
        };

        match event {
            // L1: runs and persistence
            RunEvent::RunStarted {
                workflow_id,
                step_count,
                ..
            } => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({
                    "workflow_id": workflow_id.0,
                    "step_count": step_count,
                })),
            )),
            RunEvent::RunCompleted { workflow_id, .. } => Some(entry(
                "run_completed",
                None,
                Some(serde_json::json!({ "workflow_id": workflow_id.0 })),
            )),
            RunEvent::RunFailed {
                workflow_id, error, ..
            } => Some(entry(
                "run_failed",
                None,
                Some(serde_json::json!({
                    "workflow_id": workflow_id.0,
                    "error": error,
                })),
            )),
            RunEvent::RecordPersisted { .. } => Some(entry("record_persisted", None, None)),
            RunEvent::RecordPersistFailed { error, .. } => Some(entry(
                "record_persist_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),

            // L2: per-step
            RunEvent::StepCompleted { index, step, .. } if self.level >= 2 => Some(entry(
                "step_completed",
                Some(*index),
                Some(serde_json::json!({ "step": step.as_str() })),
            )),
            RunEvent::StepFailed {
                index, step, error, ..
            } if self.level >= 2 => Some(entry(
                "step_failed",
                Some(*index),
                Some(serde_json::json!({
                    "step": step.as_str(),
                    "error": error,
                })),
            )),

            _ => None,
        }
    }
}
