//! Job orchestration: one background task per accepted upload.
//!
//! The runner owns failure containment for the whole pipeline. `submit`
//! registers the job and returns immediately; everything after — waiting for
//! a worker permit, decryption, extraction, artifact write — happens on a
//! spawned task, and every stage error is caught there and surfaced through
//! the progress channel's `failed` event, never back up the (long-gone)
//! accepting call.
//!
//! ## State machine
//!
//! ```text
//! Created ──▶ Decrypting ──▶ Extracting ──▶ Done
//!                  │              │
//!                  └──────────────┴───────▶ Failed
//! ```
//!
//! `Done` and `Failed` are terminal; [`JobRunner::advance`] refuses to leave
//! them, and a terminal progress event is emitted only when the transition
//! into the terminal phase actually happened — exactly once per job.
//!
//! Concurrency is bounded by a semaphore sized
//! [`crate::config::IngestConfig::max_concurrent_jobs`]: a flood of uploads
//! queues on permits instead of spawning an unbounded set of pdfium workers.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::{decrypt, extract};
use crate::progress::{ProgressBroker, ProgressEvent};
use crate::record::{ExtractionStats, Record};
use crate::session::SessionStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name of the decrypted copy written into the workspace.
pub const UNLOCKED_FILENAME: &str = "unlocked.pdf";

/// Name of the interchange artifact consumed by downstream aggregation.
pub const ARTIFACT_FILENAME: &str = "output.json";

/// Opaque identifier of one ingestion attempt.
pub type JobId = Uuid;

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Created,
    Decrypting,
    Extracting,
    Done,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Failed)
    }
}

/// Everything a submitted job needs to run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Owning session; its workspace holds the source and derived files.
    pub session_id: String,
    /// Path of the uploaded document inside the workspace.
    pub document: PathBuf,
    /// Explicit passphrase, if the client supplied one. Never defaulted.
    pub passphrase: Option<String>,
    /// Progress-channel key; defaults to the session id when absent.
    pub channel_key: Option<String>,
}

impl JobRequest {
    fn channel_key(&self) -> &str {
        self.channel_key.as_deref().unwrap_or(&self.session_id)
    }
}

/// Point-in-time view of a job, for clients polling as a fallback to the
/// push channel.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub session_id: String,
    pub phase: JobPhase,
    /// Upstream error, verbatim, once the job failed.
    pub error: Option<String>,
    /// Extraction counters, once the job is done.
    pub stats: Option<ExtractionStats>,
}

struct JobEntry {
    session_id: String,
    phase: JobPhase,
    error: Option<String>,
    stats: Option<ExtractionStats>,
}

/// Runs ingestion jobs off the accepting path.
pub struct JobRunner {
    store: Arc<SessionStore>,
    broker: Arc<ProgressBroker>,
    config: IngestConfig,
    permits: Arc<Semaphore>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl JobRunner {
    /// Build a runner over an explicitly injected store and broker.
    pub fn new(
        store: Arc<SessionStore>,
        broker: Arc<ProgressBroker>,
        config: IngestConfig,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Arc::new(Self {
            store,
            broker,
            config,
            permits,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Register a job and hand it to a background task.
    ///
    /// Returns the job id immediately; the caller observes the outcome via
    /// the progress channel or [`JobRunner::status`].
    pub fn submit(self: &Arc<Self>, request: JobRequest) -> JobId {
        let job_id = Uuid::new_v4();
        {
            let mut jobs = self.jobs.lock().expect("job map poisoned");
            jobs.insert(
                job_id,
                JobEntry {
                    session_id: request.session_id.clone(),
                    phase: JobPhase::Created,
                    error: None,
                    stats: None,
                },
            );
        }
        info!(job = %job_id, session = %request.session_id, "job created");

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(job_id, request).await;
        });

        job_id
    }

    /// Point-in-time view of a job, if it exists.
    pub fn status(&self, job_id: JobId) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().expect("job map poisoned");
        jobs.get(&job_id).map(|entry| JobSnapshot {
            job_id,
            session_id: entry.session_id.clone(),
            phase: entry.phase,
            error: entry.error.clone(),
            stats: entry.stats.clone(),
        })
    }

    /// Transition a job to `next`, refusing to leave a terminal phase.
    /// Returns whether the transition happened.
    fn advance(&self, job_id: JobId, next: JobPhase) -> bool {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let Some(entry) = jobs.get_mut(&job_id) else {
            warn!(job = %job_id, "transition for unknown job ignored");
            return false;
        };
        if entry.phase.is_terminal() {
            warn!(job = %job_id, from = ?entry.phase, to = ?next, "terminal phase is final, transition ignored");
            return false;
        }
        entry.phase = next;
        true
    }

    /// The per-job background task: permit, stages, exactly one terminal
    /// event.
    async fn run(self: Arc<Self>, job_id: JobId, request: JobRequest) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!(job = %job_id, "worker pool closed before job could start");
                return;
            }
        };

        let key = request.channel_key().to_string();
        self.broker.publish(&key, ProgressEvent::started(job_id));

        match self.run_stages(job_id, &request).await {
            Ok((records, stats)) => {
                if self.advance(job_id, JobPhase::Done) {
                    if let Some(entry) = self.jobs.lock().expect("job map poisoned").get_mut(&job_id)
                    {
                        entry.stats = Some(stats.clone());
                    }
                    info!(job = %job_id, records = records.len(), "job done");
                    self.broker.publish(&key, ProgressEvent::done(job_id, records));
                }
            }
            Err(e) => {
                if self.advance(job_id, JobPhase::Failed) {
                    let message = e.to_string();
                    if let Some(entry) = self.jobs.lock().expect("job map poisoned").get_mut(&job_id)
                    {
                        entry.error = Some(message.clone());
                    }
                    warn!(job = %job_id, error = %message, "job failed");
                    self.broker.publish(&key, ProgressEvent::failed(job_id, message));
                }
            }
        }
    }

    /// Decrypt, extract, persist the artifact. Every error funnels back to
    /// [`JobRunner::run`], which owns the terminal transition.
    async fn run_stages(
        &self,
        job_id: JobId,
        request: &JobRequest,
    ) -> Result<(Vec<Record>, ExtractionStats), IngestError> {
        let workspace = self.store.workspace(&request.session_id)?;
        self.store.touch(&request.session_id);

        self.advance(job_id, JobPhase::Decrypting);
        let unlocked = workspace.join(UNLOCKED_FILENAME);
        let decrypted =
            decrypt::decrypt(&request.document, &unlocked, request.passphrase.as_deref()).await?;
        info!(job = %job_id, pages = decrypted.page_count, "decryption stage complete");

        self.advance(job_id, JobPhase::Extracting);
        let output = extract::extract_records(&decrypted.path, &self.config).await?;

        write_artifact(&workspace.join(ARTIFACT_FILENAME), &output.records).await?;
        self.store.touch(&request.session_id);

        Ok((output.records, output.stats))
    }
}

/// Write the interchange artifact atomically: temp file in the same
/// directory, then rename, so downstream consumers never observe a
/// half-written JSON array.
async fn write_artifact(path: &Path, records: &[Record]) -> Result<(), IngestError> {
    let json = serde_json::to_vec_pretty(records).map_err(|e| IngestError::Internal(
        format!("artifact serialization failed: {e}"),
    ))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|source| IngestError::Io {
            path: tmp_path.clone(),
            source,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(())
}
