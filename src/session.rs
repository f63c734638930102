//! Per-session workspace management.
//!
//! Every client session owns exactly one directory under the configured
//! workspace root, named by the session id itself — path uniqueness falls
//! directly out of id uniqueness, with no shared counter to coordinate.
//! Session ids are validated against a strict single-path-segment pattern
//! before ever touching the filesystem, so an id can never escape the root.
//!
//! Teardown happens two ways, both ending in [`SessionStore::release`]:
//! an explicit end-of-session call, or the idle reaper started by
//! [`SessionStore::spawn_reaper`], which sweeps last-access timestamps on a
//! fixed interval. There are no deletion timers armed at acquire time.

use crate::error::IngestError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One safe path segment: starts alphanumeric, then up to 63 of
/// `[A-Za-z0-9._-]`. No separators, no `..`, no hidden-file prefix.
static SESSION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("session id regex"));

/// Maps opaque session ids to isolated filesystem workspaces.
///
/// All methods take `&self`; the store is shared as an `Arc` between the
/// gateway, the job runner, and the reaper task.
pub struct SessionStore {
    root: PathBuf,
    /// Last-access timestamp per live session, read by the idle reaper.
    sessions: Mutex<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The workspace root this store was created with.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the workspace path for a session id without creating it.
    pub fn workspace(&self, session_id: &str) -> Result<PathBuf, IngestError> {
        if !SESSION_ID_RE.is_match(session_id) {
            return Err(IngestError::InvalidSessionId(session_id.to_string()));
        }
        Ok(self.root.join(session_id))
    }

    /// Create (or re-touch) the workspace for `session_id` and return its path.
    ///
    /// Creation is idempotent: a directory that already exists is success,
    /// so concurrent acquires for the same id cannot race each other into an
    /// error. Distinct ids map to distinct directories by construction.
    pub fn acquire(&self, session_id: &str) -> Result<PathBuf, IngestError> {
        let dir = self.workspace(session_id)?;
        std::fs::create_dir_all(&dir).map_err(|source| IngestError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut sessions = self.sessions.lock().expect("session map poisoned");
        if sessions.insert(session_id.to_string(), Instant::now()).is_none() {
            debug!(session = session_id, path = %dir.display(), "workspace acquired");
        }
        Ok(dir)
    }

    /// Refresh a session's last-access timestamp so the reaper leaves it
    /// alone while a job is making progress.
    pub fn touch(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        if let Some(at) = sessions.get_mut(session_id) {
            *at = Instant::now();
        }
    }

    /// Tear down a session's workspace and forget it.
    ///
    /// A workspace that is already gone counts as success: teardown may race
    /// a still-pending job (or a previous release), and the end state is the
    /// same either way.
    pub fn release(&self, session_id: &str) -> Result<(), IngestError> {
        let dir = self.workspace(session_id)?;
        self.sessions
            .lock()
            .expect("session map poisoned")
            .remove(session_id);

        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(session = session_id, "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(IngestError::Io { path: dir, source }),
        }
    }

    /// Number of sessions currently tracked.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().expect("session map poisoned").len()
    }

    /// Release every session idle for longer than `idle_after`.
    /// Returns how many were reaped.
    pub fn sweep_idle(&self, idle_after: Duration) -> usize {
        let expired: Vec<String> = {
            let sessions = self.sessions.lock().expect("session map poisoned");
            sessions
                .iter()
                .filter(|(_, at)| at.elapsed() >= idle_after)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut reaped = 0;
        for id in expired {
            match self.release(&id) {
                Ok(()) => reaped += 1,
                Err(e) => warn!(session = %id, error = %e, "idle reap failed"),
            }
        }
        reaped
    }

    /// Start the idle reaper: a fixed-interval sweep over last-access
    /// metadata. The returned handle can be aborted at shutdown.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        every: Duration,
        idle_after: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately; skip it so a freshly started
            // reaper never races the first acquire.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = store.sweep_idle(idle_after);
                if reaped > 0 {
                    info!(reaped, "idle reaper swept sessions");
                }
            }
        })
    }
}
