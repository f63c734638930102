//! Push notification channel from the job runner to the originating client.
//!
//! The broker is an explicitly constructed instance handed to the
//! [`crate::runner::JobRunner`] at construction time — there is no
//! process-wide registry. Delivery is deliberately fire-and-forget: if
//! nobody is subscribed under a key when an event fires, the event is
//! dropped. Clients that must not miss a terminal outcome poll
//! [`crate::runner::JobRunner::status`] as their fallback.
//!
//! Isolation invariant: a subscriber under one key never observes another
//! key's events, mirroring the per-session isolation of the workspace tree.

use crate::record::Record;
use crate::runner::JobId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Lifecycle status carried by a [`ProgressEvent`].
///
/// Serializes to the wire shapes consumed by push-channel clients:
/// `{"status":"started"}`, `{"status":"done","data":[…]}`,
/// `{"status":"failed","error":"…"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Done { data: Vec<Record> },
    Failed { error: String },
}

/// An immutable notification about one job's lifecycle.
///
/// Each job emits `Started` at most once and exactly one terminal event
/// (`Done` or `Failed`); the runner enforces that, not the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub status: ProgressStatus,
}

impl ProgressEvent {
    pub fn started(job_id: JobId) -> Self {
        Self {
            job_id,
            status: ProgressStatus::Started,
        }
    }

    pub fn done(job_id: JobId, data: Vec<Record>) -> Self {
        Self {
            job_id,
            status: ProgressStatus::Done { data },
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            status: ProgressStatus::Failed {
                error: error.into(),
            },
        }
    }

    /// Whether this event ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, ProgressStatus::Started)
    }
}

/// Topic-keyed, at-most-once event broker.
///
/// One subscriber per key: a new `subscribe` under the same key replaces the
/// previous receiver (its sender is dropped, closing the old channel), which
/// matches a client reconnecting with the same channel key.
#[derive(Default)]
pub struct ProgressBroker {
    topics: Mutex<HashMap<String, mpsc::UnboundedSender<ProgressEvent>>>,
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber to future events for `key` only.
    pub fn subscribe(&self, key: &str) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .expect("topic map poisoned")
            .insert(key.to_string(), tx);
        rx
    }

    /// Detach the subscriber for `key`, if any. Subsequent publishes for the
    /// key are dropped.
    pub fn unsubscribe(&self, key: &str) {
        self.topics.lock().expect("topic map poisoned").remove(key);
    }

    /// Fire-and-forget delivery of `event` to the subscriber of `key`.
    ///
    /// No subscriber, or a subscriber whose receiver is gone, means the
    /// event is dropped; a dead sender is pruned so the map does not grow
    /// with disconnected clients.
    pub fn publish(&self, key: &str, event: ProgressEvent) {
        let mut topics = self.topics.lock().expect("topic map poisoned");
        match topics.get(key) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!(key, "subscriber gone, dropping event and pruning topic");
                    topics.remove(key);
                }
            }
            None => debug!(key, "no subscriber, dropping event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn publish_without_subscriber_is_silent() {
        let broker = ProgressBroker::new();
        broker.publish("nobody", ProgressEvent::started(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn subscriber_sees_events_in_publish_order() {
        let broker = ProgressBroker::new();
        let mut rx = broker.subscribe("k1");
        let job = Uuid::new_v4();

        broker.publish("k1", ProgressEvent::started(job));
        broker.publish("k1", ProgressEvent::done(job, vec![]));

        assert_eq!(rx.recv().await.unwrap().status, ProgressStatus::Started);
        let terminal = rx.recv().await.unwrap();
        assert!(terminal.is_terminal());
        assert_eq!(terminal.job_id, job);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let broker = ProgressBroker::new();
        let mut rx_a = broker.subscribe("a");
        let mut rx_b = broker.subscribe("b");

        broker.publish("a", ProgressEvent::failed(Uuid::new_v4(), "boom"));

        let got = rx_a.recv().await.unwrap();
        assert!(matches!(got.status, ProgressStatus::Failed { .. }));
        assert!(
            rx_b.try_recv().is_err(),
            "key b must not observe key a's events"
        );
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_receiver() {
        let broker = ProgressBroker::new();
        let mut old = broker.subscribe("k");
        let mut new = broker.subscribe("k");

        broker.publish("k", ProgressEvent::started(Uuid::new_v4()));

        assert!(new.try_recv().is_ok());
        // The old channel was closed by the replacement.
        assert!(matches!(
            old.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn wire_shapes_match_contract() {
        let job = Uuid::new_v4();

        let started = serde_json::to_value(ProgressEvent::started(job)).unwrap();
        assert_eq!(
            started,
            json!({"job_id": job.to_string(), "status": "started"})
        );

        let mut record = Record::new();
        record.insert("Date", "2024-03-01");
        let done = serde_json::to_value(ProgressEvent::done(job, vec![record])).unwrap();
        assert_eq!(
            done,
            json!({
                "job_id": job.to_string(),
                "status": "done",
                "data": [{"Date": "2024-03-01"}],
            })
        );

        let failed =
            serde_json::to_value(ProgressEvent::failed(job, "wrong passphrase")).unwrap();
        assert_eq!(
            failed,
            json!({
                "job_id": job.to_string(),
                "status": "failed",
                "error": "wrong passphrase",
            })
        );
    }
}
