//! Best-effort delivery of tracking events.
//!
//! Events go onto an unbounded channel and a background task posts them one
//! by one. A failed post is logged and dropped; nothing is retried and the
//! quiz never waits on it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{QuizBackend, TrackRequest};

pub struct TrackingQueue {
    sender: mpsc::UnboundedSender<TrackRequest>,
    worker: JoinHandle<()>,
}

impl TrackingQueue {
    /// Starts the delivery task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(backend: Arc<dyn QuizBackend>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TrackRequest>();
        let worker = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                match backend.track_event(&request).await {
                    Ok(()) => debug!(event = %request.event_type, "tracking event delivered"),
                    Err(err) => warn!(
                        event = %request.event_type,
                        error = %err,
                        "dropping tracking event"
                    ),
                }
            }
        });
        Self { sender, worker }
    }

    /// Queues `request` without waiting for delivery.
    pub fn enqueue(&self, request: TrackRequest) {
        if let Err(err) = self.sender.send(request) {
            warn!(event = %err.0.event_type, "tracking queue closed; event dropped");
        }
    }

    /// Stops accepting events and waits for queued ones to be attempted.
    pub async fn shutdown(self) {
        let Self { sender, worker } = self;
        drop(sender);
        if let Err(err) = worker.await {
            warn!(error = %err, "tracking worker ended abnormally");
        }
    }
}
