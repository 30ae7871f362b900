//! Caller side of the distributed path: sends hash requests and turns
//! correlated results into records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::config::MessagingConfig;
use crate::error::{HashError, MessagingError};
use crate::pipeline::decode::ImageLoader;
use crate::sink::RecordSink;
use crate::types::{BadFileMarker, HashRecord};

use super::message::Message;
use super::protocol::{HashOutcome, HashRequest, HashResponse, TrackingId, TrackingIdAllocator};
use super::transport::{MessageTransport, Subscription};

/// Counts of requests by how they ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub sent: usize,
    pub hashed: usize,
    /// Answered with a failure by the remote side
    pub failed: usize,
    /// Never sent because the file could not be read
    pub unreadable: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicUsize,
    hashed: AtomicUsize,
    failed: AtomicUsize,
    unreadable: AtomicUsize,
}

struct PendingRequest {
    path: PathBuf,
    _permit: OwnedSemaphorePermit,
}

/// Publishes hash requests and correlates their results by tracking id.
///
/// At most `max_in_flight` requests are outstanding; `request` waits for a
/// slot once that many are unanswered.
pub struct HashRequestProducer {
    transport: Arc<dyn MessageTransport>,
    request_address: String,
    ids: TrackingIdAllocator,
    pending: Mutex<HashMap<TrackingId, PendingRequest>>,
    slots: Arc<Semaphore>,
    loader: ImageLoader,
    sink: Arc<dyn RecordSink>,
    counters: Counters,
}

enum Next {
    Message(Option<Message>),
    SendingDone,
}

impl HashRequestProducer {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        config: &MessagingConfig,
        max_in_flight: usize,
        loader: ImageLoader,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            transport,
            request_address: config.request_address.clone(),
            ids: TrackingIdAllocator::new(),
            pending: Mutex::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            loader,
            sink,
            counters: Counters::default(),
        }
    }

    fn pending_table(&self) -> MutexGuard<'_, HashMap<TrackingId, PendingRequest>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests sent but not yet answered.
    pub fn pending(&self) -> usize {
        self.pending_table().len()
    }

    pub fn summary(&self) -> ProducerSummary {
        ProducerSummary {
            sent: self.counters.sent.load(Ordering::Relaxed),
            hashed: self.counters.hashed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            unreadable: self.counters.unreadable.load(Ordering::Relaxed),
        }
    }

    /// Refuse further requests. Callers waiting for a slot fail with
    /// [`MessagingError::TransportClosed`].
    pub fn close(&self) {
        self.slots.close();
    }

    /// Read `path` and publish a hash request for it.
    ///
    /// Returns the tracking id, or `None` when the file could not be read;
    /// such paths are marked bad right away and never sent.
    pub async fn request(&self, path: &Path) -> Result<Option<TrackingId>, MessagingError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MessagingError::TransportClosed {
                address: self.request_address.clone(),
            })?;

        let bytes = match self.read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("{}", e);
                self.sink.mark_bad(BadFileMarker::new(path));
                self.counters.unreadable.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        let tracking_id = {
            let mut pending = self.pending_table();
            // After wrapping, an old id may still be outstanding.
            let mut id = self.ids.next_id();
            while pending.contains_key(&id) {
                id = self.ids.next_id();
            }
            pending.insert(
                id,
                PendingRequest {
                    path: path.to_path_buf(),
                    _permit: permit,
                },
            );
            id
        };

        let message = HashRequest::new(tracking_id, bytes).into_message();
        if let Err(e) = self.transport.publish(&self.request_address, message).await {
            self.pending_table().remove(&tracking_id);
            return Err(e);
        }
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Sent hash request {} for {:?}", tracking_id, path);
        Ok(Some(tracking_id))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, HashError> {
        let loader = self.loader.clone();
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || loader.read(&owned))
            .await
            .unwrap_or_else(|e| {
                Err(HashError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            })
    }

    /// Resolve one result message against the pending table and write its
    /// record or bad-file marker.
    ///
    /// Results that cannot be parsed or carry an unknown tracking id are
    /// logged and ignored.
    pub fn handle_result(&self, message: &Message) -> Option<(PathBuf, HashOutcome)> {
        let response = match HashResponse::from_message(message) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Ignoring malformed hash result: {}", e);
                return None;
            }
        };

        let Some(pending) = self.pending_table().remove(&response.tracking_id) else {
            tracing::warn!(
                "Ignoring hash result for unknown tracking id {}",
                response.tracking_id
            );
            return None;
        };
        let path = pending.path;

        match &response.outcome {
            HashOutcome::Fingerprint(fingerprint) => {
                self.sink.add(vec![HashRecord::new(path.clone(), *fingerprint)]);
                self.counters.hashed.fetch_add(1, Ordering::Relaxed);
            }
            HashOutcome::Failed { reason } => {
                tracing::warn!("Remote hashing failed for {:?}: {}", path, reason);
                self.sink.mark_bad(BadFileMarker::new(path.clone()));
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Some((path, response.outcome))
    }

    /// Handle results from `subscription` until `sending_done` is set and no
    /// request is outstanding, or the result address closes.
    ///
    /// Returns how many results were matched to a request.
    pub async fn collect_results(
        &self,
        subscription: &Subscription,
        mut sending_done: watch::Receiver<bool>,
    ) -> usize {
        let mut matched = 0usize;
        let mut done = *sending_done.borrow();

        loop {
            if done && self.pending() == 0 {
                break;
            }

            let next = if done {
                Next::Message(subscription.recv().await)
            } else {
                tokio::select! {
                    changed = sending_done.changed() => {
                        done = changed.is_err() || *sending_done.borrow();
                        Next::SendingDone
                    }
                    message = subscription.recv() => Next::Message(message),
                }
            };

            match next {
                Next::SendingDone => continue,
                Next::Message(Some(message)) => {
                    if self.handle_result(&message).is_some() {
                        matched += 1;
                    }
                }
                Next::Message(None) => {
                    if self.pending() > 0 {
                        tracing::warn!(
                            "Result address closed with {} requests unanswered",
                            self.pending()
                        );
                    }
                    break;
                }
            }
        }
        matched
    }
}
