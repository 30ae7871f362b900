//! Remote hash consumer: one request in, one correlated result out.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::config::MessagingConfig;
use crate::pipeline::decode::ImageLoader;
use crate::pipeline::hash::{hash_bytes, Fingerprinter};

use super::message::Message;
use super::protocol::{HashRequest, HashResponse};
use super::transport::{MessageTransport, Subscription};

/// Hash a request's image. Never fails: a bad image becomes a failed
/// response carrying the same tracking id.
pub fn hash_request(
    loader: &ImageLoader,
    hasher: &dyn Fingerprinter,
    request: HashRequest,
) -> HashResponse {
    let tracking_id = request.tracking_id;
    let origin = PathBuf::from(format!("request-{tracking_id}"));
    match hash_bytes(loader, hasher, request.image, &origin) {
        Ok(fingerprint) => HashResponse::success(tracking_id, fingerprint),
        Err(e) => {
            tracing::warn!("Failed to hash image for tracking id {}: {}", tracking_id, e);
            HashResponse::failure(tracking_id, e.to_string())
        }
    }
}

/// Handles hash requests from a transport and publishes their results.
///
/// Holds no per-message state, so one consumer may handle many messages
/// concurrently.
pub struct HashRequestConsumer {
    transport: Arc<dyn MessageTransport>,
    result_address: String,
    loader: ImageLoader,
    hasher: Arc<dyn Fingerprinter>,
    concurrency: usize,
}

impl HashRequestConsumer {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        config: &MessagingConfig,
        loader: ImageLoader,
        hasher: Arc<dyn Fingerprinter>,
    ) -> Self {
        Self {
            transport,
            result_address: config.result_address.clone(),
            loader,
            hasher,
            concurrency: config.consumer_concurrency.max(1),
        }
    }

    /// Handle one request message to completion.
    ///
    /// Returns the published response, or `None` when the message had no
    /// usable tracking id and so could not be answered.
    pub async fn on_message(&self, message: Message) -> Option<HashResponse> {
        let request = match HashRequest::from_message(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("Dropping hash request without a tracking id: {}", e);
                return None;
            }
        };
        let tracking_id = request.tracking_id;

        let loader = self.loader.clone();
        let hasher = self.hasher.clone();
        let response =
            match tokio::task::spawn_blocking(move || hash_request(&loader, hasher.as_ref(), request))
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Hashing task for tracking id {} failed: {}", tracking_id, e);
                    HashResponse::failure(tracking_id, e.to_string())
                }
            };

        if let Err(e) = self
            .transport
            .publish(&self.result_address, response.to_message())
            .await
        {
            tracing::error!("Failed to publish result for tracking id {}: {}", tracking_id, e);
        }
        Some(response)
    }

    /// Drain `subscription` until it closes or `shutdown` flips to `true`,
    /// handling up to the configured number of messages at once.
    ///
    /// Messages already received when shutdown arrives are still answered.
    /// Returns how many messages were handled.
    pub async fn run(
        self: Arc<Self>,
        subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handled = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let message = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                message = subscription.recv() => message,
            };
            let Some(message) = message else {
                break;
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tracing::warn!("Consumer semaphore closed unexpectedly, stopping");
                break;
            };
            handled += 1;
            let consumer = self.clone();
            tokio::spawn(async move {
                consumer.on_message(message).await;
                drop(permit);
            });
        }

        // Wait for in-flight messages
        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if let Ok(permits) = semaphore.acquire_many(all).await {
            drop(permits);
        }
        tracing::debug!(
            "Consumer on '{}' stopped after {} messages",
            subscription.address(),
            handled
        );
        handled
    }
}
