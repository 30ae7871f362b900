//! Hash request/result correlation protocol.
//!
//! A request carries raw image bytes in its body and a caller-chosen
//! tracking id property. The matching result carries the same tracking id
//! and either a fingerprint or a failure flag. Results are matched to
//! requests by tracking id alone; delivery order means nothing.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::MessagingError;

use super::message::Message;

/// Property holding the correlation key on both requests and results.
pub const TRACKING_PROPERTY: &str = "trackingId";

/// Property holding the fingerprint on a successful result.
pub const HASH_PROPERTY: &str = "hashResult";

/// Property set to `true` on a result whose image could not be hashed.
pub const FAILURE_PROPERTY: &str = "hashFailed";

/// Optional human-readable failure description on a failed result.
pub const FAILURE_REASON_PROPERTY: &str = "failureReason";

/// Caller-chosen correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingId(pub i32);

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TrackingId {
    /// Read the tracking id property of any protocol message.
    pub fn from_message(message: &Message) -> Result<Self, MessagingError> {
        message.get_int(TRACKING_PROPERTY).map(TrackingId)
    }
}

/// Hands out tracking ids unique among a producer's outstanding requests.
///
/// Ids increase from 1 and wrap around after `i32::MAX`.
#[derive(Debug)]
pub struct TrackingIdAllocator {
    next: AtomicI32,
}

impl Default for TrackingIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(1),
        }
    }
}

impl TrackingIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(first: i32) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }

    pub fn next_id(&self) -> TrackingId {
        TrackingId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Request to hash one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRequest {
    pub tracking_id: TrackingId,
    pub image: Vec<u8>,
}

impl HashRequest {
    pub fn new(tracking_id: TrackingId, image: Vec<u8>) -> Self {
        Self { tracking_id, image }
    }

    pub fn to_message(&self) -> Message {
        self.clone().into_message()
    }

    pub fn into_message(self) -> Message {
        let mut message = Message::with_body(self.image);
        message.put_int(TRACKING_PROPERTY, self.tracking_id.0);
        message
    }

    /// Parse a request. Fails only when the tracking id is missing or
    /// mistyped; an empty body is still a request (for an undecodable image).
    pub fn from_message(message: Message) -> Result<Self, MessagingError> {
        let tracking_id = TrackingId::from_message(&message)?;
        Ok(Self {
            tracking_id,
            image: message.into_body(),
        })
    }
}

/// What became of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    Fingerprint(u64),
    Failed { reason: String },
}

/// Result for one request, correlated by tracking id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResponse {
    pub tracking_id: TrackingId,
    pub outcome: HashOutcome,
}

impl HashResponse {
    pub fn success(tracking_id: TrackingId, fingerprint: u64) -> Self {
        Self {
            tracking_id,
            outcome: HashOutcome::Fingerprint(fingerprint),
        }
    }

    pub fn failure(tracking_id: TrackingId, reason: impl Into<String>) -> Self {
        Self {
            tracking_id,
            outcome: HashOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, HashOutcome::Failed { .. })
    }

    /// Encode as a message. The fingerprint travels as a signed long with
    /// the same bit pattern.
    pub fn to_message(&self) -> Message {
        let mut message = Message::new();
        message.put_int(TRACKING_PROPERTY, self.tracking_id.0);
        match &self.outcome {
            HashOutcome::Fingerprint(fingerprint) => {
                message
                    .put_long(HASH_PROPERTY, *fingerprint as i64)
                    .put_bool(FAILURE_PROPERTY, false);
            }
            HashOutcome::Failed { reason } => {
                message
                    .put_bool(FAILURE_PROPERTY, true)
                    .put_string(FAILURE_REASON_PROPERTY, reason.clone());
            }
        }
        message
    }

    pub fn from_message(message: &Message) -> Result<Self, MessagingError> {
        let tracking_id = TrackingId::from_message(message)?;
        let failed = message.has_property(FAILURE_PROPERTY) && message.get_bool(FAILURE_PROPERTY)?;
        if failed {
            let reason = message
                .get_string(FAILURE_REASON_PROPERTY)
                .unwrap_or("unknown")
                .to_string();
            return Ok(Self::failure(tracking_id, reason));
        }

        let fingerprint = message.get_long(HASH_PROPERTY)? as u64;
        Ok(Self::success(tracking_id, fingerprint))
    }
}
