//! Cache entry states

use bytes::Bytes;
use std::time::Instant;
use tokio::sync::watch;

/// Rendered response body stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

impl Payload {
    pub fn new(bytes: Bytes, content_type: &'static str) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// State of one cache key.
///
/// A key is `Pending` from the moment a miss installs it until its filler
/// either completes or abandons the fill. Pending entries carry no payload,
/// so there is nothing a reader could mistake for a finished render.
#[derive(Debug)]
pub(crate) enum Slot {
    Pending {
        fill_id: u64,
        done: watch::Receiver<()>,
    },
    Ready {
        payload: Payload,
        created_at: Instant,
    },
}

impl Slot {
    pub(crate) fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending { .. })
    }
}
