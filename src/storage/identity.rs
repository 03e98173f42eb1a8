//! Identifier generation for new uploads

use rand::Rng;
use tracing::{debug, warn};

use super::OriginalStore;
use crate::errors::{StorageError, StorageResult};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Attempts made before giving up on finding a free identifier
pub const MAX_ATTEMPTS: usize = 64;

/// Produces fixed-length identifiers that are unique within a store
#[derive(Debug, Clone)]
pub struct IdGenerator {
    length: usize,
    max_attempts: usize,
}

impl IdGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// A random candidate, not yet checked against any store
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Generate and reserve an identifier, regenerating on collision
    pub async fn new_unique_id<S>(&self, store: &S) -> StorageResult<String>
    where
        S: OriginalStore + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generate();
            if store.reserve(&candidate).await? {
                debug!(id = %candidate, attempt, "Reserved identifier");
                return Ok(candidate);
            }
        }

        warn!(
            attempts = self.max_attempts,
            length = self.length,
            "Could not find a free identifier"
        );
        Err(StorageError::IdentifiersExhausted {
            attempts: self.max_attempts,
        })
    }
}
