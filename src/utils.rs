//! Utility functions for the bonding engine

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Generate a new unique row ID
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Lower-case and trim free text for comparisons
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Injectable source of randomness for jitter and filler selection
///
/// Production code builds one from entropy; tests seed it so that
/// jitter draws and template shuffles are reproducible.
#[derive(Debug)]
pub struct RandomSource {
    rng: Mutex<StdRng>,
}

impl RandomSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        // A panic mid-draw leaves the generator usable
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uniform draw from `[0, upper)`; zero when the range is empty
    pub fn below(&self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        self.rng().gen_range(0..upper)
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.rng());
    }

    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut *self.rng())
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}
