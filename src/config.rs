//! World configuration
//!
//! Loaded once at startup; every field has a default so partial JSON works.

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};
use crate::event_bus::DEFAULT_ARENA_BYTES;
use crate::handle::DEFAULT_CHUNK_SIZE;

/// Largest accepted handle-table chunk (slots).
pub const MAX_CHUNK_SIZE: usize = 1 << 20;

/// Sizing knobs for a [`World`](crate::world::World).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Slots per handle-table chunk. Must be a power of two.
    pub handle_chunk_size: usize,
    /// Initial size of the event arena in bytes.
    pub event_arena_bytes: usize,
    /// Initial capacity of each component store.
    pub initial_store_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            handle_chunk_size: DEFAULT_CHUNK_SIZE,
            event_arena_bytes: DEFAULT_ARENA_BYTES,
            initial_store_capacity: 64,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let chunk = self.handle_chunk_size;
        if chunk == 0 || !chunk.is_power_of_two() {
            return Err(EcsError::ConfigError(format!(
                "handle_chunk_size must be a non-zero power of two, got {chunk}"
            )));
        }
        if chunk > MAX_CHUNK_SIZE {
            return Err(EcsError::ConfigError(format!(
                "handle_chunk_size {chunk} exceeds {MAX_CHUNK_SIZE}"
            )));
        }
        Ok(())
    }
}
