//! Chunking configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default memory budget for one chunk read, in bytes.
pub const DEFAULT_MEMORY_BUDGET: usize = 50_000_000;

/// Memory budget injected into every engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub memory_budget_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
        }
    }
}

impl ChunkConfig {
    pub fn new(memory_budget_bytes: usize) -> Self {
        Self {
            memory_budget_bytes,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_budget_bytes == 0 {
            return Err(Error::Configuration(
                "memory_budget_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
