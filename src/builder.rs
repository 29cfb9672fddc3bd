//! Builder for configuring and constructing an `Analyzer`.

use crate::core::{ChunkConfig, DEFAULT_MEMORY_BUDGET};
use crate::analysis::ProcessingConfig;
use crate::{Analyzer, Result};

/// The memory budget bounds every chunk an engine holds at once; it is
/// fixed here and passed explicitly to each engine call.
///
/// Processing is opt-in: without `.processing()`, RMS and spike extraction
/// run on the raw channels.
///
/// # Example
///
/// ```
/// use ephys::prelude::*;
///
/// let analyzer = Analyzer::builder()
///     .memory_budget(8_000_000)
///     .processing(ProcessingConfig::default())
///     .build()?;
///
/// assert_eq!(analyzer.chunk_config().memory_budget_bytes, 8_000_000);
/// # Ok::<(), ephys::Error>(())
/// ```
pub struct AnalyzerBuilder {
    memory_budget: usize,
    processing: Option<ProcessingConfig>,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            processing: None,
        }
    }
}

impl AnalyzerBuilder {
    /// Default: 50 MB
    pub fn memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Reference and filter raw channels before RMS, extraction and noise
    /// estimation.
    pub fn processing(mut self, config: ProcessingConfig) -> Self {
        self.processing = Some(config);
        self
    }

    pub fn build(self) -> Result<Analyzer> {
        let chunk = ChunkConfig::new(self.memory_budget);
        chunk.validate()?;
        if let Some(config) = &self.processing {
            if config.filter_order == 0 {
                return Err(ephys_core::Error::config("filter_order must be at least 1").into());
            }
        }
        Ok(Analyzer::from_parts(chunk, self.processing))
    }
}
