//! Analyzer that runs the analysis engines with one chunk budget and
//! processing bundle.

use crate::analysis::{
    self, BlockData, DecimateParams, ExtractParams, ProcessedRecording, ProcessingConfig,
    RmsParams, SpectrogramParams,
};
use crate::core::{ChunkConfig, Completion, Progress, Recording, Store};
use crate::Result;
use tracing::debug;

/// Entry point for the analysis engines.
///
/// The chunk budget and optional [`ProcessingConfig`] are injected once at
/// build time and threaded explicitly into each engine call:
/// - `running_rms`, `extract_spikes` and `estimate_noise` see the processed
///   (referenced and filtered) channels when processing is configured
/// - `decimate` and `spectrogram` always read the source as given
///
/// # Example
///
/// ```
/// use ephys::prelude::*;
///
/// let rec = MemoryRecording::from_channels(&[vec![5.0; 6000]], 6000.0)?;
/// let mut sink = MemoryStore::new("lfp.store");
///
/// let analyzer = Analyzer::builder().build()?;
/// let params = DecimateParams::default();
/// let done = analyzer.decimate(&rec, &mut sink, "", &params, None, &mut NoProgress)?;
///
/// assert_eq!(done.status, CompletionStatus::Done);
/// assert_eq!(sink.shape("lfp")?, vec![1, 600]);
/// # Ok::<(), ephys::Error>(())
/// ```
pub struct Analyzer {
    chunk: ChunkConfig,
    processing: Option<ProcessingConfig>,
}

impl Analyzer {
    /// Create a new analyzer builder
    pub fn builder() -> crate::AnalyzerBuilder {
        crate::AnalyzerBuilder::default()
    }

    pub(crate) fn from_parts(chunk: ChunkConfig, processing: Option<ProcessingConfig>) -> Self {
        Self { chunk, processing }
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        &self.chunk
    }

    pub fn processing(&self) -> Option<&ProcessingConfig> {
        self.processing.as_ref()
    }

    /// Wrap `source` in the configured processing, if any.
    fn processed<'a>(&self, source: &'a dyn Recording) -> Result<Option<ProcessedRecording<'a>>> {
        match &self.processing {
            Some(config) => {
                debug!(?config, "processing source");
                Ok(Some(ProcessedRecording::new(source, config.clone())?))
            }
            None => Ok(None),
        }
    }

    /// Running RMS into `<output>/rms`.
    pub fn running_rms(
        &self,
        source: &dyn Recording,
        sink: &mut dyn Store,
        output: &str,
        params: &RmsParams,
        progress: &mut dyn Progress,
    ) -> Result<Completion> {
        let processed = self.processed(source)?;
        let source = processed.as_ref().map_or(source, |p| p as &dyn Recording);
        Ok(analysis::running_rms(
            source,
            sink,
            output,
            params,
            &self.chunk,
            progress,
        )?)
    }

    /// Zero-phase decimation into `<output>/lfp`.
    pub fn decimate(
        &self,
        source: &dyn Recording,
        sink: &mut dyn Store,
        output: &str,
        params: &DecimateParams,
        block_data: Option<BlockData<'_>>,
        progress: &mut dyn Progress,
    ) -> Result<Completion> {
        Ok(analysis::decimate(
            source,
            sink,
            output,
            params,
            &self.chunk,
            block_data,
            progress,
        )?)
    }

    /// Spike extraction into `<output>/event_data`, with the processing
    /// provenance in `<output>/filter`.
    pub fn extract_spikes(
        &self,
        source: &dyn Recording,
        sink: &mut dyn Store,
        output: &str,
        params: &ExtractParams,
        block_data: Option<BlockData<'_>>,
        progress: &mut dyn Progress,
    ) -> Result<Completion> {
        let processed = self.processed(source)?;
        let source = processed.as_ref().map_or(source, |p| p as &dyn Recording);
        Ok(analysis::extract_spikes(
            source,
            sink,
            output,
            params,
            &self.chunk,
            block_data,
            progress,
        )?)
    }

    /// Morlet spectrogram of a decimated recording into
    /// `<output>/spectrogram`.
    pub fn spectrogram(
        &self,
        source: &dyn Recording,
        sink: &mut dyn Store,
        output: &str,
        params: &SpectrogramParams,
        block_data: Option<BlockData<'_>>,
        progress: &mut dyn Progress,
    ) -> Result<Completion> {
        Ok(analysis::spectrogram(
            source,
            sink,
            output,
            params,
            &self.chunk,
            block_data,
            progress,
        )?)
    }

    /// Per-channel noise standard deviation over the first `duration_s`
    /// seconds.
    pub fn estimate_noise(
        &self,
        source: &dyn Recording,
        channels: Option<&[usize]>,
        duration_s: f64,
    ) -> Result<Vec<f64>> {
        let processed = self.processed(source)?;
        let source = processed.as_ref().map_or(source, |p| p as &dyn Recording);
        Ok(analysis::estimate_noise(source, channels, duration_s)?)
    }
}
