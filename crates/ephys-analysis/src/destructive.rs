//! In-place edits of acquired waveforms.
//!
//! These functions rewrite raw data and cannot be undone. Every listed node
//! is checked before the first one is modified, so a missing node or `fs`
//! attribute leaves the experiment untouched.

use crate::Result;
use ephys_core::store::join;
use ephys_core::{ArrayData, Error as CoreError, Store};
use tracing::{info, warn};

/// Waveforms under `<experiment>/data` edited together.
pub const ACQUISITION_NODES: &[&str] = &[
    "physiology/raw",
    "contact/TO_TTL",
    "contact/poke_TTL",
    "contact/reaction_TTL",
    "contact/response_TTL",
    "contact/reward_TTL",
    "contact/signal_TTL",
    "contact/spout_TTL",
];

/// Attribute recording how many leading samples were zeroed.
pub const ZERO_SAMPLES: &str = "zero:samples";
/// Attribute recording the length before the first truncation.
pub const TRUNCATE_ORIGINAL_SIZE: &str = "truncate:original_size";

/// Each acquisition node with `duration_s` converted to its own samples.
fn resolve(store: &dyn Store, experiment: &str, duration_s: f64) -> Result<Vec<(String, usize)>> {
    let data = join(experiment, "data");
    ACQUISITION_NODES
        .iter()
        .map(|node| {
            let path = join(&data, node);
            let info = store.info(&path)?;
            if info.extensible_axis != Some(info.shape.len().saturating_sub(1)) {
                return Err(CoreError::ShapeMismatch {
                    path,
                    detail: "time must be the extensible last axis".to_string(),
                }
                .into());
            }
            let fs = store
                .require_attr(&path, "fs")?
                .as_f64()
                .ok_or_else(|| CoreError::MissingAttribute {
                    path: path.clone(),
                    key: "fs".to_string(),
                })?;
            let samples = (duration_s * fs).max(0.0) as usize;
            Ok((path, samples))
        })
        .collect()
}

/// Zero the first `duration_s` seconds of every acquisition node and record
/// the sample count as `zero:samples`.
pub fn zero_waveform(store: &mut dyn Store, experiment: &str, duration_s: f64) -> Result<()> {
    for (path, samples) in resolve(store, experiment, duration_s)? {
        let info = store.info(&path)?;
        let rows = samples.min(info.rows());
        if rows > 0 {
            let zeros = ArrayData::zeros(info.dtype, rows * info.row_len());
            store.write_rows(&path, 0, &zeros)?;
        }
        store.set_attr(&path, ZERO_SAMPLES, samples.into())?;
        info!(path = %path, samples, "zeroed waveform");
    }
    Ok(())
}

/// Truncate every acquisition node after `duration_s` seconds.
///
/// The length before the first truncation is kept in
/// `truncate:original_size`; later truncations leave it alone.
pub fn truncate_waveform(store: &mut dyn Store, experiment: &str, duration_s: f64) -> Result<()> {
    for (path, samples) in resolve(store, experiment, duration_s)? {
        let old = store.truncate(&path, samples)?;
        if old < samples {
            warn!(path = %path, old, samples, "waveform already shorter than requested");
        }
        if store.get_attr(&path, TRUNCATE_ORIGINAL_SIZE)?.is_none() {
            store.set_attr(&path, TRUNCATE_ORIGINAL_SIZE, old.into())?;
        }
        info!(path = %path, from = old, to = samples.min(old), "truncated waveform");
    }
    Ok(())
}
