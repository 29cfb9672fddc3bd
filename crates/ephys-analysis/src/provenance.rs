//! Provenance stamps for derived outputs and the auxiliary block-data copy.

use crate::Result;
use ephys_core::store::{join, NodeKind};
use ephys_core::{AttrValue, Recording, Store};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Node name of the copied block data under an output root.
pub const BLOCK_DATA: &str = "block_data";

/// Children skipped when copying block data; the raw waveform is never copied.
const SKIPPED: &[&str] = &["physiology"];

/// Record where the source recording lives on the output root.
pub fn stamp_source(sink: &mut dyn Store, root: &str, source: &dyn Recording) -> Result<()> {
    let info = source.source();
    sink.set_attr(root, "source_file", AttrValue::Str(info.file))?;
    sink.set_attr(root, "source_pathname", AttrValue::Str(info.path))?;
    Ok(())
}

/// Store the JSON form of a parameter bundle as the `parameters` attribute.
pub fn write_parameters<T: Serialize>(sink: &mut dyn Store, path: &str, params: &T) -> Result<()> {
    let json = serde_json::to_string(params)?;
    sink.set_attr(path, "parameters", AttrValue::Str(json))?;
    Ok(())
}

/// Fresh identifier and wall-clock time of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionStamp {
    pub id: Uuid,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl ExtractionStamp {
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            id: Uuid::new_v4(),
            timestamp,
        }
    }

    pub fn write(&self, sink: &mut dyn Store, root: &str) -> Result<()> {
        sink.set_attr(root, "extract_uuid", AttrValue::Str(self.id.to_string()))?;
        sink.set_attr(root, "last_extracted", AttrValue::Float(self.timestamp))?;
        Ok(())
    }
}

/// Auxiliary trial and event data that travels with a recording.
#[derive(Clone, Copy)]
pub struct BlockData<'a> {
    pub store: &'a dyn Store,
    /// Experiment node whose children are copied.
    pub path: &'a str,
}

/// Copy every child of `block.path` except the raw physiology into
/// `<root>/block_data`. Returns the number of nodes written.
pub fn copy_block_data(block: BlockData<'_>, sink: &mut dyn Store, root: &str) -> Result<usize> {
    let target = join(root, BLOCK_DATA);
    sink.get_or_create_group(&target)?;
    copy_attrs(block.store, block.path, sink, &target)?;
    let mut copied = 0;
    for child in block.store.children(block.path)? {
        if SKIPPED.contains(&child.as_str()) {
            continue;
        }
        copied += copy_node(
            block.store,
            &join(block.path, &child),
            sink,
            &join(&target, &child),
        )?;
    }
    debug!(from = block.path, to = %target, copied, "copied block data");
    Ok(copied)
}

fn copy_node(src: &dyn Store, from: &str, dst: &mut dyn Store, to: &str) -> Result<usize> {
    let mut copied = 1;
    match src.kind(from)? {
        NodeKind::Group => {
            dst.get_or_create_group(to)?;
            for child in src.children(from)? {
                if SKIPPED.contains(&child.as_str()) {
                    continue;
                }
                copied += copy_node(src, &join(from, &child), dst, &join(to, &child))?;
            }
        }
        NodeKind::Array(info) => {
            let data = src.read(from)?;
            match info.extensible_axis {
                Some(axis) => {
                    dst.create_array(to, &info.with_rows(0), info.dtype, axis)?;
                    if !data.is_empty() {
                        dst.append(to, &data)?;
                    }
                }
                None => dst.put_array(to, &info.shape, &data)?,
            }
        }
    }
    copy_attrs(src, from, dst, to)?;
    Ok(copied)
}

fn copy_attrs(src: &dyn Store, from: &str, dst: &mut dyn Store, to: &str) -> Result<()> {
    for key in src.attr_names(from)? {
        if let Some(value) = src.get_attr(from, &key)? {
            dst.set_attr(to, &key, value)?;
        }
    }
    Ok(())
}
