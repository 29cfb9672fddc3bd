//! Conversion between logical row-major layout and the physical layout,
//! which stores the outer (extensible) axis first.
//!
//! With the logical shape viewed as `(outer, axis, inner)`, the physical
//! layout is `(axis, outer, inner)`, so both directions are a transpose of
//! the first two dimensions.

use super::data::{map_variant, mismatch, zip_variant};
use super::{ArrayData, ArrayInfo};
use crate::{Error, Result};
use std::ops::Range;

/// Split `shape` around `axis` into `(outer, axis_len, inner)` products.
pub(crate) fn split(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

fn transpose<T: Copy>(data: &[T], rows: usize, cols: usize, inner: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for c in 0..cols {
        for r in 0..rows {
            let at = (r * cols + c) * inner;
            out.extend_from_slice(&data[at..at + inner]);
        }
    }
    out
}

/// Logical `shape` (row-major) to physical order with `axis` outermost.
pub(crate) fn to_physical(data: &ArrayData, shape: &[usize], axis: usize) -> ArrayData {
    let (outer, n, inner) = split(shape, axis);
    if outer == 1 {
        return data.clone();
    }
    map_variant!(data, v => transpose(v, outer, n, inner))
}

/// Physical order back to logical row-major for `shape`.
pub(crate) fn to_logical(data: &ArrayData, shape: &[usize], axis: usize) -> ArrayData {
    let (outer, n, inner) = split(shape, axis);
    if outer == 1 {
        return data.clone();
    }
    map_variant!(data, v => transpose(v, n, outer, inner))
}

/// Reject a new extensible array whose growth axis is out of range or
/// already populated.
pub(crate) fn check_extensible(path: &str, shape: &[usize], axis: usize) -> Result<()> {
    if axis >= shape.len() {
        return Err(Error::shape(
            path,
            format!("extensible axis {axis} out of range for {} dims", shape.len()),
        ));
    }
    if shape[axis] != 0 {
        return Err(Error::shape(
            path,
            format!("extensible axis {axis} must start empty, got {}", shape[axis]),
        ));
    }
    Ok(())
}

/// Number of outer-axis rows carried by `len` elements.
pub(crate) fn rows_in(info: &ArrayInfo, len: usize, path: &str) -> Result<usize> {
    let row_len = info.row_len();
    if row_len == 0 {
        return if len == 0 {
            Ok(0)
        } else {
            Err(Error::shape(path, "array rows have zero length"))
        };
    }
    if len % row_len != 0 {
        return Err(Error::shape(
            path,
            format!("{len} elements is not a whole number of rows of {row_len}"),
        ));
    }
    Ok(len / row_len)
}

/// Check that `start..end` is a valid row range.
pub(crate) fn check_rows(info: &ArrayInfo, start: usize, end: usize, path: &str) -> Result<()> {
    if start > end || end > info.rows() {
        return Err(Error::shape(
            path,
            format!("rows {start}..{end} out of range for {} rows", info.rows()),
        ));
    }
    Ok(())
}

/// Check a channel-selective read of a `(channels, samples)` array
/// stored sample-major.
pub(crate) fn check_channel_read(
    info: &ArrayInfo,
    rows: &Range<usize>,
    channels: &[usize],
    path: &str,
) -> Result<()> {
    if info.shape.len() != 2 || info.outer_axis() != 1 {
        return Err(Error::shape(
            path,
            "channel reads need a (channels, samples) array extensible along samples",
        ));
    }
    check_rows(info, rows.start, rows.end, path)?;
    if let Some(&c) = channels.iter().find(|&&c| c >= info.shape[0]) {
        return Err(Error::shape(
            path,
            format!("channel {c} out of range for {} channels", info.shape[0]),
        ));
    }
    Ok(())
}

/// Channel-major destination for samples picked out of sample-major rows.
pub(crate) struct ChannelGather<'a> {
    pub channels: &'a [usize],
    /// Elements per stored row (all channels).
    pub row_len: usize,
    /// Samples per output channel.
    pub n: usize,
}

impl ChannelGather<'_> {
    /// Copy rows `src_rows` of `src` into `out`, starting at output
    /// sample `at`.
    pub(crate) fn scatter(
        &self,
        out: &mut ArrayData,
        src: &ArrayData,
        src_rows: Range<usize>,
        at: usize,
        path: &str,
    ) -> Result<()> {
        let (expected, found) = (out.dtype(), src.dtype());
        zip_variant!(out, src, o, r => {
            for (k, &c) in self.channels.iter().enumerate() {
                let lane = &mut o[k * self.n + at..];
                for (dst, s) in lane.iter_mut().zip(src_rows.clone()) {
                    *dst = r[s * self.row_len + c];
                }
            }
        })
        .ok_or_else(|| mismatch(path, expected, found))
    }
}

/// Element offset of a lane write into a fixed-size array.
pub(crate) fn lane_offset(
    info: &ArrayInfo,
    prefix: &[usize],
    start: usize,
    len: usize,
    path: &str,
) -> Result<usize> {
    if info.outer_axis() != 0 {
        return Err(Error::shape(path, "lane writes need row-major storage"));
    }
    let ndim = info.shape.len();
    if ndim == 0 || prefix.len() != ndim - 1 {
        return Err(Error::shape(
            path,
            format!("lane prefix of {} indices for {ndim} dims", prefix.len()),
        ));
    }
    let mut offset = 0;
    for (axis, &index) in prefix.iter().enumerate() {
        if index >= info.shape[axis] {
            return Err(Error::shape(
                path,
                format!("index {index} out of range on axis {axis}"),
            ));
        }
        offset = offset * info.shape[axis] + index;
    }
    let lane = info.shape[ndim - 1];
    if start + len > lane {
        return Err(Error::shape(
            path,
            format!("lane write {start}..{} exceeds length {lane}", start + len),
        ));
    }
    Ok(offset * lane + start)
}
