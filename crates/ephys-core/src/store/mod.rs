//! Hierarchical container for source recordings and derived outputs.
//!
//! A store is a tree of named nodes. Groups hold children and attributes;
//! arrays hold typed samples, attributes and an optional extensible axis
//! that grows by [`Store::append`].
//!
//! Paths are `/`-separated and relative to the store root (a leading `/`
//! is accepted and ignored).
//!
//! - [`MemoryStore`]: in-memory tree
//! - [`DirStore`]: one directory per node on disk

mod data;
mod dir;
pub(crate) mod layout;
mod memory;

pub use data::{ArrayData, AttrValue, Dtype};
pub use dir::DirStore;
pub use memory::MemoryStore;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Shape and element type of an array node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInfo {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub extensible_axis: Option<usize>,
}

impl ArrayInfo {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Axis stored outermost: the extensible axis, or axis 0.
    pub fn outer_axis(&self) -> usize {
        self.extensible_axis.unwrap_or(0)
    }

    /// Length along the outer axis.
    pub fn rows(&self) -> usize {
        self.shape.get(self.outer_axis()).copied().unwrap_or(0)
    }

    /// Elements per outer-axis row.
    pub fn row_len(&self) -> usize {
        let axis = self.outer_axis();
        self.shape
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, n)| n)
            .product()
    }

    /// Logical shape with the outer axis resized to `rows`.
    pub fn with_rows(&self, rows: usize) -> Vec<usize> {
        let mut shape = self.shape.clone();
        if let Some(n) = shape.get_mut(self.outer_axis()) {
            *n = rows;
        }
        shape
    }
}

/// What a path points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Array(ArrayInfo),
}

/// Container operations used by sources, engines and destructive edits.
pub trait Store {
    /// Create a group, including missing parents.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Create an empty array that grows along `extensible_axis`.
    ///
    /// `shape[extensible_axis]` must be zero.
    fn create_array(
        &mut self,
        path: &str,
        shape: &[usize],
        dtype: Dtype,
        extensible_axis: usize,
    ) -> Result<()>;

    /// Create a fixed-size, zero-initialized array.
    fn create_dense(&mut self, path: &str, shape: &[usize], dtype: Dtype) -> Result<()>;

    /// Create a fixed-size array holding `data` in row-major order.
    fn put_array(&mut self, path: &str, shape: &[usize], data: &ArrayData) -> Result<()>;

    /// Append rows along the extensible axis.
    ///
    /// `data` is row-major with the shape of the array except for the
    /// extensible axis, whose length is inferred.
    fn append(&mut self, path: &str, data: &ArrayData) -> Result<()>;

    /// Overwrite rows `start..` along the extensible axis.
    fn write_rows(&mut self, path: &str, start: usize, data: &ArrayData) -> Result<()>;

    /// Write a contiguous run along the last axis of a fixed-size array,
    /// at index `prefix` on the leading axes.
    fn write_lane(
        &mut self,
        path: &str,
        prefix: &[usize],
        start: usize,
        data: &ArrayData,
    ) -> Result<()>;

    /// Read a whole array in row-major order.
    fn read(&self, path: &str) -> Result<ArrayData>;

    /// Read rows `start..end` along the outer axis, in row-major order.
    fn read_rows(&self, path: &str, start: usize, end: usize) -> Result<ArrayData>;

    /// Read samples `start..end` of `channels` from a `(channels, samples)`
    /// array extensible along samples.
    ///
    /// The result is channel-major in the order of `channels`; unselected
    /// channels are never materialised.
    fn read_channels(
        &self,
        path: &str,
        start: usize,
        end: usize,
        channels: &[usize],
    ) -> Result<ArrayData>;

    fn kind(&self, path: &str) -> Result<NodeKind>;

    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> Result<()>;

    fn get_attr(&self, path: &str, key: &str) -> Result<Option<AttrValue>>;

    fn attr_names(&self, path: &str) -> Result<Vec<String>>;

    /// Child names, sorted.
    fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Shrink the extensible axis to `len`, returning the previous length.
    fn truncate(&mut self, path: &str, len: usize) -> Result<usize>;

    /// Remove a node and everything below it.
    fn remove(&mut self, path: &str) -> Result<()>;

    /// Human-readable location of the store, used for provenance.
    fn location(&self) -> String;

    fn exists(&self, path: &str) -> bool {
        self.kind(path).is_ok()
    }

    fn info(&self, path: &str) -> Result<ArrayInfo> {
        match self.kind(path)? {
            NodeKind::Array(info) => Ok(info),
            NodeKind::Group => Err(Error::shape(path, "expected an array, found a group")),
        }
    }

    fn shape(&self, path: &str) -> Result<Vec<usize>> {
        Ok(self.info(path)?.shape)
    }

    fn dtype(&self, path: &str) -> Result<Dtype> {
        Ok(self.info(path)?.dtype)
    }

    fn require_attr(&self, path: &str, key: &str) -> Result<AttrValue> {
        self.get_attr(path, key)?
            .ok_or_else(|| Error::MissingAttribute {
                path: path.to_string(),
                key: key.to_string(),
            })
    }

    fn get_or_create_group(&mut self, path: &str) -> Result<()> {
        match self.kind(path) {
            Ok(NodeKind::Group) => Ok(()),
            Ok(NodeKind::Array(_)) => Err(Error::NodeExists(path.to_string())),
            Err(_) => self.create_group(path),
        }
    }
}

/// Split a path into its non-empty components.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Normalized form of a path: components joined by `/`, no leading slash.
pub fn normalize(path: &str) -> String {
    components(path).join("/")
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    let parent = normalize(parent);
    let child = normalize(child);
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child,
        (_, true) => parent,
        _ => format!("{parent}/{child}"),
    }
}

/// Final component of a path.
pub fn basename(path: &str) -> &str {
    components(path).last().copied().unwrap_or("")
}

/// Depth-first listing of every node below `root` (excluding `root`),
/// keeping nodes whose attributes contain all `(key, value)` pairs of
/// `matching`.
pub fn walk(
    store: &dyn Store,
    root: &str,
    matching: &[(&str, AttrValue)],
) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let mut stack = vec![normalize(root)];
    while let Some(path) = stack.pop() {
        let children = match store.kind(&path)? {
            NodeKind::Group => store.children(&path)?,
            NodeKind::Array(_) => Vec::new(),
        };
        for child in children.iter().rev() {
            stack.push(join(&path, child));
        }
        if path == normalize(root) {
            continue;
        }
        let mut keep = true;
        for (key, value) in matching {
            if store.get_attr(&path, key)?.as_ref() != Some(value) {
                keep = false;
                break;
            }
        }
        if keep {
            found.push(path);
        }
    }
    Ok(found)
}
