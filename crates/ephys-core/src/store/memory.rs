//! In-memory store.

use super::layout::{
    self, check_channel_read, check_extensible, check_rows, lane_offset, rows_in, ChannelGather,
};
use super::{components, ArrayData, ArrayInfo, AttrValue, Dtype, NodeKind, Store};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
enum Node {
    Group {
        attrs: BTreeMap<String, AttrValue>,
        children: BTreeMap<String, Node>,
    },
    Array {
        info: ArrayInfo,
        /// Physical layout, outer axis first.
        data: ArrayData,
        attrs: BTreeMap<String, AttrValue>,
    },
}

impl Node {
    fn group() -> Self {
        Node::Group {
            attrs: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        match self {
            Node::Group { attrs, .. } | Node::Array { attrs, .. } => attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut BTreeMap<String, AttrValue> {
        match self {
            Node::Group { attrs, .. } | Node::Array { attrs, .. } => attrs,
        }
    }
}

/// Store holding every node in memory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    root: Node,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Node::group(),
        }
    }

    fn node(&self, path: &str) -> Result<&Node> {
        let mut node = &self.root;
        for part in components(path) {
            node = match node {
                Node::Group { children, .. } => children.get(part),
                Node::Array { .. } => None,
            }
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut Node> {
        let mut node = &mut self.root;
        for part in components(path) {
            node = match node {
                Node::Group { children, .. } => children.get_mut(part),
                Node::Array { .. } => None,
            }
            .ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Insert `node` at `path`, creating missing parent groups.
    fn insert(&mut self, path: &str, node: Node) -> Result<()> {
        let parts = components(path);
        let Some((name, parents)) = parts.split_last() else {
            return Err(Error::NodeExists(path.to_string()));
        };
        let mut current = &mut self.root;
        for part in parents {
            current = match current {
                Node::Group { children, .. } => {
                    children.entry(part.to_string()).or_insert_with(Node::group)
                }
                Node::Array { .. } => return Err(Error::NodeExists(path.to_string())),
            };
        }
        match current {
            Node::Group { children, .. } => {
                if children.contains_key(*name) {
                    return Err(Error::NodeExists(path.to_string()));
                }
                children.insert(name.to_string(), node);
                Ok(())
            }
            Node::Array { .. } => Err(Error::NodeExists(path.to_string())),
        }
    }

    fn array_mut(&mut self, path: &str) -> Result<(&mut ArrayInfo, &mut ArrayData)> {
        match self.node_mut(path)? {
            Node::Array { info, data, .. } => Ok((info, data)),
            Node::Group { .. } => Err(Error::shape(path, "expected an array, found a group")),
        }
    }

    fn array(&self, path: &str) -> Result<(&ArrayInfo, &ArrayData)> {
        match self.node(path)? {
            Node::Array { info, data, .. } => Ok((info, data)),
            Node::Group { .. } => Err(Error::shape(path, "expected an array, found a group")),
        }
    }
}

impl Store for MemoryStore {
    fn create_group(&mut self, path: &str) -> Result<()> {
        debug!(path, "create group");
        self.insert(path, Node::group())
    }

    fn create_array(
        &mut self,
        path: &str,
        shape: &[usize],
        dtype: Dtype,
        extensible_axis: usize,
    ) -> Result<()> {
        check_extensible(path, shape, extensible_axis)?;
        debug!(path, ?shape, %dtype, extensible_axis, "create array");
        self.insert(
            path,
            Node::Array {
                info: ArrayInfo {
                    dtype,
                    shape: shape.to_vec(),
                    extensible_axis: Some(extensible_axis),
                },
                data: ArrayData::zeros(dtype, 0),
                attrs: BTreeMap::new(),
            },
        )
    }

    fn create_dense(&mut self, path: &str, shape: &[usize], dtype: Dtype) -> Result<()> {
        debug!(path, ?shape, %dtype, "create dense array");
        let len = shape.iter().product();
        self.insert(
            path,
            Node::Array {
                info: ArrayInfo {
                    dtype,
                    shape: shape.to_vec(),
                    extensible_axis: None,
                },
                data: ArrayData::zeros(dtype, len),
                attrs: BTreeMap::new(),
            },
        )
    }

    fn put_array(&mut self, path: &str, shape: &[usize], data: &ArrayData) -> Result<()> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(Error::shape(
                path,
                format!("{} elements for shape {:?}", data.len(), shape),
            ));
        }
        self.insert(
            path,
            Node::Array {
                info: ArrayInfo {
                    dtype: data.dtype(),
                    shape: shape.to_vec(),
                    extensible_axis: None,
                },
                data: data.clone(),
                attrs: BTreeMap::new(),
            },
        )
    }

    fn append(&mut self, path: &str, rows: &ArrayData) -> Result<()> {
        let (info, data) = self.array_mut(path)?;
        let Some(axis) = info.extensible_axis else {
            return Err(Error::shape(path, "append to a fixed-size array"));
        };
        let n = rows_in(info, rows.len(), path)?;
        let physical = layout::to_physical(rows, &info.with_rows(n), axis);
        data.extend_from(&physical, path)?;
        info.shape[axis] += n;
        Ok(())
    }

    fn write_rows(&mut self, path: &str, start: usize, rows: &ArrayData) -> Result<()> {
        let (info, data) = self.array_mut(path)?;
        let n = rows_in(info, rows.len(), path)?;
        check_rows(info, start, start + n, path)?;
        let physical = layout::to_physical(rows, &info.with_rows(n), info.outer_axis());
        data.write_at(start * info.row_len(), &physical, path)
    }

    fn write_lane(
        &mut self,
        path: &str,
        prefix: &[usize],
        start: usize,
        lane: &ArrayData,
    ) -> Result<()> {
        let (info, data) = self.array_mut(path)?;
        let offset = lane_offset(info, prefix, start, lane.len(), path)?;
        data.write_at(offset, lane, path)
    }

    fn read(&self, path: &str) -> Result<ArrayData> {
        let (info, data) = self.array(path)?;
        Ok(layout::to_logical(data, &info.shape, info.outer_axis()))
    }

    fn read_rows(&self, path: &str, start: usize, end: usize) -> Result<ArrayData> {
        let (info, data) = self.array(path)?;
        check_rows(info, start, end, path)?;
        let row_len = info.row_len();
        let rows = data.slice(start * row_len..end * row_len);
        Ok(layout::to_logical(
            &rows,
            &info.with_rows(end - start),
            info.outer_axis(),
        ))
    }

    fn read_channels(
        &self,
        path: &str,
        start: usize,
        end: usize,
        channels: &[usize],
    ) -> Result<ArrayData> {
        let (info, data) = self.array(path)?;
        check_channel_read(info, &(start..end), channels, path)?;
        let gather = ChannelGather {
            channels,
            row_len: info.row_len(),
            n: end - start,
        };
        let mut out = ArrayData::zeros(info.dtype, channels.len() * gather.n);
        gather.scatter(&mut out, data, start..end, 0, path)?;
        Ok(out)
    }

    fn kind(&self, path: &str) -> Result<NodeKind> {
        Ok(match self.node(path)? {
            Node::Group { .. } => NodeKind::Group,
            Node::Array { info, .. } => NodeKind::Array(info.clone()),
        })
    }

    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> Result<()> {
        self.node_mut(path)?
            .attrs_mut()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get_attr(&self, path: &str, key: &str) -> Result<Option<AttrValue>> {
        Ok(self.node(path)?.attrs().get(key).cloned())
    }

    fn attr_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.node(path)?.attrs().keys().cloned().collect())
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        Ok(match self.node(path)? {
            Node::Group { children, .. } => children.keys().cloned().collect(),
            Node::Array { .. } => Vec::new(),
        })
    }

    fn truncate(&mut self, path: &str, len: usize) -> Result<usize> {
        let (info, data) = self.array_mut(path)?;
        let Some(axis) = info.extensible_axis else {
            return Err(Error::shape(path, "truncate of a fixed-size array"));
        };
        let old = info.shape[axis];
        if len < old {
            data.truncate(len * info.row_len());
            info.shape[axis] = len;
        }
        Ok(old)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let parts = components(path);
        let Some((name, parents)) = parts.split_last() else {
            self.root = Node::group();
            return Ok(());
        };
        let parent = self.node_mut(&parents.join("/"))?;
        match parent {
            Node::Group { children, .. } => children
                .remove(*name)
                .map(|_| ())
                .ok_or_else(|| Error::NodeNotFound(path.to_string())),
            Node::Array { .. } => Err(Error::NodeNotFound(path.to_string())),
        }
    }

    fn location(&self) -> String {
        self.name.clone()
    }
}
