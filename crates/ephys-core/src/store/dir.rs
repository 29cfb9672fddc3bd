//! Directory-backed store.
//!
//! Every node is a directory holding `node.json` (kind, array layout and
//! attributes). Arrays also hold `data.bin`, little-endian samples with the
//! outer axis first, so appends along the extensible axis are file appends.

use super::layout::{
    self, check_channel_read, check_extensible, check_rows, lane_offset, rows_in, ChannelGather,
};
use super::{components, ArrayData, ArrayInfo, AttrValue, Dtype, NodeKind, Store};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const HEADER_FILE: &str = "node.json";
const DATA_FILE: &str = "data.bin";
/// Staging buffer for channel-selective reads.
const SLAB_BYTES: usize = 1 << 16;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array: Option<ArrayInfo>,
    #[serde(default)]
    attrs: BTreeMap<String, AttrValue>,
}

/// Store rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Create a new store; the directory must not hold one already.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.join(HEADER_FILE).exists() {
            return Err(Error::NodeExists(root.display().to_string()));
        }
        fs::create_dir_all(&root).map_err(|e| Error::write(&root.display().to_string(), e))?;
        let store = Self { root };
        store.write_header("", &Header::default())?;
        debug!(root = %store.root.display(), "created store");
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(HEADER_FILE).is_file() {
            return Err(Error::NodeNotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, path: &str) -> PathBuf {
        let mut dir = self.root.clone();
        for part in components(path) {
            dir.push(part);
        }
        dir
    }

    fn read_header(&self, path: &str) -> Result<Header> {
        let file = self.dir(path).join(HEADER_FILE);
        if !file.is_file() {
            return Err(Error::NodeNotFound(path.to_string()));
        }
        let text = fs::read_to_string(file)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_header(&self, path: &str, header: &Header) -> Result<()> {
        let text = serde_json::to_vec_pretty(header)?;
        fs::write(self.dir(path).join(HEADER_FILE), text).map_err(|e| Error::write(path, e))
    }

    fn array_header(&self, path: &str) -> Result<(Header, ArrayInfo)> {
        let header = self.read_header(path)?;
        match header.array.clone() {
            Some(info) => Ok((header, info)),
            None => Err(Error::shape(path, "expected an array, found a group")),
        }
    }

    /// Create the directory and header of a new node, with parent groups.
    fn new_node(&self, path: &str, header: &Header) -> Result<()> {
        let parts = components(path);
        if parts.is_empty() || self.read_header(path).is_ok() {
            return Err(Error::NodeExists(path.to_string()));
        }
        for depth in 1..parts.len() {
            let parent = parts[..depth].join("/");
            match self.read_header(&parent) {
                Ok(h) if h.array.is_some() => return Err(Error::NodeExists(path.to_string())),
                Ok(_) => {}
                Err(_) => {
                    fs::create_dir_all(self.dir(&parent)).map_err(|e| Error::write(&parent, e))?;
                    self.write_header(&parent, &Header::default())?;
                }
            }
        }
        fs::create_dir_all(self.dir(path)).map_err(|e| Error::write(path, e))?;
        self.write_header(path, header)
    }

    fn data_file(&self, path: &str) -> PathBuf {
        self.dir(path).join(DATA_FILE)
    }

    fn open_data(&self, path: &str) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .open(self.data_file(path))
            .map_err(|e| Error::write(path, e))
    }

    fn write_at(&self, path: &str, element: usize, data: &ArrayData) -> Result<()> {
        let mut file = self.open_data(path)?;
        let offset = (element * data.dtype().item_size()) as u64;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(&data.to_le_bytes()))
            .map_err(|e| Error::write(path, e))
    }

    fn check_dtype(path: &str, info: &ArrayInfo, data: &ArrayData) -> Result<()> {
        if info.dtype != data.dtype() {
            return Err(Error::DtypeMismatch {
                path: path.to_string(),
                expected: info.dtype,
                found: data.dtype(),
            });
        }
        Ok(())
    }
}

impl Store for DirStore {
    fn create_group(&mut self, path: &str) -> Result<()> {
        debug!(path, "create group");
        self.new_node(path, &Header::default())
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
        let header = Header {
            array: Some(ArrayInfo {
                dtype,
                shape: shape.to_vec(),
                extensible_axis: Some(extensible_axis),
            }),
            attrs: BTreeMap::new(),
        };
        self.new_node(path, &header)?;
        File::create(self.data_file(path)).map_err(|e| Error::write(path, e))?;
        Ok(())
    }

    fn create_dense(&mut self, path: &str, shape: &[usize], dtype: Dtype) -> Result<()> {
        debug!(path, ?shape, %dtype, "create dense array");
        let header = Header {
            array: Some(ArrayInfo {
                dtype,
                shape: shape.to_vec(),
                extensible_axis: None,
            }),
            attrs: BTreeMap::new(),
        };
        self.new_node(path, &header)?;
        let bytes = shape.iter().product::<usize>() * dtype.item_size();
        File::create(self.data_file(path))
            .and_then(|f| f.set_len(bytes as u64))
            .map_err(|e| Error::write(path, e))
    }

    fn put_array(&mut self, path: &str, shape: &[usize], data: &ArrayData) -> Result<()> {
        if shape.iter().product::<usize>() != data.len() {
            return Err(Error::shape(
                path,
                format!("{} elements for shape {:?}", data.len(), shape),
            ));
        }
        let header = Header {
            array: Some(ArrayInfo {
                dtype: data.dtype(),
                shape: shape.to_vec(),
                extensible_axis: None,
            }),
            attrs: BTreeMap::new(),
        };
        self.new_node(path, &header)?;
        fs::write(self.data_file(path), data.to_le_bytes()).map_err(|e| Error::write(path, e))
    }

    fn append(&mut self, path: &str, rows: &ArrayData) -> Result<()> {
        let (mut header, mut info) = self.array_header(path)?;
        let Some(axis) = info.extensible_axis else {
            return Err(Error::shape(path, "append to a fixed-size array"));
        };
        Self::check_dtype(path, &info, rows)?;
        let n = rows_in(&info, rows.len(), path)?;
        let physical = layout::to_physical(rows, &info.with_rows(n), axis);
        OpenOptions::new()
            .append(true)
            .open(self.data_file(path))
            .and_then(|mut f| f.write_all(&physical.to_le_bytes()))
            .map_err(|e| Error::write(path, e))?;
        info.shape[axis] += n;
        header.array = Some(info);
        self.write_header(path, &header)
    }

    fn write_rows(&mut self, path: &str, start: usize, rows: &ArrayData) -> Result<()> {
        let (_, info) = self.array_header(path)?;
        Self::check_dtype(path, &info, rows)?;
        let n = rows_in(&info, rows.len(), path)?;
        check_rows(&info, start, start + n, path)?;
        let physical = layout::to_physical(rows, &info.with_rows(n), info.outer_axis());
        self.write_at(path, start * info.row_len(), &physical)
    }

    fn write_lane(
        &mut self,
        path: &str,
        prefix: &[usize],
        start: usize,
        lane: &ArrayData,
    ) -> Result<()> {
        let (_, info) = self.array_header(path)?;
        Self::check_dtype(path, &info, lane)?;
        let offset = lane_offset(&info, prefix, start, lane.len(), path)?;
        self.write_at(path, offset, lane)
    }

    fn read(&self, path: &str) -> Result<ArrayData> {
        let (_, info) = self.array_header(path)?;
        let bytes = fs::read(self.data_file(path))?;
        let data = ArrayData::from_le_bytes(info.dtype, &bytes);
        if data.len() != info.len() {
            return Err(Error::shape(
                path,
                format!("{} stored elements for shape {:?}", data.len(), info.shape),
            ));
        }
        Ok(layout::to_logical(&data, &info.shape, info.outer_axis()))
    }

    fn read_rows(&self, path: &str, start: usize, end: usize) -> Result<ArrayData> {
        let (_, info) = self.array_header(path)?;
        check_rows(&info, start, end, path)?;
        let item = info.dtype.item_size();
        let row_bytes = info.row_len() * item;
        let mut bytes = vec![0u8; (end - start) * row_bytes];
        let mut file = File::open(self.data_file(path))?;
        file.seek(SeekFrom::Start((start * row_bytes) as u64))?;
        file.read_exact(&mut bytes)?;
        let rows = ArrayData::from_le_bytes(info.dtype, &bytes);
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
        let (_, info) = self.array_header(path)?;
        check_channel_read(&info, &(start..end), channels, path)?;
        let gather = ChannelGather {
            channels,
            row_len: info.row_len(),
            n: end - start,
        };
        let mut out = ArrayData::zeros(info.dtype, channels.len() * gather.n);
        let row_bytes = gather.row_len * info.dtype.item_size();
        if gather.n == 0 || row_bytes == 0 {
            return Ok(out);
        }

        // Stream the rows through a fixed slab so only the selected
        // channels are held in full
        let slab_rows = (SLAB_BYTES / row_bytes).max(1);
        let mut bytes = vec![0u8; slab_rows * row_bytes];
        let mut file = File::open(self.data_file(path))?;
        file.seek(SeekFrom::Start((start * row_bytes) as u64))?;
        let mut at = 0;
        while at < gather.n {
            let rows = slab_rows.min(gather.n - at);
            let buf = &mut bytes[..rows * row_bytes];
            file.read_exact(buf)?;
            let slab = ArrayData::from_le_bytes(info.dtype, buf);
            gather.scatter(&mut out, &slab, 0..rows, at, path)?;
            at += rows;
        }
        Ok(out)
    }

    fn kind(&self, path: &str) -> Result<NodeKind> {
        Ok(match self.read_header(path)?.array {
            Some(info) => NodeKind::Array(info),
            None => NodeKind::Group,
        })
    }

    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> Result<()> {
        let mut header = self.read_header(path)?;
        header.attrs.insert(key.to_string(), value);
        self.write_header(path, &header)
    }

    fn get_attr(&self, path: &str, key: &str) -> Result<Option<AttrValue>> {
        Ok(self.read_header(path)?.attrs.remove(key))
    }

    fn attr_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.read_header(path)?.attrs.into_keys().collect())
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        if self.read_header(path)?.array.is_some() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(self.dir(path))? {
            let entry = entry?;
            if entry.path().join(HEADER_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn truncate(&mut self, path: &str, len: usize) -> Result<usize> {
        let (mut header, mut info) = self.array_header(path)?;
        let Some(axis) = info.extensible_axis else {
            return Err(Error::shape(path, "truncate of a fixed-size array"));
        };
        let old = info.shape[axis];
        if len < old {
            let bytes = len * info.row_len() * info.dtype.item_size();
            self.open_data(path)?
                .set_len(bytes as u64)
                .map_err(|e| Error::write(path, e))?;
            info.shape[axis] = len;
            header.array = Some(info);
            self.write_header(path, &header)?;
        }
        Ok(old)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        if components(path).is_empty() {
            for child in self.children("")? {
                fs::remove_dir_all(self.dir(&child)).map_err(|e| Error::write(&child, e))?;
            }
            return Ok(());
        }
        self.read_header(path)?;
        fs::remove_dir_all(self.dir(path)).map_err(|e| Error::write(path, e))
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
