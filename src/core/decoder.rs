//! TDMS capture file decoding.
//!
//! Reads standard TDMS 2.0 segments (lead-in, little-endian metadata, raw
//! channel data) and accumulates numeric channel samples across segments into
//! a [`ChannelTable`]. Channel columns are named `group/channel`.
//!
//! Supported layout is contiguous little-endian numeric data, which is what
//! plain data-acquisition loggers write. Big-endian, interleaved and DAQmx
//! segments are rejected with a descriptive error rather than misread.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::loaders::{ChannelTable, Column};

/// Errors that can occur while decoding a capture file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a TDMS file")]
    NotTdms(PathBuf),

    #[error("truncated segment data at byte offset {offset}")]
    Truncated { offset: usize },

    #[error("unsupported TDMS layout: {0}")]
    UnsupportedLayout(String),

    #[error("unsupported TDMS data type: {0:#x}")]
    UnsupportedType(u32),

    #[error("invalid TDMS metadata: {0}")]
    InvalidMetadata(String),

    #[error("capture contains no channel data: {0}")]
    EmptyCapture(PathBuf),
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

const LEAD_IN_LEN: usize = 28;
const TDMS_TAG: &[u8; 4] = b"TDSm";

// Table of contents flags
const TOC_META_DATA: u32 = 1 << 1;
const TOC_NEW_OBJ_LIST: u32 = 1 << 2;
const TOC_RAW_DATA: u32 = 1 << 3;
const TOC_INTERLEAVED_DATA: u32 = 1 << 5;
const TOC_BIG_ENDIAN: u32 = 1 << 6;
const TOC_DAQMX_RAW_DATA: u32 = 1 << 7;

// Raw data index markers
const NO_RAW_DATA: u32 = 0xFFFF_FFFF;
const MATCHES_PREVIOUS: u32 = 0x0000_0000;

// TDMS data type identifiers
const TDS_TYPE_I8: u32 = 1;
const TDS_TYPE_I16: u32 = 2;
const TDS_TYPE_I32: u32 = 3;
const TDS_TYPE_I64: u32 = 4;
const TDS_TYPE_U8: u32 = 5;
const TDS_TYPE_U16: u32 = 6;
const TDS_TYPE_U32: u32 = 7;
const TDS_TYPE_U64: u32 = 8;
const TDS_TYPE_F32: u32 = 9;
const TDS_TYPE_F64: u32 = 10;
const TDS_TYPE_STRING: u32 = 0x20;
const TDS_TYPE_BOOLEAN: u32 = 0x21;
const TDS_TYPE_TIMESTAMP: u32 = 0x44;

/// Raw data index for one channel: element type and values per chunk.
#[derive(Debug, Clone, Copy)]
struct RawIndex {
    type_id: u32,
    count: u64,
}

/// Byte cursor over a metadata or raw data region.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::InvalidMetadata("non UTF-8 string".to_string()))
    }
}

/// Size in bytes of a numeric channel element, `None` for non-numeric types.
fn numeric_size(type_id: u32) -> Option<usize> {
    match type_id {
        TDS_TYPE_I8 | TDS_TYPE_U8 => Some(1),
        TDS_TYPE_I16 | TDS_TYPE_U16 => Some(2),
        TDS_TYPE_I32 | TDS_TYPE_U32 | TDS_TYPE_F32 => Some(4),
        TDS_TYPE_I64 | TDS_TYPE_U64 | TDS_TYPE_F64 => Some(8),
        _ => None,
    }
}

/// Size in bytes of a fixed-width property value.
fn property_size(type_id: u32) -> Option<usize> {
    match type_id {
        TDS_TYPE_BOOLEAN => Some(1),
        TDS_TYPE_TIMESTAMP => Some(16),
        _ => numeric_size(type_id),
    }
}

/// Read `count` values of the given element type, widened to f64.
fn read_values(cursor: &mut Cursor, type_id: u32, count: usize, out: &mut Vec<f64>) -> Result<()> {
    out.reserve(count);
    for _ in 0..count {
        let value = match type_id {
            TDS_TYPE_I8 => cursor.take(1)?[0] as i8 as f64,
            TDS_TYPE_U8 => cursor.take(1)?[0] as f64,
            TDS_TYPE_I16 => {
                let b = cursor.take(2)?;
                i16::from_le_bytes([b[0], b[1]]) as f64
            }
            TDS_TYPE_U16 => {
                let b = cursor.take(2)?;
                u16::from_le_bytes([b[0], b[1]]) as f64
            }
            TDS_TYPE_I32 => {
                let b = cursor.take(4)?;
                i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64
            }
            TDS_TYPE_U32 => {
                let b = cursor.take(4)?;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64
            }
            TDS_TYPE_I64 => {
                let b = cursor.take(8)?;
                i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
            }
            TDS_TYPE_U64 => {
                let b = cursor.take(8)?;
                u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
            }
            TDS_TYPE_F32 => {
                let b = cursor.take(4)?;
                f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64
            }
            TDS_TYPE_F64 => {
                let b = cursor.take(8)?;
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
            other => return Err(DecodeError::UnsupportedType(other)),
        };
        out.push(value);
    }
    Ok(())
}

/// Split a TDMS object path like `/'group'/'channel'` into its components.
///
/// Components are single-quoted; a doubled quote inside a component is an
/// escaped quote. Returns `None` for malformed paths.
fn parse_object_path(path: &str) -> Option<Vec<String>> {
    if path == "/" {
        return Some(Vec::new());
    }

    let mut parts = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        rest = rest.strip_prefix("/'")?;
        let mut name = String::new();
        loop {
            let end = rest.find('\'')?;
            name.push_str(&rest[..end]);
            rest = &rest[end + 1..];
            if let Some(after) = rest.strip_prefix('\'') {
                name.push('\'');
                rest = after;
            } else {
                break;
            }
        }
        parts.push(name);
    }

    Some(parts)
}

/// Column name for a channel object path, `None` for root/group objects.
fn channel_name(object_path: &str) -> Result<Option<String>> {
    let parts = parse_object_path(object_path).ok_or_else(|| {
        DecodeError::InvalidMetadata(format!("malformed object path: {}", object_path))
    })?;

    match parts.as_slice() {
        [group, channel] => Ok(Some(format!("{}/{}", group, channel))),
        _ => Ok(None),
    }
}

/// Skip one object property (name, type, value).
fn skip_property(cursor: &mut Cursor) -> Result<()> {
    let _name = cursor.read_string()?;
    let type_id = cursor.read_u32()?;
    if type_id == TDS_TYPE_STRING {
        let len = cursor.read_u32()? as usize;
        cursor.take(len)?;
    } else {
        let size = property_size(type_id).ok_or(DecodeError::UnsupportedType(type_id))?;
        cursor.take(size)?;
    }
    Ok(())
}

/// Decode a TDMS capture file into a channel table.
///
/// Walks every segment in the file, accumulating channel samples in order of
/// first appearance. Raw data index reuse across segments is honored, as is
/// chunk repetition within a segment. Channels of unequal length are padded
/// with `NaN` to a rectangular table.
///
/// # Errors
///
/// Returns an error if the file is not a TDMS file, uses an unsupported
/// layout (big-endian, interleaved, DAQmx) or channel type, is truncated
/// mid-metadata, or contains no channel data at all. Decoding is
/// deterministic: the same input always yields the same table.
pub fn read_capture<P: AsRef<Path>>(path: P) -> Result<ChannelTable> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    // Objects currently contributing raw data, in segment order
    let mut order: Vec<String> = Vec::new();
    // Last seen raw data index per channel, for index reuse
    let mut indices: HashMap<String, RawIndex> = HashMap::new();
    // Channel names in order of first appearance
    let mut channels: Vec<String> = Vec::new();
    let mut data: HashMap<String, Vec<f64>> = HashMap::new();

    fn register(name: &str, channels: &mut Vec<String>, data: &mut HashMap<String, Vec<f64>>) {
        if !data.contains_key(name) {
            channels.push(name.to_string());
            data.insert(name.to_string(), Vec::new());
        }
    }

    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes.len() - pos < LEAD_IN_LEN {
            // Trailing bytes from an interrupted write; nothing decodable left
            break;
        }

        let lead_in = &bytes[pos..pos + LEAD_IN_LEN];
        if &lead_in[..4] != TDMS_TAG {
            return Err(DecodeError::NotTdms(path.to_path_buf()));
        }

        let toc = u32::from_le_bytes([lead_in[4], lead_in[5], lead_in[6], lead_in[7]]);
        if toc & TOC_BIG_ENDIAN != 0 {
            return Err(DecodeError::UnsupportedLayout(
                "big-endian segment".to_string(),
            ));
        }
        if toc & TOC_DAQMX_RAW_DATA != 0 {
            return Err(DecodeError::UnsupportedLayout(
                "DAQmx raw data".to_string(),
            ));
        }

        let next_segment_offset = u64::from_le_bytes([
            lead_in[12], lead_in[13], lead_in[14], lead_in[15], lead_in[16], lead_in[17],
            lead_in[18], lead_in[19],
        ]);
        let raw_data_offset = u64::from_le_bytes([
            lead_in[20], lead_in[21], lead_in[22], lead_in[23], lead_in[24], lead_in[25],
            lead_in[26], lead_in[27],
        ]);

        let data_start = pos + LEAD_IN_LEN + raw_data_offset as usize;
        // An all-ones next segment offset marks a segment cut short by a
        // crashed writer; its data runs to the end of the file.
        let seg_end = if next_segment_offset == u64::MAX {
            bytes.len()
        } else {
            (pos + LEAD_IN_LEN)
                .saturating_add(next_segment_offset as usize)
                .min(bytes.len())
        };

        if data_start > bytes.len() {
            return Err(DecodeError::Truncated { offset: pos });
        }

        if toc & TOC_META_DATA != 0 {
            if toc & TOC_NEW_OBJ_LIST != 0 {
                order.clear();
            }

            let mut cursor = Cursor::new(&bytes[pos + LEAD_IN_LEN..data_start]);
            let num_objects = cursor.read_u32()?;

            for _ in 0..num_objects {
                let object_path = cursor.read_string()?;
                let name = channel_name(&object_path)?;
                let raw_index = cursor.read_u32()?;

                match raw_index {
                    NO_RAW_DATA => {
                        if let Some(name) = &name {
                            order.retain(|n| n != name);
                        }
                    }
                    MATCHES_PREVIOUS => {
                        let name = name.ok_or_else(|| {
                            DecodeError::InvalidMetadata(format!(
                                "raw data on non-channel object: {}",
                                object_path
                            ))
                        })?;
                        if !indices.contains_key(&name) {
                            return Err(DecodeError::InvalidMetadata(format!(
                                "no previous raw data index for channel: {}",
                                name
                            )));
                        }
                        if !order.contains(&name) {
                            order.push(name);
                        }
                    }
                    _ => {
                        let name = name.ok_or_else(|| {
                            DecodeError::InvalidMetadata(format!(
                                "raw data on non-channel object: {}",
                                object_path
                            ))
                        })?;
                        let type_id = cursor.read_u32()?;
                        if numeric_size(type_id).is_none() {
                            return Err(DecodeError::UnsupportedType(type_id));
                        }
                        let dimension = cursor.read_u32()?;
                        if dimension != 1 {
                            return Err(DecodeError::UnsupportedLayout(format!(
                                "array dimension {}",
                                dimension
                            )));
                        }
                        let count = cursor.read_u64()?;

                        indices.insert(name.clone(), RawIndex { type_id, count });
                        if !order.contains(&name) {
                            order.push(name.clone());
                        }
                        register(&name, &mut channels, &mut data);
                    }
                }

                let num_properties = cursor.read_u32()?;
                for _ in 0..num_properties {
                    skip_property(&mut cursor)?;
                }
            }
        }

        if toc & TOC_RAW_DATA != 0 && data_start < seg_end {
            if toc & TOC_INTERLEAVED_DATA != 0 {
                return Err(DecodeError::UnsupportedLayout(
                    "interleaved raw data".to_string(),
                ));
            }

            let chunk_size: usize = order
                .iter()
                .filter_map(|n| indices.get(n))
                .map(|ix| ix.count as usize * numeric_size(ix.type_id).unwrap_or(0))
                .sum();

            if chunk_size > 0 {
                let region = &bytes[data_start..seg_end];
                // Segments written incrementally repeat the chunk layout
                // without new metadata; a trailing partial chunk is dropped.
                let num_chunks = region.len() / chunk_size;
                let mut cursor = Cursor::new(region);

                for _ in 0..num_chunks {
                    for name in &order {
                        let ix = indices[name.as_str()];
                        if !data.contains_key(name.as_str()) {
                            channels.push(name.clone());
                        }
                        let values = data.entry(name.clone()).or_default();
                        read_values(&mut cursor, ix.type_id, ix.count as usize, values)?;
                    }
                }
            }
        }

        pos = seg_end.max(pos + LEAD_IN_LEN);
    }

    if channels.is_empty() || data.values().all(|v| v.is_empty()) {
        return Err(DecodeError::EmptyCapture(path.to_path_buf()));
    }

    let columns = channels
        .into_iter()
        .map(|name| {
            let values = data.remove(&name).unwrap_or_default();
            Column::new(name, values)
        })
        .collect();

    Ok(ChannelTable::from_columns(columns))
}
