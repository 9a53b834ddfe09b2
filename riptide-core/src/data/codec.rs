//! Sample codecs
//!
//! Decode raw object bytes into an in-memory array indexable by
//! intra-object sample offset. Samples are stored contiguously along
//! the trailing axis of a C-order array, so one object yields one
//! array holding `shape.last()` samples.

use std::io::{Cursor, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, RiptideError};

/// Decoded object payload
///
/// C-order element data with the sample axis trailing: sample `i` is
/// the set of elements whose last index equals `i`.
#[derive(Debug, Clone)]
pub struct SampleArray {
    data: Bytes,
    shape: Vec<usize>,
    elem_size: usize,
}

impl SampleArray {
    /// Build an array from raw element data
    pub fn from_parts(data: Bytes, shape: Vec<usize>, elem_size: usize) -> Result<Self> {
        if shape.is_empty() || elem_size == 0 {
            return Err(RiptideError::Internal {
                message: "sample array needs a non-empty shape and element size".into(),
            });
        }
        let expected = shape
            .iter()
            .try_fold(elem_size, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| RiptideError::Internal {
                message: "sample array shape overflows".into(),
            })?;
        if expected != data.len() {
            return Err(RiptideError::Internal {
                message: format!(
                    "sample array data is {} bytes, shape wants {}",
                    data.len(),
                    expected
                ),
            });
        }
        Ok(Self {
            data,
            shape,
            elem_size,
        })
    }

    /// Number of samples (trailing axis length)
    pub fn num_samples(&self) -> usize {
        *self.shape.last().unwrap_or(&0)
    }

    /// Total payload size in bytes
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Byte size of one sample
    pub fn sample_nbytes(&self) -> usize {
        let n = self.num_samples();
        if n == 0 {
            0
        } else {
            self.data.len() / n
        }
    }

    /// Array shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Raw element data
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Gather the trailing-axis slice at `offset` into a contiguous
    /// buffer; `None` when the offset is out of bounds
    pub fn sample(&self, offset: usize) -> Option<Bytes> {
        let n = self.num_samples();
        if offset >= n {
            return None;
        }

        let stride = n * self.elem_size;
        let rows = self.data.len() / stride;
        let mut out = BytesMut::with_capacity(rows * self.elem_size);
        for row in 0..rows {
            let start = row * stride + offset * self.elem_size;
            out.put_slice(&self.data[start..start + self.elem_size]);
        }
        Some(out.freeze())
    }
}

/// Format-specific decoder from object bytes to a sample array
pub trait SampleCodec: Send + Sync {
    /// Decode one object's bytes; the key is carried for diagnostics
    fn decode(&self, key: &str, raw: &[u8]) -> Result<SampleArray>;
}

/// NPZ codec: one named NPY array inside a zip archive
#[derive(Debug, Clone)]
pub struct NpzCodec {
    member: String,
}

impl NpzCodec {
    /// Create a codec reading the given archive member
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
        }
    }

    /// Encode an array into a single-member NPZ archive
    ///
    /// Counterpart of `decode`, used by the dataset generator and
    /// tests. The element type is written as an opaque void dtype.
    pub fn encode(&self, array: &SampleArray) -> Result<Bytes> {
        let shape_str = if array.shape.len() == 1 {
            format!("{},", array.shape[0])
        } else {
            array
                .shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let dict = format!(
            "{{'descr': '|V{}', 'fortran_order': False, 'shape': ({}), }}",
            array.elem_size, shape_str
        );

        let mut header = dict.into_bytes();
        let unpadded = NPY_DATA_START + header.len() + 1;
        header.extend(std::iter::repeat(b' ').take((64 - unpadded % 64) % 64));
        header.push(b'\n');
        if header.len() > u16::MAX as usize {
            return Err(RiptideError::Internal {
                message: "npy header too large".into(),
            });
        }

        let mut npy = Vec::with_capacity(NPY_DATA_START + header.len() + array.data.len());
        npy.extend_from_slice(NPY_MAGIC);
        npy.extend_from_slice(&[1, 0]);
        npy.extend_from_slice(&(header.len() as u16).to_le_bytes());
        npy.extend_from_slice(&header);
        npy.extend_from_slice(&array.data);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(self.member.as_str(), options)
            .map_err(|e| RiptideError::Internal {
                message: format!("npz write failed: {}", e),
            })?;
        writer.write_all(&npy).map_err(|e| RiptideError::Internal {
            message: format!("npz write failed: {}", e),
        })?;
        let cursor = writer.finish().map_err(|e| RiptideError::Internal {
            message: format!("npz finish failed: {}", e),
        })?;

        Ok(Bytes::from(cursor.into_inner()))
    }
}

impl Default for NpzCodec {
    fn default() -> Self {
        // Generated datasets store their payload under 'x'
        Self::new("x.npy")
    }
}

impl SampleCodec for NpzCodec {
    fn decode(&self, key: &str, raw: &[u8]) -> Result<SampleArray> {
        let codec_err = |reason: String| RiptideError::CodecError {
            key: key.into(),
            reason,
        };

        let mut archive = ZipArchive::new(Cursor::new(raw))
            .map_err(|e| codec_err(format!("not a zip archive: {}", e)))?;
        let mut member = archive
            .by_name(&self.member)
            .map_err(|e| codec_err(format!("missing member {}: {}", self.member, e)))?;
        let mut npy = Vec::new();
        member
            .read_to_end(&mut npy)
            .map_err(|e| codec_err(format!("failed to read member {}: {}", self.member, e)))?;

        parse_npy(key, &npy)
    }
}

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_DATA_START: usize = 10;

/// Parse an NPY byte stream into a sample array
fn parse_npy(key: &str, npy: &[u8]) -> Result<SampleArray> {
    let codec_err = |reason: String| RiptideError::CodecError {
        key: key.into(),
        reason,
    };

    if npy.len() < NPY_DATA_START || &npy[..NPY_MAGIC.len()] != NPY_MAGIC {
        return Err(codec_err("bad npy magic".into()));
    }

    let (header_len, header_start) = match npy[6] {
        1 => (
            u16::from_le_bytes([npy[8], npy[9]]) as usize,
            NPY_DATA_START,
        ),
        2 => {
            if npy.len() < 12 {
                return Err(codec_err("truncated npy header".into()));
            }
            (
                u32::from_le_bytes([npy[8], npy[9], npy[10], npy[11]]) as usize,
                12,
            )
        }
        v => return Err(codec_err(format!("unsupported npy version {}", v))),
    };

    let data_start = header_start + header_len;
    if npy.len() < data_start {
        return Err(codec_err("truncated npy header".into()));
    }
    let header = std::str::from_utf8(&npy[header_start..data_start])
        .map_err(|_| codec_err("npy header is not ASCII".into()))?;

    if header.contains("'fortran_order': True") {
        return Err(codec_err("Fortran-order arrays are not supported".into()));
    }

    let descr = extract_quoted(header, "'descr':")
        .ok_or_else(|| codec_err("npy header missing descr".into()))?;
    let elem_size = descr_elem_size(descr)
        .ok_or_else(|| codec_err(format!("unsupported dtype descr {}", descr)))?;

    let shape = extract_shape(header)
        .ok_or_else(|| codec_err("npy header missing shape".into()))?;
    if shape.is_empty() {
        return Err(codec_err("scalar array has no sample axis".into()));
    }

    let expected = shape
        .iter()
        .try_fold(elem_size, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| codec_err("npy shape overflows".into()))?;
    let payload = &npy[data_start..];
    if payload.len() != expected {
        return Err(codec_err(format!(
            "payload is {} bytes, shape wants {}",
            payload.len(),
            expected
        )));
    }

    SampleArray::from_parts(Bytes::copy_from_slice(payload), shape, elem_size)
}

/// Extract a single-quoted value following `field` in the header dict
fn extract_quoted<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    let rest = &header[header.find(field)? + field.len()..];
    let open = rest.find('\'')?;
    let rest = &rest[open + 1..];
    let close = rest.find('\'')?;
    Some(&rest[..close])
}

/// Element byte size from a dtype descr like `<f4`, `|u1`, or `|V256`
fn descr_elem_size(descr: &str) -> Option<usize> {
    let digits: String = descr
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok().filter(|&n| n > 0)
}

/// Parse the shape tuple from the header dict
fn extract_shape(header: &str) -> Option<Vec<usize>> {
    let rest = &header[header.find("'shape':")? + "'shape':".len()..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    let mut shape = Vec::new();
    for part in rest[open + 1..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        shape.push(part.parse().ok()?);
    }
    Some(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential_array(shape: Vec<usize>) -> SampleArray {
        let total: usize = shape.iter().product();
        let data: Vec<u8> = (0..total).map(|i| i as u8).collect();
        SampleArray::from_parts(Bytes::from(data), shape, 1).unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codec = NpzCodec::default();
        let array = sequential_array(vec![3, 4]);
        let encoded = codec.encode(&array).unwrap();
        let decoded = codec.decode("k", &encoded).unwrap();

        assert_eq!(decoded.shape(), &[3, 4]);
        assert_eq!(decoded.num_samples(), 4);
        assert_eq!(decoded.data(), array.data());
    }

    #[test]
    fn test_trailing_axis_slicing() {
        // Shape (2, 4): element (r, s) has value r * 4 + s
        let array = sequential_array(vec![2, 4]);

        let sample = array.sample(1).unwrap();
        assert_eq!(&sample[..], &[1, 5]);
        let sample = array.sample(3).unwrap();
        assert_eq!(&sample[..], &[3, 7]);
        assert!(array.sample(4).is_none());
    }

    #[test]
    fn test_sample_nbytes() {
        let array = sequential_array(vec![8, 4]);
        assert_eq!(array.sample_nbytes(), 8);
        assert_eq!(array.sample(0).unwrap().len(), 8);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = NpzCodec::default();
        let err = codec.decode("k", b"definitely not a zip").unwrap_err();
        assert!(matches!(err, RiptideError::CodecError { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_member() {
        let codec = NpzCodec::new("y.npy");
        let encoded = NpzCodec::default()
            .encode(&sequential_array(vec![2, 2]))
            .unwrap();
        let err = codec.decode("k", &encoded).unwrap_err();
        assert!(matches!(err, RiptideError::CodecError { .. }));
    }

    #[test]
    fn test_decode_rejects_fortran_order() {
        let dict = b"{'descr': '|u1', 'fortran_order': True, 'shape': (2, 2), }\n";
        let mut npy = Vec::new();
        npy.extend_from_slice(NPY_MAGIC);
        npy.extend_from_slice(&[1, 0]);
        npy.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        npy.extend_from_slice(dict);
        npy.extend_from_slice(&[0u8; 4]);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("x.npy", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&npy).unwrap();
        let raw = writer.finish().unwrap().into_inner();

        let err = NpzCodec::default().decode("k", &raw).unwrap_err();
        assert!(matches!(err, RiptideError::CodecError { .. }));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let codec = NpzCodec::default();
        let array = sequential_array(vec![2, 4]);
        let encoded = codec.encode(&array).unwrap();

        // Re-archive the npy with its last byte chopped off
        let mut archive = ZipArchive::new(Cursor::new(&encoded[..])).unwrap();
        let mut npy = Vec::new();
        archive
            .by_name("x.npy")
            .unwrap()
            .read_to_end(&mut npy)
            .unwrap();
        npy.pop();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("x.npy", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&npy).unwrap();
        let raw = writer.finish().unwrap().into_inner();

        let err = codec.decode("k", &raw).unwrap_err();
        assert!(matches!(err, RiptideError::CodecError { .. }));
    }

    #[test]
    fn test_from_parts_validates_length() {
        let result = SampleArray::from_parts(Bytes::from_static(&[0; 7]), vec![2, 4], 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_descr_elem_sizes() {
        assert_eq!(descr_elem_size("<f4"), Some(4));
        assert_eq!(descr_elem_size("|u1"), Some(1));
        assert_eq!(descr_elem_size("|V256"), Some(256));
        assert_eq!(descr_elem_size("<f0"), None);
        assert_eq!(descr_elem_size("bogus"), None);
    }
}
