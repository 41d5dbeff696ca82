//! NumPy `.npy` reader/writer with row-range reads.
//!
//! Only the header is parsed eagerly; payload reads seek straight to the
//! requested rows so cropping a window out of a multi-minute spectrogram
//! costs O(window) rather than O(file).

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use num_complex::Complex32;

use super::ChunkedArrayStore;
use crate::error::{DatasetError, DatasetResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header block is padded so the payload starts on this boundary.
const HEADER_ALIGN: usize = 64;

/// Element types the reader can decode into `Complex32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// `<f4`
    Float32,
    /// `<f8`
    Float64,
    /// `<c8`
    Complex64,
    /// `<c16`
    Complex128,
}

impl Dtype {
    /// Parse a numpy `descr` string. Big-endian layouts are rejected.
    fn parse(descr: &str, path: &Path) -> DatasetResult<Self> {
        let mut chars = descr.chars();
        let order = chars.next();
        let code = chars.as_str();
        match order {
            Some('<' | '|') => {}
            Some('=') if cfg!(target_endian = "little") => {}
            _ => {
                return Err(DatasetError::unsupported(
                    path,
                    format!("byte order of dtype '{}' is not little-endian", descr),
                ))
            }
        }
        match code {
            "f4" => Ok(Dtype::Float32),
            "f8" => Ok(Dtype::Float64),
            "c8" => Ok(Dtype::Complex64),
            "c16" => Ok(Dtype::Complex128),
            _ => Err(DatasetError::unsupported(
                path,
                format!("dtype '{}' is not supported", descr),
            )),
        }
    }

    pub fn item_size(self) -> usize {
        match self {
            Dtype::Float32 => 4,
            Dtype::Float64 | Dtype::Complex64 => 8,
            Dtype::Complex128 => 16,
        }
    }

    fn decode(self, bytes: &[u8]) -> Vec<Complex32> {
        let size = self.item_size();
        bytes
            .chunks_exact(size)
            .map(|b| match self {
                Dtype::Float32 => Complex32::new(f32_le(&b[0..4]), 0.0),
                Dtype::Float64 => Complex32::new(f64_le(&b[0..8]) as f32, 0.0),
                Dtype::Complex64 => Complex32::new(f32_le(&b[0..4]), f32_le(&b[4..8])),
                Dtype::Complex128 => {
                    Complex32::new(f64_le(&b[0..8]) as f32, f64_le(&b[8..16]) as f32)
                }
            })
            .collect()
    }
}

fn f32_le(b: &[u8]) -> f32 {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn f64_le(b: &[u8]) -> f64 {
    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub dtype: Dtype,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
    /// Byte offset of the first payload byte.
    pub data_offset: u64,
}

impl NpyHeader {
    /// Number of elements in one row (product of all but the first dim).
    ///
    /// `None` if the shape overflows `usize`.
    pub fn row_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .skip(1)
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn row_bytes(&self) -> Option<usize> {
        self.row_len()?.checked_mul(self.dtype.item_size())
    }

    /// Size of the whole payload in bytes.
    pub fn payload_bytes(&self) -> Option<usize> {
        self.row_bytes()?.checked_mul(self.rows())
    }

    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    fn require_c_order(&self, path: &Path) -> DatasetResult<()> {
        if self.fortran_order {
            return Err(DatasetError::unsupported(
                path,
                "Fortran (column-major) order arrays are not supported",
            ));
        }
        Ok(())
    }
}

/// Read magic, version and header dict from the start of `reader`.
///
/// `path` is only used for error messages.
pub fn read_header<R: Read>(reader: &mut R, path: &Path) -> DatasetResult<NpyHeader> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic[..6] != MAGIC {
        return Err(DatasetError::format(path, "missing NUMPY magic"));
    }
    let major = magic[6];

    let (header_len, prefix_len) = match major {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            (u16::from_le_bytes(len) as usize, 10)
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            (u32::from_le_bytes(len) as usize, 12)
        }
        v => {
            return Err(DatasetError::unsupported(
                path,
                format!("npy format version {} is not supported", v),
            ))
        }
    };

    let mut raw = vec![0u8; header_len];
    reader.read_exact(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);

    let descr = dict_string(&text, "descr")
        .ok_or_else(|| DatasetError::format(path, "header has no 'descr'"))?;
    let fortran_order = dict_bool(&text, "fortran_order")
        .ok_or_else(|| DatasetError::format(path, "header has no 'fortran_order'"))?;
    let shape = dict_shape(&text)
        .ok_or_else(|| DatasetError::format(path, "header has no parsable 'shape'"))?;

    let header = NpyHeader {
        dtype: Dtype::parse(&descr, path)?,
        fortran_order,
        shape,
        data_offset: (prefix_len + header_len) as u64,
    };
    if header.payload_bytes().is_none() {
        return Err(shape_overflow(path));
    }
    Ok(header)
}

fn shape_overflow(path: &Path) -> DatasetError {
    DatasetError::format(path, "shape overflows the addressable size")
}

fn truncated(path: &Path, needed: u64, available: u64) -> DatasetError {
    DatasetError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!(
            "{} is truncated: payload needs {} bytes, file has {}",
            path.display(),
            needed,
            available
        ),
    ))
}

/// Locate the text following `'key':` in a python-literal dict.
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let idx = text.find(&pattern)?;
    Some(text[idx + pattern.len()..].trim_start())
}

fn dict_string(text: &str, key: &str) -> Option<String> {
    let rest = dict_value(text, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn dict_bool(text: &str, key: &str) -> Option<bool> {
    let rest = dict_value(text, key)?;
    if rest.starts_with("True") {
        Some(true)
    } else if rest.starts_with("False") {
        Some(false)
    } else {
        None
    }
}

fn dict_shape(text: &str) -> Option<Vec<usize>> {
    let rest = dict_value(text, "shape")?;
    let rest = rest.strip_prefix('(')?;
    let end = rest.find(')')?;
    rest[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse::<usize>().ok())
        .collect()
}

/// Read a whole array (header + payload) from any reader.
pub fn read_array<R: Read>(reader: &mut R, path: &Path) -> DatasetResult<ArrayD<Complex32>> {
    let header = read_header(reader, path)?;
    header.require_c_order(path)?;

    // Grow with the data actually present instead of trusting the header size.
    let total = header.payload_bytes().ok_or_else(|| shape_overflow(path))?;
    let mut bytes = Vec::new();
    reader.by_ref().take(total as u64).read_to_end(&mut bytes)?;
    if bytes.len() < total {
        return Err(truncated(path, total as u64, bytes.len() as u64));
    }
    let data = header.dtype.decode(&bytes);

    Ok(ArrayD::from_shape_vec(IxDyn(&header.shape), data)?)
}

/// Write `array` as a version 1.0, C-order `<c8` array.
pub fn write_array<W, S, D>(writer: &mut W, array: &ArrayBase<S, D>) -> std::io::Result<()>
where
    W: Write,
    S: Data<Elem = Complex32>,
    D: Dimension,
{
    let shape = match array.shape() {
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!(
        "{{'descr': '<c8', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    // magic(6) + version(2) + len(2) + dict + '\n'
    let unpadded = 10 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(dict.len() as u16).to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;

    // Logical iteration order is row-major regardless of memory layout.
    for c in array.iter() {
        writer.write_all(&c.re.to_le_bytes())?;
        writer.write_all(&c.im.to_le_bytes())?;
    }
    Ok(())
}

/// Write `array` to `path` as `.npy`, creating parent directories.
pub fn write_npy<S, D>(path: &Path, array: &ArrayBase<S, D>) -> DatasetResult<()>
where
    S: Data<Elem = Complex32>,
    D: Dimension,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_array(&mut writer, array)?;
    writer.flush()?;
    Ok(())
}

fn open(path: &Path) -> DatasetResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DatasetError::not_found(path),
        _ => DatasetError::Io(e),
    })
}

/// [`ChunkedArrayStore`] over `.npy` files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyStore;

impl NpyStore {
    pub fn header(&self, path: &Path) -> DatasetResult<NpyHeader> {
        let mut file = open(path)?;
        read_header(&mut file, path)
    }
}

impl ChunkedArrayStore for NpyStore {
    fn shape_of(&self, path: &Path) -> DatasetResult<Vec<usize>> {
        Ok(self.header(path)?.shape)
    }

    fn read_rows(
        &self,
        path: &Path,
        start_row: usize,
        row_count: usize,
    ) -> DatasetResult<ArrayD<Complex32>> {
        let mut file = open(path)?;
        let header = read_header(&mut file, path)?;
        header.require_c_order(path)?;

        let rows = header.rows();
        if header.shape.is_empty() || start_row.saturating_add(row_count) > rows {
            return Err(DatasetError::CropOutOfRange {
                path: PathBuf::from(path),
                rows,
                start: start_row,
                count: row_count,
            });
        }

        // Both products are bounded by the payload size checked in read_header.
        let row_bytes = header.row_bytes().ok_or_else(|| shape_overflow(path))?;
        let skip = (start_row * row_bytes) as u64;
        let len = row_count * row_bytes;

        let end = header.data_offset.saturating_add(skip + len as u64);
        let available = file.metadata()?.len();
        if end > available {
            return Err(truncated(path, end, available));
        }

        file.seek(SeekFrom::Start(header.data_offset + skip))?;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;

        let mut shape = header.shape.clone();
        shape[0] = row_count;
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), header.dtype.decode(&bytes))?)
    }

    fn read_all(&self, path: &Path) -> DatasetResult<ArrayD<Complex32>> {
        let mut file = std::io::BufReader::new(open(path)?);
        read_array(&mut file, path)
    }
}
