//! Persisted hologram artifacts.
//!
//! A computed hologram is stored as two files side by side:
//!
//! - `name.png`: the 8-bit grayscale bitmap sent to the SLM;
//! - `name.npy`: the raw complex hologram field, so the hologram can be
//!   reloaded and reconstructed without running the retrieval again.
//!
//! Fields use the NumPy `.npy` container (little-endian `complex128`,
//! C order) so they stay readable by the usual scientific tooling.
//! Phase maps are accepted as `float64` arrays in the same container.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ShapeBuilder};
use thiserror::Error;

use crate::types::{ComplexField, PhaseMap};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;
const DESCR_COMPLEX: &str = "<c16";
const DESCR_FLOAT: &str = "<f8";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed file: {0}")]
    Format(String),

    #[error("Unsupported array layout: {0}")]
    UnsupportedLayout(String),
}

/// Path of the raw field stored next to a hologram bitmap.
pub fn companion_field_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("npy")
}

/// Write an 8-bit grayscale image. The format follows the file extension.
pub fn save_hologram_image(path: &Path, image: &Array2<u8>) -> Result<(), StorageError> {
    let (h, w) = image.dim();
    let raw: Vec<u8> = image.iter().copied().collect();
    let buffer = image::GrayImage::from_raw(w as u32, h as u32, raw)
        .ok_or_else(|| StorageError::Format(format!("cannot build {}x{} image", h, w)))?;
    buffer.save(path)?;
    Ok(())
}

/// Read an image as 8-bit grayscale, converting colour images.
pub fn load_hologram_image(path: &Path) -> Result<Array2<u8>, StorageError> {
    let gray = image::open(path)?.into_luma8();
    let (w, h) = gray.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| StorageError::Format(e.to_string()))
}

/// Write a complex field as `.npy`.
pub fn save_field(path: &Path, field: &ComplexField) -> Result<(), StorageError> {
    write_npy(path, DESCR_COMPLEX, field)
}

/// Read a complex field written by [`save_field`] or by NumPy.
pub fn load_field(path: &Path) -> Result<ComplexField, StorageError> {
    read_npy(path, DESCR_COMPLEX)
}

/// Write a real phase map as `.npy`.
pub fn save_phase(path: &Path, phase: &PhaseMap) -> Result<(), StorageError> {
    write_npy(path, DESCR_FLOAT, phase)
}

/// Read a real phase map (`float64`) from `.npy`.
pub fn load_phase(path: &Path) -> Result<PhaseMap, StorageError> {
    read_npy(path, DESCR_FLOAT)
}

fn check_endianness() -> Result<(), StorageError> {
    if cfg!(target_endian = "big") {
        return Err(StorageError::UnsupportedLayout(
            "big-endian hosts are not supported".into(),
        ));
    }
    Ok(())
}

fn write_npy<T: bytemuck::Pod>(
    path: &Path,
    descr: &str,
    data: &Array2<T>,
) -> Result<(), StorageError> {
    check_endianness()?;
    let (h, w) = data.dim();
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
        descr, h, w
    );
    // magic + version + u16 length + header + '\n' is padded to the alignment
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| StorageError::Format("npy header too long".into()))?;

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(NPY_MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(header.as_bytes())?;

    let contiguous = data.as_standard_layout();
    let values = contiguous
        .as_slice()
        .ok_or_else(|| StorageError::UnsupportedLayout("non-contiguous array".into()))?;
    out.write_all(bytemuck::cast_slice(values))?;
    out.flush()?;
    Ok(())
}

fn read_npy<T: bytemuck::Pod + Clone>(
    path: &Path,
    descr: &str,
) -> Result<Array2<T>, StorageError> {
    check_endianness()?;
    let mut input = BufReader::new(File::open(path)?);

    let mut preamble = [0u8; 8];
    input.read_exact(&mut preamble)?;
    if &preamble[..6] != NPY_MAGIC {
        return Err(StorageError::Format("missing npy magic".into()));
    }
    let header_len = match preamble[6] {
        1 => {
            let mut len = [0u8; 2];
            input.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            input.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(StorageError::Format(format!("unknown npy version {}", v))),
    };
    let mut header = vec![0u8; header_len];
    input.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);
    let header = NpyHeader::parse(&header)?;

    if header.descr != descr {
        return Err(StorageError::UnsupportedLayout(format!(
            "dtype '{}', expected '{}'",
            header.descr, descr
        )));
    }
    let (h, w) = match header.shape.as_slice() {
        [h, w] => (*h, *w),
        other => {
            return Err(StorageError::UnsupportedLayout(format!(
                "{}-dimensional array, expected 2",
                other.len()
            )))
        }
    };

    let mut values = vec![T::zeroed(); h * w];
    input.read_exact(bytemuck::cast_slice_mut(&mut values))?;

    let array = if header.fortran_order {
        Array2::from_shape_vec((h, w).f(), values)
            .map_err(|e| StorageError::Format(e.to_string()))?
            .as_standard_layout()
            .into_owned()
    } else {
        Array2::from_shape_vec((h, w), values).map_err(|e| StorageError::Format(e.to_string()))?
    };
    Ok(array)
}

#[derive(Debug, PartialEq)]
struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl NpyHeader {
    /// Parse the Python dict literal of an `.npy` header.
    fn parse(text: &str) -> Result<Self, StorageError> {
        let descr = value_after(text, "descr")?;
        let descr = descr
            .trim_start_matches(['\'', '"'])
            .split(['\'', '"'])
            .next()
            .unwrap_or_default()
            .to_string();

        let fortran_order = match value_after(text, "fortran_order")? {
            v if v.starts_with("True") => true,
            v if v.starts_with("False") => false,
            v => return Err(StorageError::Format(format!("bad fortran_order '{}'", v))),
        };

        let shape = value_after(text, "shape")?;
        let inner = shape
            .strip_prefix('(')
            .and_then(|s| s.split(')').next())
            .ok_or_else(|| StorageError::Format("bad shape tuple".into()))?;
        let shape = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| StorageError::Format(format!("bad dimension '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            descr,
            fortran_order,
            shape,
        })
    }
}

fn value_after<'a>(text: &'a str, key: &str) -> Result<&'a str, StorageError> {
    let quoted = [format!("'{}'", key), format!("\"{}\"", key)];
    let start = quoted
        .iter()
        .find_map(|k| text.find(k.as_str()).map(|i| i + k.len()))
        .ok_or_else(|| StorageError::Format(format!("npy header lacks '{}'", key)))?;
    let rest = text[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| StorageError::Format(format!("npy header: no value for '{}'", key)))?;
    Ok(rest.trim_start())
}
