//! Typed on-disk pages in the NumPy `.npy` v1.0 container.
//!
//! Every page starts with the magic prelude (`\x93NUMPY`, version 1.0, a
//! little-endian u16 header length, the ASCII dict header) padded with
//! spaces so the full prelude is a multiple of 64 bytes and ends in `\n`.
//! Fixed-stride bodies follow for bool/int/float/unicode pages; object
//! pages delegate their body to the pickle stream writer.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};

use crate::{
    data::Value,
    error::ImportError,
    infer::{PageType, code_point_len},
    pickle::Pickler,
};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Formats the dict header for `descr` and row count `rows`.
fn header_dict(descr: &str, rows: usize) -> String {
    format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': ({rows},)}}")
}

/// Writes the full `.npy` prelude: magic, version, padded header, newline.
pub fn write_npy_header<W: Write>(writer: &mut W, descr: &str, rows: usize) -> Result<()> {
    let dict = header_dict(descr, rows);
    let header_len = dict.len();
    let padding = NPY_ALIGN - ((NPY_MAGIC.len() + 4 + header_len) % NPY_ALIGN);
    let padded_len = header_len + padding;
    if padded_len > u16::MAX as usize {
        bail!("Page header of {header_len} bytes exceeds the u16 length field");
    }
    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[0x01, 0x00])?;
    writer.write_all(&(padded_len as u16).to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;
    for _ in 0..padding - 1 {
        writer.write_all(b" ")?;
    }
    writer.write_all(b"\n")?;
    Ok(())
}

enum PageBody {
    Bool,
    Int64,
    Float64,
    Unicode { width: usize },
    Object { pickler: Pickler, rows: usize },
}

/// One destination page: a created file, its header already on disk,
/// accepting body writes for exactly the declared element type.
pub struct Page {
    writer: BufWriter<File>,
    body: PageBody,
}

impl Page {
    /// Creates the page file and writes its prelude. `width` is only
    /// consulted for unicode pages and is clamped to at least one code
    /// point (NumPy rejects `<U0`).
    pub fn create(path: &Path, page_type: PageType, rows: usize, width: usize) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Creating page file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        let body = match page_type {
            PageType::Bool => {
                write_npy_header(&mut writer, "|b1", rows)?;
                PageBody::Bool
            }
            PageType::Int64 => {
                write_npy_header(&mut writer, "<i8", rows)?;
                PageBody::Int64
            }
            PageType::Float64 => {
                write_npy_header(&mut writer, "<f8", rows)?;
                PageBody::Float64
            }
            PageType::Unset | PageType::Unicode => {
                let width = width.max(1);
                write_npy_header(&mut writer, &format!("<U{width}"), rows)?;
                PageBody::Unicode { width }
            }
            PageType::Object => {
                write_npy_header(&mut writer, "|O", rows)?;
                let mut pickler = Pickler::new();
                pickler.write_prelude(&mut writer, rows)?;
                PageBody::Object { pickler, rows }
            }
        };
        Ok(Self { writer, body })
    }

    /// Unicode element: each code point as little-endian u32, zero-padded
    /// to the page width.
    pub fn write_unicode(&mut self, value: &str) -> Result<()> {
        let PageBody::Unicode { width } = self.body else {
            bail!("write_unicode on a non-unicode page");
        };
        let len = code_point_len(value);
        if len > width {
            return Err(ImportError::Integrity {
                value: value.to_string(),
                dtype: "unicode",
            }
            .into());
        }
        for ch in value.chars() {
            self.writer.write_all(&(ch as u32).to_le_bytes())?;
        }
        for _ in len..width {
            self.writer.write_all(&0u32.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn write_int(&mut self, value: i64) -> Result<()> {
        debug_assert!(matches!(self.body, PageBody::Int64));
        self.writer.write_all(&value.to_ne_bytes())?;
        Ok(())
    }

    pub fn write_float(&mut self, value: f64) -> Result<()> {
        debug_assert!(matches!(self.body, PageBody::Float64));
        self.writer.write_all(&value.to_ne_bytes())?;
        Ok(())
    }

    /// Bool element: `0x01` for a case-insensitive `true`, else `0x00`.
    pub fn write_bool_token(&mut self, value: &str) -> Result<()> {
        debug_assert!(matches!(self.body, PageBody::Bool));
        let byte = if value.eq_ignore_ascii_case("true") { 1u8 } else { 0u8 };
        self.writer.write_all(&[byte])?;
        Ok(())
    }

    pub fn write_object(&mut self, value: &Value) -> Result<()> {
        let PageBody::Object { ref mut pickler, .. } = self.body else {
            bail!("write_object on a non-object page");
        };
        pickler.write_value(&mut self.writer, value)
    }

    /// Emits the object-page suffix where applicable and flushes.
    pub fn finalize(mut self) -> Result<()> {
        if let PageBody::Object { ref mut pickler, rows } = self.body {
            pickler.write_suffix(&mut self.writer, rows)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
