//! Encoding-aware line reading with byte-accurate file positions.
//!
//! The rest of the pipeline never touches raw bytes: it sees decoded lines
//! plus the byte offset immediately after each line's terminator, which is
//! what makes the newline index and O(1) record seeks possible. Three
//! encodings are supported:
//!
//! - **UTF-8**, with an optional `EF BB BF` BOM consumed at open time.
//! - **UTF-16**, BOM mandatory; lines are read as 16-bit code units and
//!   terminated on the unit `0x000A`.
//! - **Windows-1252**, read as raw byte lines and transcoded through
//!   `encoding_rs`.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Utf16,
    Win1252,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Utf16 => "utf16",
            TextEncoding::Win1252 => "win1252",
        }
    }
}

impl FromStr for TextEncoding {
    type Err = ImportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "utf16" | "utf-16" => Ok(TextEncoding::Utf16),
            "win1252" | "windows-1252" | "cp1252" => Ok(TextEncoding::Win1252),
            _ => Err(ImportError::UnknownEncoding(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Utf16Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeMode {
    Utf8,
    Utf16(Utf16Endian),
    Win1252,
}

/// Owns the raw file and presents it as decoded lines. The BOM is consumed
/// exactly once at open; `pos` is always a byte offset into the raw file.
#[derive(Debug)]
pub struct EncodedReader {
    reader: BufReader<File>,
    mode: DecodeMode,
    pos: u64,
    raw: Vec<u8>,
    units: Vec<u16>,
}

impl EncodedReader {
    pub fn open(path: &Path, encoding: TextEncoding) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
        let mut reader = BufReader::new(file);
        let (mode, pos) = match encoding {
            TextEncoding::Utf8 => {
                let mut bom = [0u8; 3];
                let read = read_up_to(&mut reader, &mut bom)?;
                if read == 3 && bom == [0xEF, 0xBB, 0xBF] {
                    (DecodeMode::Utf8, 3)
                } else {
                    reader.seek(SeekFrom::Start(0))?;
                    (DecodeMode::Utf8, 0)
                }
            }
            TextEncoding::Utf16 => {
                let size = reader.get_ref().metadata()?.len();
                if size % 2 != 0 {
                    return Err(ImportError::OddUtf16Length(size).into());
                }
                let mut bom = [0u8; 2];
                let read = read_up_to(&mut reader, &mut bom)?;
                let endian = match (read, bom) {
                    (2, [0xFE, 0xFF]) => Utf16Endian::Little,
                    (2, [0xFF, 0xFE]) => Utf16Endian::Big,
                    _ => return Err(ImportError::BadBom(bom[..read].to_vec()).into()),
                };
                (DecodeMode::Utf16(endian), 2)
            }
            TextEncoding::Win1252 => (DecodeMode::Win1252, 0),
        };
        Ok(Self {
            reader,
            mode,
            pos,
            raw: Vec::with_capacity(4096),
            units: Vec::with_capacity(2048),
        })
    }

    /// Byte position immediately after the last consumed terminator.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    pub fn eof(&mut self) -> Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Reads the next logical line into `line`, stripping the newline code
    /// point. Returns `false` at end of file. Any carriage return preceding
    /// the newline is left in place for the tokenizer to eat.
    pub fn read_line(&mut self, line: &mut String) -> Result<bool> {
        line.clear();
        match self.mode {
            DecodeMode::Utf8 => {
                self.raw.clear();
                let n = self.reader.read_until(b'\n', &mut self.raw)?;
                if n == 0 {
                    return Ok(false);
                }
                self.pos += n as u64;
                if self.raw.last() == Some(&b'\n') {
                    self.raw.pop();
                }
                let text = std::str::from_utf8(&self.raw)
                    .map_err(|err| anyhow!("Invalid UTF-8 at byte {}: {err}", self.pos))?;
                line.push_str(text);
                Ok(true)
            }
            DecodeMode::Utf16(endian) => {
                self.units.clear();
                loop {
                    match self.read_code_unit(endian)? {
                        None => {
                            if self.units.is_empty() {
                                return Ok(false);
                            }
                            break;
                        }
                        Some(0x000A) => break,
                        Some(unit) => self.units.push(unit),
                    }
                }
                let text = String::from_utf16(&self.units)
                    .map_err(|err| anyhow!("Invalid UTF-16 at byte {}: {err}", self.pos))?;
                line.push_str(&text);
                Ok(true)
            }
            DecodeMode::Win1252 => {
                self.raw.clear();
                let n = self.reader.read_until(b'\n', &mut self.raw)?;
                if n == 0 {
                    return Ok(false);
                }
                self.pos += n as u64;
                if self.raw.last() == Some(&b'\n') {
                    self.raw.pop();
                }
                let (text, _, _) = WINDOWS_1252.decode(&self.raw);
                line.push_str(&text);
                Ok(true)
            }
        }
    }

    fn read_code_unit(&mut self, endian: Utf16Endian) -> Result<Option<u16>> {
        let mut pair = [0u8; 2];
        match read_up_to(&mut self.reader, &mut pair)? {
            0 => Ok(None),
            1 => Err(ImportError::ShortCodeUnit.into()),
            _ => {
                self.pos += 2;
                let unit = match endian {
                    Utf16Endian::Little => u16::from_le_bytes(pair),
                    Utf16Endian::Big => u16::from_be_bytes(pair),
                };
                Ok(Some(unit))
            }
        }
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
