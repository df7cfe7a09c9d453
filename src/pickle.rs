//! Pickle-protocol-3 stream for object pages.
//!
//! The body of an `|O` page reconstructs a 1-D NumPy object array: a fixed
//! prelude (`_reconstruct` + `ndarray` + the `O8` dtype), the element list,
//! and a fixed suffix. Scalars follow CPython's own reduce conventions, so
//! any standard unpickler yields `None`/`bool`/`int`/`float`/`str` plus
//! `datetime.date`, `datetime.time`, and `datetime.datetime` objects.
//!
//! Memoization: every interned object is followed by a BINPUT (or
//! LONG_BINPUT once the counter passes 255). Nothing ever emits a BINGET,
//! so the memo only has to be self-consistent, not minimal.

use std::io::Write;

use anyhow::Result;
use chrono::{Datelike, Timelike};

use crate::data::{TimeValue, Value};

const PROTO: &[u8] = b"\x80\x03";
const GLOBAL: u8 = b'c';
const BINPUT: u8 = b'q';
const LONG_BINPUT: u8 = b'r';
const MARK: u8 = b'(';
const EMPTY_LIST: u8 = b']';
const APPENDS: u8 = b'e';
const TUPLE: u8 = b't';
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
const REDUCE: u8 = b'R';
const BUILD: u8 = b'b';
const NONE: u8 = b'N';
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const BININT2: u8 = b'M';
const BINFLOAT: u8 = b'G';
const BINUNICODE: u8 = b'X';
const SHORT_BINBYTES: u8 = b'C';
const LONG1: u8 = 0x8a;
const STOP: u8 = b'.';

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

pub struct Pickler {
    binput: u32,
}

impl Default for Pickler {
    fn default() -> Self {
        Self::new()
    }
}

impl Pickler {
    pub fn new() -> Self {
        Self { binput: 0 }
    }

    fn put<W: Write>(&mut self, w: &mut W) -> Result<()> {
        if self.binput <= 255 {
            w.write_all(&[BINPUT, self.binput as u8])?;
        } else {
            w.write_all(&[LONG_BINPUT])?;
            w.write_all(&self.binput.to_le_bytes())?;
        }
        self.binput += 1;
        Ok(())
    }

    fn global<W: Write>(&mut self, w: &mut W, module: &str, name: &str) -> Result<()> {
        w.write_all(&[GLOBAL])?;
        w.write_all(module.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(name.as_bytes())?;
        w.write_all(b"\n")?;
        self.put(w)
    }

    fn binint<W: Write>(&self, w: &mut W, value: i32) -> Result<()> {
        w.write_all(&[BININT])?;
        w.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn binunicode<W: Write>(&mut self, w: &mut W, value: &str) -> Result<()> {
        w.write_all(&[BINUNICODE])?;
        w.write_all(&(value.len() as u32).to_le_bytes())?;
        w.write_all(value.as_bytes())?;
        self.put(w)
    }

    fn short_binbytes<W: Write>(&mut self, w: &mut W, payload: &[u8]) -> Result<()> {
        w.write_all(&[SHORT_BINBYTES, payload.len() as u8])?;
        w.write_all(payload)?;
        self.put(w)
    }

    /// Everything before the element stream: reconstruct an empty ndarray
    /// stub, open its state tuple, emit the `O8` dtype, and leave the
    /// element list (plus a MARK when `rows > 0`) on the stack.
    pub fn write_prelude<W: Write>(&mut self, w: &mut W, rows: usize) -> Result<()> {
        w.write_all(PROTO)?;
        self.global(w, "numpy.core.multiarray", "_reconstruct")?;
        self.global(w, "numpy", "ndarray")?;
        self.binint(w, 0)?;
        w.write_all(&[TUPLE1])?;
        self.put(w)?;
        self.short_binbytes(w, b"b")?;
        w.write_all(&[TUPLE3])?;
        self.put(w)?;
        w.write_all(&[REDUCE])?;
        self.put(w)?;

        w.write_all(&[MARK])?;
        self.binint(w, 1)?;
        self.binint(w, rows as i32)?;
        w.write_all(&[TUPLE1])?;
        self.put(w)?;

        self.global(w, "numpy", "dtype")?;
        self.binunicode(w, "O8")?;
        w.write_all(&[NEWFALSE, NEWTRUE, TUPLE3])?;
        self.put(w)?;
        w.write_all(&[REDUCE])?;
        self.put(w)?;

        w.write_all(&[MARK])?;
        self.binint(w, 3)?;
        self.binunicode(w, "|")?;
        w.write_all(&[NONE, NONE, NONE])?;
        self.binint(w, -1)?;
        self.binint(w, -1)?;
        self.binint(w, 63)?;
        w.write_all(&[TUPLE])?;
        self.put(w)?;
        w.write_all(&[BUILD, NEWFALSE, EMPTY_LIST])?;
        self.put(w)?;

        if rows > 0 {
            w.write_all(&[MARK])?;
        }
        Ok(())
    }

    /// One element of the object array.
    pub fn write_value<W: Write>(&mut self, w: &mut W, value: &Value) -> Result<()> {
        match value {
            Value::None => {
                w.write_all(&[NONE])?;
            }
            Value::Bool(true) => {
                w.write_all(&[NEWTRUE])?;
            }
            Value::Bool(false) => {
                w.write_all(&[NEWFALSE])?;
            }
            Value::Int(v) => self.write_int(w, *v)?,
            Value::Float(v) => {
                w.write_all(&[BINFLOAT])?;
                w.write_all(&v.to_be_bytes())?;
            }
            Value::Str(v) => self.binunicode(w, v)?,
            Value::Date(date) => {
                self.global(w, "datetime", "date")?;
                let year = date.year() as u16;
                self.short_binbytes(
                    w,
                    &[
                        (year >> 8) as u8,
                        (year & 0xFF) as u8,
                        date.month() as u8,
                        date.day() as u8,
                    ],
                )?;
                w.write_all(&[TUPLE1])?;
                self.put(w)?;
                w.write_all(&[REDUCE])?;
                self.put(w)?;
            }
            Value::Time(time) => self.write_time(w, time)?,
            Value::DateTime(dt) => {
                self.global(w, "datetime", "datetime")?;
                let year = dt.year() as u16;
                let micros = dt.nanosecond() / 1_000;
                self.short_binbytes(
                    w,
                    &[
                        (year >> 8) as u8,
                        (year & 0xFF) as u8,
                        dt.month() as u8,
                        dt.day() as u8,
                        dt.hour() as u8,
                        dt.minute() as u8,
                        dt.second() as u8,
                        (micros >> 16) as u8,
                        (micros >> 8) as u8,
                        micros as u8,
                    ],
                )?;
                w.write_all(&[TUPLE1])?;
                self.put(w)?;
                w.write_all(&[REDUCE])?;
                self.put(w)?;
            }
        }
        Ok(())
    }

    /// After the elements: close the list, the state tuple, and the stream.
    pub fn write_suffix<W: Write>(&mut self, w: &mut W, rows: usize) -> Result<()> {
        if rows > 0 {
            w.write_all(&[APPENDS])?;
        }
        w.write_all(&[TUPLE])?;
        self.put(w)?;
        w.write_all(&[BUILD, STOP])?;
        Ok(())
    }

    fn write_int<W: Write>(&self, w: &mut W, value: i64) -> Result<()> {
        if (0..=255).contains(&value) {
            w.write_all(&[BININT1, value as u8])?;
        } else if (256..=65535).contains(&value) {
            w.write_all(&[BININT2])?;
            w.write_all(&(value as u16).to_le_bytes())?;
        } else if let Ok(v) = i32::try_from(value) {
            self.binint(w, v)?;
        } else {
            // Shortest two's-complement little-endian representation.
            let bytes = value.to_le_bytes();
            let mut len = bytes.len();
            while len > 1 {
                let last = bytes[len - 1];
                let prev_sign = bytes[len - 2] & 0x80;
                if (last == 0 && prev_sign == 0) || (last == 0xFF && prev_sign != 0) {
                    len -= 1;
                } else {
                    break;
                }
            }
            w.write_all(&[LONG1, len as u8])?;
            w.write_all(&bytes[..len])?;
        }
        Ok(())
    }

    fn write_time<W: Write>(&mut self, w: &mut W, time: &TimeValue) -> Result<()> {
        self.global(w, "datetime", "time")?;
        let micros = time.time.nanosecond() / 1_000;
        self.short_binbytes(
            w,
            &[
                time.time.hour() as u8,
                time.time.minute() as u8,
                time.time.second() as u8,
                (micros >> 16) as u8,
                (micros >> 8) as u8,
                micros as u8,
            ],
        )?;
        match time.offset {
            None => {
                w.write_all(&[TUPLE1])?;
                self.put(w)?;
            }
            Some(offset) => {
                self.global(w, "datetime", "timezone")?;
                self.global(w, "datetime", "timedelta")?;
                let (days, secs, micros) = normalize_timedelta(offset.micros);
                self.binint(w, days)?;
                self.binint(w, secs)?;
                self.binint(w, micros)?;
                w.write_all(&[TUPLE3])?;
                self.put(w)?;
                w.write_all(&[REDUCE])?;
                self.put(w)?;
                w.write_all(&[TUPLE1])?;
                self.put(w)?;
                w.write_all(&[REDUCE])?;
                self.put(w)?;
                w.write_all(&[TUPLE2])?;
                self.put(w)?;
            }
        }
        w.write_all(&[REDUCE])?;
        self.put(w)?;
        Ok(())
    }
}

/// Python-style timedelta normalization: days may be negative, seconds in
/// `[0, 86400)`, microseconds in `[0, 1e6)`.
fn normalize_timedelta(total_micros: i64) -> (i32, i32, i32) {
    let days = total_micros.div_euclid(MICROS_PER_DAY);
    let rem = total_micros.rem_euclid(MICROS_PER_DAY);
    ((days as i32), (rem / 1_000_000) as i32, (rem % 1_000_000) as i32)
}
