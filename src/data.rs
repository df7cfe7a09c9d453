//! Scalar values and the parsers behind type inference.
//!
//! This module owns the [`Value`] enum (one variant per storable scalar),
//! the canonical null-token set, the closed date/datetime format lists, and
//! the hand-written time sub-parser. Dates and datetimes go through `chrono`
//! format lists; times never do, since their grammar includes fractional
//! seconds and UTC offsets that locale-driven parsing would mangle.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Strings mapped to the null object. Matching is exact, not trimmed.
pub const NULL_TOKENS: &[&str] = &["", "null", "Null", "NULL", "#N/A", "#n/a", "None"];

/// Year-month-day and day-month-year patterns. A leading `!` means
/// "replace `.` with `-` in the candidate before matching".
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y %m %d",
    "!%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d %m %Y",
    "!%d-%m-%Y",
];

/// Month-day-year patterns (the US convention).
pub const DATE_US_FORMATS: &[&str] = &[
    "%m-%d-%Y",
    "%m/%d/%Y",
    "%m %d %Y",
    "!%m-%d-%Y",
];

/// UTC offset attached to a parsed time, in signed microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TzOffset {
    pub micros: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeValue {
    pub time: NaiveTime,
    pub offset: Option<TzOffset>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(TimeValue),
    DateTime(NaiveDateTime),
    Str(String),
}

pub fn is_null_token(value: &str) -> bool {
    NULL_TOKENS.contains(&value)
}

pub fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub fn parse_int(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

/// Decimal or scientific notation only: `inf`, `nan`, and hex floats are
/// rejected before `f64` parsing ever sees them.
pub fn parse_float(value: &str) -> Option<f64> {
    if value.is_empty()
        || !value
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    value.parse::<f64>().ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_date_with(value, DATE_FORMATS)
}

pub fn parse_date_us(value: &str) -> Option<NaiveDate> {
    parse_date_with(value, DATE_US_FORMATS)
}

fn parse_date_with(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    for fmt in formats {
        let parsed = match fmt.strip_prefix('!') {
            Some(fmt) => NaiveDate::parse_from_str(&value.replace('.', "-"), fmt),
            None => NaiveDate::parse_from_str(value, fmt),
        };
        if let Ok(date) = parsed {
            return Some(date);
        }
    }
    None
}

/// `HH:MM[:SS[.ffffff]][±HH:MM[:SS[.ffffff]]]`. The first colon is
/// mandatory; a bare hour would shadow every one- and two-digit integer.
pub fn parse_time(value: &str) -> Option<TimeValue> {
    let mut cursor = Cursor::new(value);
    let hh = cursor.digits(1, 2)?;
    cursor.eat(b':')?;
    let mm = cursor.digits(1, 2)?;
    let mut ss = 0;
    let mut micros = 0;
    if cursor.eat(b':').is_some() {
        ss = cursor.digits(1, 2)?;
        if cursor.eat(b'.').is_some() {
            micros = cursor.fraction_micros()?;
        }
    }
    let offset = match cursor.peek() {
        Some(b'+') | Some(b'-') => Some(parse_offset(&mut cursor)?),
        _ => None,
    };
    if !cursor.done() {
        return None;
    }
    if hh > 23 || mm > 59 || ss > 59 {
        return None;
    }
    let time = NaiveTime::from_hms_micro_opt(hh, mm, ss, micros)?;
    Some(TimeValue { time, offset })
}

fn parse_offset(cursor: &mut Cursor<'_>) -> Option<TzOffset> {
    let sign: i64 = match cursor.next()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hh = cursor.digits(1, 2)? as i64;
    cursor.eat(b':')?;
    let mm = cursor.digits(1, 2)? as i64;
    let mut ss = 0i64;
    let mut micros = 0i64;
    if cursor.eat(b':').is_some() {
        ss = cursor.digits(1, 2)? as i64;
        if cursor.eat(b'.').is_some() {
            micros = cursor.fraction_micros()? as i64;
        }
    }
    if hh > 23 || mm > 59 || ss > 59 {
        return None;
    }
    let total = sign * (((hh * 60 + mm) * 60 + ss) * 1_000_000 + micros);
    Some(TzOffset { micros: total })
}

pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    parse_datetime_with(value, parse_date)
}

pub fn parse_datetime_us(value: &str) -> Option<NaiveDateTime> {
    parse_datetime_with(value, parse_date_us)
}

/// A datetime is a date, a single `space` or `T` separator, and an
/// offset-free time. Every separator position is tried because the space
/// date patterns contain spaces themselves.
fn parse_datetime_with(
    value: &str,
    date_parser: fn(&str) -> Option<NaiveDate>,
) -> Option<NaiveDateTime> {
    for (index, ch) in value.char_indices() {
        if ch != ' ' && ch != 'T' {
            continue;
        }
        let (left, right) = (&value[..index], &value[index + 1..]);
        if let (Some(date), Some(time)) = (date_parser(left), parse_time(right))
            && time.offset.is_none()
        {
            return Some(date.and_time(time.time));
        }
    }
    None
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(value: &'a str) -> Self {
        Self {
            bytes: value.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> Option<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn digits(&mut self, min: usize, max: usize) -> Option<u32> {
        let start = self.pos;
        while self.pos - start < max && self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let count = self.pos - start;
        if count < min {
            return None;
        }
        let mut out = 0u32;
        for b in &self.bytes[start..self.pos] {
            out = out * 10 + (b - b'0') as u32;
        }
        Some(out)
    }

    /// One to six fractional digits, right-padded to microseconds.
    fn fraction_micros(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.pos - start < 6 && self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let count = self.pos - start;
        if count == 0 {
            return None;
        }
        let mut out = 0u32;
        for b in &self.bytes[start..self.pos] {
            out = out * 10 + (b - b'0') as u32;
        }
        Some(out * 10u32.pow((6 - count) as u32))
    }

    fn done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
