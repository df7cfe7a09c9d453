//! Character-driven CSV tokenizer.
//!
//! The tokenizer consumes one decoded line at a time, appends a synthetic
//! `\n`, then feeds a trailing EOL sentinel (a value outside the code-point
//! range) so the state machine can distinguish "line exhausted" from real
//! newline characters. A record normally completes on the sentinel; a quoted
//! field that is still open swallows the sentinel and continues on the next
//! physical line, which is how multi-line quoted fields work.
//!
//! Field storage is reused across records: completed fields land in a
//! recycled `Vec<String>` and only the first [`Tokenizer::field_count`]
//! entries are meaningful. Callers that retain values must copy them.

use anyhow::Result;

use crate::{
    dialect::{Dialect, Quoting},
    encoding::EncodedReader,
    error::{ImportError, MAX_FIELD_BYTES},
};

/// Reserved value distinct from every Unicode scalar.
const EOL_SENTINEL: u32 = 0x11_0000;

const INITIAL_FIELD_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartRecord,
    StartField,
    EscapedChar,
    InField,
    InQuotedField,
    EscapeInQuotedField,
    QuoteInQuotedField,
    EatCrnl,
    AfterEscapedCrnl,
}

pub struct Tokenizer {
    dialect: Dialect,
    state: State,
    field: String,
    fields: Vec<String>,
    field_count: usize,
    numeric_pending: bool,
    record_complete: bool,
    records_read: usize,
    line: String,
}

impl Tokenizer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: State::StartRecord,
            field: String::with_capacity(INITIAL_FIELD_CAPACITY),
            fields: Vec::new(),
            field_count: 0,
            numeric_pending: false,
            record_complete: false,
            records_read: 0,
            line: String::new(),
        }
    }

    /// Completed fields of the most recent record.
    pub fn fields(&self) -> &[String] {
        &self.fields[..self.field_count]
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Zero-based index of the most recently completed record.
    pub fn record_index(&self) -> usize {
        self.records_read.saturating_sub(1)
    }

    /// Whether the current field began unquoted under NONNUMERIC quoting.
    /// Carried for writers; tokenization output does not depend on it.
    pub fn numeric_pending(&self) -> bool {
        self.numeric_pending
    }

    /// Reads the next logical record from `reader`. Returns `false` at end
    /// of file. Physical lines are pulled until the state machine completes
    /// a record, so quoted fields may span any number of lines.
    pub fn read_record(&mut self, reader: &mut EncodedReader) -> Result<bool> {
        self.begin_record();
        let mut line = std::mem::take(&mut self.line);
        loop {
            let found = reader.read_line(&mut line)?;
            if !found {
                self.line = line;
                return Ok(self.finish_at_eof()?);
            }
            match self.feed_line(&line) {
                Ok(true) => {
                    self.line = line;
                    return Ok(true);
                }
                Ok(false) => continue,
                Err(err) => {
                    self.line = line;
                    return Err(err.into());
                }
            }
        }
    }

    /// Feeds one physical line (without its terminator) plus the synthetic
    /// newline and the EOL sentinel. Returns `true` when a record completed;
    /// the next call starts a fresh record.
    pub fn feed_line(&mut self, line: &str) -> Result<bool, ImportError> {
        if self.record_complete {
            self.begin_record();
        }
        for ch in line.chars() {
            self.process(ch as u32)?;
        }
        self.process('\n' as u32)?;
        let complete = self.process(EOL_SENTINEL)?;
        if complete {
            self.record_complete = true;
            self.records_read += 1;
        }
        Ok(complete)
    }

    fn begin_record(&mut self) {
        self.state = State::StartRecord;
        self.field_count = 0;
        self.field.clear();
        self.numeric_pending = false;
        self.record_complete = false;
    }

    fn finish_at_eof(&mut self) -> Result<bool, ImportError> {
        match self.state {
            State::StartRecord => Ok(false),
            State::InQuotedField | State::EscapeInQuotedField if self.dialect.strict => {
                Err(ImportError::Strict {
                    record: self.records_read,
                    message: "unexpected end of data inside quoted field".to_string(),
                })
            }
            _ => {
                self.save_field()?;
                self.record_complete = true;
                self.records_read += 1;
                Ok(true)
            }
        }
    }

    fn process(&mut self, c: u32) -> Result<bool, ImportError> {
        let d = self.dialect;
        let quote = d.quotechar as u32;
        let escape = d.escapechar as u32;
        let delim = d.delimiter as u32;

        match self.state {
            State::StartRecord | State::StartField => {
                if c == EOL_SENTINEL {
                    self.state = State::StartRecord;
                    return Ok(true);
                } else if c == '\n' as u32 || c == '\r' as u32 {
                    self.save_field()?;
                    self.state = State::EatCrnl;
                } else if c == quote && d.quoting != Quoting::None {
                    self.state = State::InQuotedField;
                } else if c == escape {
                    self.state = State::EscapedChar;
                } else if c == ' ' as u32 && d.skipinitialspace {
                    self.state = State::StartField;
                } else if c == delim {
                    self.save_field()?;
                    self.state = State::StartField;
                } else {
                    if d.quoting == Quoting::NonNumeric {
                        self.numeric_pending = true;
                    }
                    self.append(c)?;
                    self.state = State::InField;
                }
            }
            State::EscapedChar => {
                if c == '\n' as u32 || c == '\r' as u32 {
                    self.append(c)?;
                    self.state = State::AfterEscapedCrnl;
                } else {
                    let c = if c == EOL_SENTINEL { '\n' as u32 } else { c };
                    self.append(c)?;
                    self.state = State::InField;
                }
            }
            State::AfterEscapedCrnl => {
                if c == EOL_SENTINEL {
                    // Record continues on the next physical line.
                    return Ok(false);
                }
                self.state = State::InField;
                return self.process_in_field(c);
            }
            State::InField => return self.process_in_field(c),
            State::InQuotedField => {
                if c == EOL_SENTINEL {
                    // Quoted field spans the line break; the synthetic
                    // newline has already been appended as data.
                } else if c == escape {
                    self.state = State::EscapeInQuotedField;
                } else if c == quote && d.quoting != Quoting::None {
                    if d.doublequote {
                        self.state = State::QuoteInQuotedField;
                    } else {
                        self.state = State::InField;
                    }
                } else {
                    self.append(c)?;
                }
            }
            State::EscapeInQuotedField => {
                let c = if c == EOL_SENTINEL { '\n' as u32 } else { c };
                self.append(c)?;
                self.state = State::InQuotedField;
            }
            State::QuoteInQuotedField => {
                if d.quoting != Quoting::None && c == quote {
                    self.append(c)?;
                    self.state = State::InQuotedField;
                } else if c == delim {
                    self.save_field()?;
                    self.state = State::StartField;
                } else if c == EOL_SENTINEL {
                    self.save_field()?;
                    self.state = State::StartRecord;
                    return Ok(true);
                } else if c == '\n' as u32 || c == '\r' as u32 {
                    self.save_field()?;
                    self.state = State::EatCrnl;
                } else if !d.strict {
                    self.append(c)?;
                    self.state = State::InField;
                } else {
                    return Err(ImportError::Strict {
                        record: self.records_read,
                        message: format!(
                            "'{}' expected after '{}'",
                            d.delimiter, d.quotechar
                        ),
                    });
                }
            }
            State::EatCrnl => {
                if c == '\n' as u32 || c == '\r' as u32 {
                    // discard
                } else if c == EOL_SENTINEL {
                    self.state = State::StartRecord;
                    return Ok(true);
                } else {
                    return Err(ImportError::StrayNewline {
                        record: self.records_read,
                    });
                }
            }
        }
        Ok(false)
    }

    fn process_in_field(&mut self, c: u32) -> Result<bool, ImportError> {
        let d = self.dialect;
        if c == EOL_SENTINEL {
            self.save_field()?;
            self.state = State::StartRecord;
            return Ok(true);
        } else if c == '\n' as u32 || c == '\r' as u32 {
            self.save_field()?;
            self.state = State::EatCrnl;
        } else if c == d.escapechar as u32 {
            self.state = State::EscapedChar;
        } else if c == d.delimiter as u32 {
            self.save_field()?;
            self.state = State::StartField;
        } else {
            self.append(c)?;
        }
        Ok(false)
    }

    fn append(&mut self, c: u32) -> Result<(), ImportError> {
        let ch = char::from_u32(c).ok_or_else(|| ImportError::Strict {
            record: self.records_read,
            message: format!("invalid code point {c:#x}"),
        })?;
        if self.field.len() + ch.len_utf8() > MAX_FIELD_BYTES {
            return Err(ImportError::FieldTooLarge {
                record: self.records_read,
            });
        }
        self.field.push(ch);
        Ok(())
    }

    fn save_field(&mut self) -> Result<(), ImportError> {
        if self.dialect.skiptrailingspace {
            let trimmed = self.field.trim_end_matches(' ').len();
            self.field.truncate(trimmed);
        }
        if self.field_count < self.fields.len() {
            let slot = &mut self.fields[self.field_count];
            slot.clear();
            slot.push_str(&self.field);
        } else {
            self.fields.push(self.field.clone());
        }
        self.field_count += 1;
        self.field.clear();
        self.numeric_pending = false;
        Ok(())
    }
}
