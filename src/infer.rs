//! Per-column type inference over an ordered taxonomy.
//!
//! Each column carries a [`RankCounter`]: one slot per [`DataType`], kept
//! sorted by success count with a stable insertion sort, so frequently
//! matching types are tried first on later rows. The taxonomy order encodes
//! "strictest first" for fresh counters; the first parse that succeeds wins
//! the row's contribution. Final page-type selection demotes STRING below
//! every other type that matched at least once, because STRING is a superset
//! of everything.

use crate::data::{
    Value, is_null_token, parse_bool, parse_date, parse_date_us, parse_datetime,
    parse_datetime_us, parse_float, parse_int, parse_time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    None,
    Bool,
    DateTime,
    DateTimeUs,
    Date,
    DateUs,
    Time,
    Int,
    Float,
    Str,
}

/// Trial precedence for a fresh counter.
pub const TAXONOMY: [DataType; 10] = [
    DataType::None,
    DataType::Bool,
    DataType::DateTime,
    DataType::DateTimeUs,
    DataType::Date,
    DataType::DateUs,
    DataType::Time,
    DataType::Int,
    DataType::Float,
    DataType::Str,
];

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::None => "none",
            DataType::Bool => "bool",
            DataType::DateTime => "datetime",
            DataType::DateTimeUs => "datetime_us",
            DataType::Date => "date",
            DataType::DateUs => "date_us",
            DataType::Time => "time",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "string",
        }
    }

    /// Attempts `value` as this type, producing the scalar on success.
    pub fn parse(&self, value: &str) -> Option<Value> {
        match self {
            DataType::None => is_null_token(value).then_some(Value::None),
            DataType::Bool => parse_bool(value).map(Value::Bool),
            DataType::DateTime => parse_datetime(value).map(Value::DateTime),
            DataType::DateTimeUs => parse_datetime_us(value).map(Value::DateTime),
            DataType::Date => parse_date(value).map(Value::Date),
            DataType::DateUs => parse_date_us(value).map(Value::Date),
            DataType::Time => parse_time(value).map(Value::Time),
            DataType::Int => parse_int(value).map(Value::Int),
            DataType::Float => parse_float(value).map(Value::Float),
            DataType::Str => Some(Value::Str(value.to_string())),
        }
    }
}

/// Storage discriminant of a finished page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Unset,
    Unicode,
    Int64,
    Float64,
    Bool,
    Object,
}

impl PageType {
    pub fn name(&self) -> &'static str {
        match self {
            PageType::Unset => "unset",
            PageType::Unicode => "unicode",
            PageType::Int64 => "int64",
            PageType::Float64 => "float64",
            PageType::Bool => "bool",
            PageType::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankCounter {
    entries: [(DataType, usize); TAXONOMY.len()],
}

impl Default for RankCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl RankCounter {
    pub fn new() -> Self {
        let mut entries = [(DataType::None, 0); TAXONOMY.len()];
        for (slot, dtype) in entries.iter_mut().zip(TAXONOMY) {
            slot.0 = dtype;
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[(DataType, usize)] {
        &self.entries
    }

    /// Classifies `value`, increments the winning slot, and bubbles it
    /// toward the front while its count exceeds its predecessor's. Stable:
    /// ties keep their existing order.
    pub fn update(&mut self, value: &str) -> DataType {
        for i in 0..self.entries.len() {
            let dtype = self.entries[i].0;
            if dtype.parse(value).is_some() {
                self.entries[i].1 += 1;
                let mut i = i;
                while i > 0 && self.entries[i].1 > self.entries[i - 1].1 {
                    self.entries.swap(i, i - 1);
                    i -= 1;
                }
                return dtype;
            }
        }
        unreachable!("STRING accepts every value");
    }

    /// Parses `value` in the counter's current order; the STRING entry
    /// guarantees a result. Used by pass 2 for object pages.
    pub fn parse_ranked(&self, value: &str) -> Value {
        for (dtype, _) in &self.entries {
            if let Some(parsed) = dtype.parse(value) {
                return parsed;
            }
        }
        Value::Str(value.to_string())
    }

    /// Re-sorts with STRING demoted below any type that matched at least
    /// once, then folds the non-zero types into the final page type. The
    /// counter is left in the strings-last order so an OBJECT pass 2 tries
    /// typed parses before the STRING fallback.
    pub fn select_page_type(&mut self) -> PageType {
        self.sort_strings_last();
        let mut nonzero = self
            .entries
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(dtype, _)| *dtype);
        let Some(first) = nonzero.next() else {
            return PageType::Unset;
        };
        if first == DataType::Str {
            // Strings-last ordering puts STRING first only when nothing
            // else matched; STRING subsumes every other candidate.
            return PageType::Unicode;
        }
        let mut acc = first;
        for next in nonzero {
            acc = match (acc, next) {
                (DataType::Int, DataType::Float) | (DataType::Float, DataType::Int) => {
                    DataType::Float
                }
                _ => return PageType::Object,
            };
        }
        match acc {
            DataType::Int => PageType::Int64,
            DataType::Float => PageType::Float64,
            DataType::Bool => PageType::Bool,
            _ => PageType::Object,
        }
    }

    fn sort_strings_last(&mut self) {
        self.entries.sort_by(|a, b| {
            if a.0 == DataType::Str && b.0 != DataType::Str && b.1 > 0 {
                std::cmp::Ordering::Greater
            } else if b.0 == DataType::Str && a.0 != DataType::Str && a.1 > 0 {
                std::cmp::Ordering::Less
            } else {
                b.1.cmp(&a.1)
            }
        });
    }
}

/// Length of a value in code points, the unit `<U` widths are measured in.
pub fn code_point_len(value: &str) -> usize {
    value.chars().count()
}
