//! Self-contained work units and the two-pass slice processor.
//!
//! A [`Task`] owns one contiguous record range of the source file and a
//! disjoint set of destination page paths, so any number of tasks can run
//! in independent processes with no coordination. Execution is two passes
//! over the same byte range: pass 1 classifies every value and measures
//! string widths, pass 2 re-reads the range and materializes one typed page
//! per column.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, is_null_token, parse_float, parse_int},
    dialect::Dialect,
    encoding::{EncodedReader, TextEncoding},
    error::ImportError,
    infer::{DataType, PageType, RankCounter, code_point_len},
    page::Page,
    parser::Tokenizer,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub source: PathBuf,
    pub encoding: TextEncoding,
    pub dialect: Dialect,
    /// Destination page per kept column, in output-column order.
    pub pages: Vec<PathBuf>,
    /// Source field index feeding each destination, same order as `pages`.
    pub import_fields: Vec<usize>,
    /// Byte offset of the first record of the slice.
    pub offset: u64,
    /// Nominal record count; the processor stops early at end of file.
    pub rows: usize,
    pub guess_dtypes: bool,
}

impl Task {
    /// Argument vector reproducing this task as a worker invocation.
    pub fn to_command_args(&self) -> Vec<String> {
        let mut args = vec!["--encoding".to_string(), self.encoding.as_str().to_string()];
        args.extend(self.dialect.to_args());
        if self.guess_dtypes {
            args.push("--guess-dtypes".to_string());
        }
        args.push("task".to_string());
        args.push("--pages".to_string());
        args.push(
            self.pages
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(","),
        );
        args.push("--fields".to_string());
        args.push(
            self.import_fields
                .iter()
                .map(|ix| ix.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        args.push(self.source.to_string_lossy().into_owned());
        args.push(self.offset.to_string());
        args.push(self.rows.to_string());
        args
    }
}

/// Runs one task to completion: every listed page exists and holds exactly
/// the rows of the slice, or the error leaves no page finalized.
pub fn execute(task: &Task) -> Result<()> {
    let columns = task.pages.len();
    debug_assert_eq!(columns, task.import_fields.len());

    let mut reader = EncodedReader::open(&task.source, task.encoding)
        .with_context(|| format!("Opening {:?} for slice at offset {}", task.source, task.offset))?;
    let mut tokenizer = Tokenizer::new(task.dialect);

    // Pass 1: collect ranks and code-point widths.
    reader.seek(task.offset)?;
    let mut longest = vec![0usize; columns];
    let mut ranks: Vec<RankCounter> = if task.guess_dtypes {
        vec![RankCounter::new(); columns]
    } else {
        Vec::new()
    };
    let mut n_rows = 0usize;
    while n_rows < task.rows && tokenizer.read_record(&mut reader)? {
        for (slot, &fidx) in task.import_fields.iter().enumerate() {
            let field = tokenizer
                .fields()
                .get(fidx)
                .map(String::as_str)
                .unwrap_or("");
            if task.guess_dtypes {
                let dtype = ranks[slot].update(field);
                if dtype == DataType::Str {
                    longest[slot] = longest[slot].max(code_point_len(field));
                }
            } else {
                longest[slot] = longest[slot].max(code_point_len(field));
            }
        }
        n_rows += 1;
    }

    // Choose page types and write headers.
    let mut page_types = vec![PageType::Unicode; columns];
    if task.guess_dtypes {
        for (slot, rank) in ranks.iter_mut().enumerate() {
            page_types[slot] = rank.select_page_type();
        }
    }
    let mut pages = Vec::with_capacity(columns);
    for (slot, path) in task.pages.iter().enumerate() {
        debug!(
            "Page {:?}: {} rows as {}",
            path,
            n_rows,
            page_types[slot].name()
        );
        pages.push(Page::create(path, page_types[slot], n_rows, longest[slot])?);
    }

    // Pass 2: re-read the same range and dump typed bodies.
    reader.seek(task.offset)?;
    for _ in 0..n_rows {
        if !tokenizer.read_record(&mut reader)? {
            return Err(ImportError::Integrity {
                value: format!("record range at offset {}", task.offset),
                dtype: "slice",
            }
            .into());
        }
        for (slot, &fidx) in task.import_fields.iter().enumerate() {
            let field = tokenizer
                .fields()
                .get(fidx)
                .map(String::as_str)
                .unwrap_or("");
            write_field(&mut pages[slot], page_types[slot], field, ranks.get(slot))?;
        }
    }

    for page in pages {
        page.finalize()?;
    }
    Ok(())
}

fn write_field(
    page: &mut Page,
    page_type: PageType,
    field: &str,
    rank: Option<&RankCounter>,
) -> Result<()> {
    match page_type {
        PageType::Unset | PageType::Unicode => page.write_unicode(field),
        PageType::Int64 => {
            let value = parse_int(field).ok_or_else(|| ImportError::Integrity {
                value: field.to_string(),
                dtype: "int64",
            })?;
            page.write_int(value)
        }
        PageType::Float64 => {
            let value = parse_float(field).ok_or_else(|| ImportError::Integrity {
                value: field.to_string(),
                dtype: "float64",
            })?;
            page.write_float(value)
        }
        PageType::Bool => page.write_bool_token(field),
        PageType::Object => {
            if is_null_token(field) {
                return page.write_object(&Value::None);
            }
            let value = match rank {
                Some(rank) => rank.parse_ranked(field),
                None => Value::Str(field.to_string()),
            };
            page.write_object(&value)
        }
    }
}
