//! Tokenizer configuration: delimiter, quoting, and escape behavior.
//!
//! A [`Dialect`] is an immutable value handed to the parser; nothing in the
//! pipeline consults process-wide state. The quoting mode only changes
//! tokenization for [`Quoting::None`] (quote characters become ordinary
//! data); the remaining modes are carried for writers and the plan manifest.

use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

pub const DEFAULT_CSV_DELIMITER: char = ',';
pub const DEFAULT_TSV_DELIMITER: char = '\t';

/// Extension-based delimiter default (`.tsv` reads as tab-separated),
/// overridden by an explicit flag.
pub fn resolve_input_delimiter(path: &Path, provided: Option<char>) -> char {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quoting {
    Minimal,
    All,
    NonNumeric,
    None,
    Strings,
    NotNull,
}

impl Quoting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quoting::Minimal => "QUOTE_MINIMAL",
            Quoting::All => "QUOTE_ALL",
            Quoting::NonNumeric => "QUOTE_NONNUMERIC",
            Quoting::None => "QUOTE_NONE",
            Quoting::Strings => "QUOTE_STRINGS",
            Quoting::NotNull => "QUOTE_NOTNULL",
        }
    }
}

impl FromStr for Quoting {
    type Err = ImportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let token = normalized.strip_prefix("QUOTE_").unwrap_or(&normalized);
        match token {
            "MINIMAL" => Ok(Quoting::Minimal),
            "ALL" => Ok(Quoting::All),
            "NONNUMERIC" => Ok(Quoting::NonNumeric),
            "NONE" => Ok(Quoting::None),
            "STRINGS" => Ok(Quoting::Strings),
            "NOTNULL" => Ok(Quoting::NotNull),
            _ => Err(ImportError::UnknownQuoting(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    pub delimiter: char,
    pub quotechar: char,
    pub escapechar: char,
    pub lineterminator: char,
    pub doublequote: bool,
    pub skipinitialspace: bool,
    pub skiptrailingspace: bool,
    pub strict: bool,
    pub quoting: Quoting,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quotechar: '"',
            escapechar: '\\',
            lineterminator: '\n',
            doublequote: true,
            skipinitialspace: false,
            skiptrailingspace: false,
            strict: false,
            quoting: Quoting::Minimal,
        }
    }
}

impl Dialect {
    /// Command-line flags reproducing this dialect on a worker invocation.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--delimiter".to_string(),
            printable_char(self.delimiter),
            "--quotechar".to_string(),
            printable_char(self.quotechar),
            "--escapechar".to_string(),
            printable_char(self.escapechar),
            "--lineterminator".to_string(),
            printable_char(self.lineterminator),
            "--quoting".to_string(),
            self.as_quoting_token(),
        ];
        if !self.doublequote {
            args.push("--no-doublequote".to_string());
        }
        if self.skipinitialspace {
            args.push("--skipinitialspace".to_string());
        }
        if self.skiptrailingspace {
            args.push("--skiptrailingspace".to_string());
        }
        if self.strict {
            args.push("--strict".to_string());
        }
        args
    }

    fn as_quoting_token(&self) -> String {
        self.quoting.as_str().to_string()
    }
}

/// Renders a dialect character the way the CLI accepts it back.
pub fn printable_char(value: char) -> String {
    match value {
        '\t' => "\\t".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        other => other.to_string(),
    }
}

/// Parses a single dialect character, honouring `tab`/`comma` names and the
/// escape spellings `\t`, `\n`, `\r`.
pub fn parse_dialect_char(option: &'static str, value: &str) -> Result<char, ImportError> {
    let resolved = match value {
        "tab" | "\\t" => Some('\t'),
        "comma" => Some(','),
        "pipe" => Some('|'),
        "semicolon" => Some(';'),
        "\\n" => Some('\n'),
        "\\r" => Some('\r'),
        _ => None,
    };
    if let Some(ch) = resolved {
        return Ok(ch);
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(ImportError::BadDialectChar {
            option,
            value: value.to_string(),
        }),
    }
}
