//! The exception type raised by every phase of the pipeline.

use std::fmt;

use serde::Serialize;
use serde_json::json;

use crate::source::SrcLoc;
use crate::symbol::Symbol;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Exception>;

/// Selects between hard failure (raise an [`Exception`]) and soft failure
/// (return missing / `None`) in value conversions and pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Hard,
    Soft,
}

/// One element of a stack trace: the name of the function whose definition
/// lexically encloses the location (if known), and the source location of a
/// call or of the failing phrase itself.
#[derive(Debug, Clone)]
pub struct FuncLoc {
    pub func_name: Option<Symbol>,
    pub srcloc: SrcLoc,
}

impl FuncLoc {
    pub fn new(func_name: Option<Symbol>, srcloc: SrcLoc) -> Self {
        Self { func_name, srcloc }
    }
}

/// An error raised anywhere in the scan/parse/analyse/evaluate pipeline,
/// or by the shape compiler.
///
/// Carries a message and a stack of source locations, innermost first.
/// The message has already been rewritten by the [`Context`] that raised it
/// ("argument #2 of f: ...", "at field .x: ...").
///
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone)]
pub struct Exception {
    message: String,
    locations: Vec<FuncLoc>,
}

impl Exception {
    pub fn new(message: impl Into<String>, locations: Vec<FuncLoc>) -> Self {
        Self {
            message: message.into(),
            locations,
        }
    }

    /// An exception with no location information. Used only at the driver
    /// boundary (I/O failures before any source exists).
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn locations(&self) -> &[FuncLoc] {
        &self.locations
    }

    /// Render the error as the JSON object used by the external API:
    /// `{"error": {"message": ..., "location": [...]}}`.
    pub fn to_json(&self) -> serde_json::Value {
        #[derive(Serialize)]
        struct Position {
            line: u32,
            column: u32,
        }
        #[derive(Serialize)]
        struct Location<'a> {
            file: &'a str,
            function: Option<String>,
            start: Position,
            end: Position,
        }
        let locs: Vec<Location<'_>> = self
            .locations
            .iter()
            .map(|fl| {
                let info = fl.srcloc.line_info();
                Location {
                    file: fl.srcloc.source().name.as_str(),
                    function: fl.func_name.as_ref().map(Symbol::to_string),
                    start: Position {
                        line: info.start_line_num,
                        column: info.start_column_num,
                    },
                    end: Position {
                        line: info.end_line_num,
                        column: info.end_column_num,
                    },
                }
            })
            .collect();
        json!({"error": {
            "message": self.message,
            "location": serde_json::to_value(locs).unwrap_or_default(),
        }})
    }
}

impl fmt::Display for Exception {
    /// The human-readable multiline trace: message first, then each stack
    /// location with its underlined source line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.message)?;
        for fl in &self.locations {
            let mut buf = String::new();
            if fl.srcloc.write_underlined(&mut buf).is_ok() {
                write!(f, "\n{buf}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

/// The diagnostic used when the scanner meets a byte it cannot accept.
pub fn illegal_character_message(ch: u8) -> String {
    if ch.is_ascii_graphic() {
        format!("illegal character '{}'", ch as char)
    } else {
        format!("illegal character 0x{ch:02X}")
    }
}
