//! The System: console, importer table, std namespace.
//!
//! Nothing here is process-global. A `System` is created by the host,
//! shared by every program it runs; a `SourceState` carries the per-file
//! state threaded through scanning, analysis and evaluation.

use std::cell::RefCell;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::context::Context;
use crate::error::Result;
use crate::symbol::Symbol;
use crate::types::record::{DirRecordData, DirSlot};
use crate::value::{RefValue, Value};

/// Where warnings and `print` output go.
pub trait Console {
    fn write(&mut self, text: &str);
}

/// The default console: standard error.
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&mut self, text: &str) {
        let _ = std::io::stderr().write_all(text.as_bytes());
    }
}

/// Captures console output; used by tests.
#[derive(Default)]
pub struct CollectConsole {
    pub text: String,
}

impl Console for CollectConsole {
    fn write(&mut self, text: &str) {
        self.text.push_str(text);
    }
}

/// Discards console output.
pub struct NoConsole;

impl Console for NoConsole {
    fn write(&mut self, _text: &str) {}
}

/// An importer converts a file into a value. Keyed in the importer table by
/// lowercase file extension including the leading dot; the empty string is
/// the directory importer.
pub type Importer = fn(&Path, &SourceState, &dyn Context) -> Result<Value>;

pub struct System {
    console: RefCell<Box<dyn Console>>,
    pub importers: AHashMap<String, Importer>,
    pub std_namespace: AHashMap<Symbol, Value>,
}

impl System {
    pub fn new() -> Rc<Self> {
        Self::with_console(Box::new(StdConsole))
    }

    pub fn with_console(console: Box<dyn Console>) -> Rc<Self> {
        let mut importers: AHashMap<String, Importer> = AHashMap::new();
        importers.insert(".curv".to_string(), crate::program::import_curv_file);
        importers.insert(String::new(), import_directory);
        Rc::new(Self {
            console: RefCell::new(console),
            importers,
            std_namespace: crate::builtins::std_namespace(),
        })
    }

    pub fn console_write(&self, text: &str) {
        self.console.borrow_mut().write(text);
    }

    /// Print a deprecation or user warning; evaluation continues.
    pub fn warning(&self, msg: &str) {
        self.console_write(&format!("WARNING: {msg}\n"));
    }
}

/// Per-source-file state shared by the scanner, parser, analyser and
/// evaluator, which borrow it in sequence.
pub struct SourceState {
    pub system: Rc<System>,
    /// The path of the file being processed, used to resolve relative
    /// `file` imports. None for command-line expressions.
    pub file_path: Option<PathBuf>,
    /// Files currently being imported, for cycle detection. Shared with
    /// the nested source states created by imports.
    pub active_files: Rc<RefCell<AHashSet<PathBuf>>>,
}

impl SourceState {
    pub fn new(system: Rc<System>, file_path: Option<PathBuf>) -> Rc<Self> {
        Rc::new(Self {
            system,
            file_path,
            active_files: Rc::new(RefCell::new(AHashSet::new())),
        })
    }

    /// The source state for a file imported while processing this one.
    pub fn nested(&self, file_path: PathBuf) -> Rc<Self> {
        Rc::new(Self {
            system: Rc::clone(&self.system),
            file_path: Some(file_path),
            active_files: Rc::clone(&self.active_files),
        })
    }

    /// Resolve a path mentioned in this source against its directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.file_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Import a file through the importer table, with cycle detection.
    pub fn import_file(&self, path: &Path, cx: &dyn Context) -> Result<Value> {
        let canonical = path
            .canonicalize()
            .map_err(|e| cx.error(format!("\"{}\": {e}", path.display())))?;
        if !self.active_files.borrow_mut().insert(canonical.clone()) {
            return Err(cx.error(format!(
                "\"{}\": illegal recursive file reference",
                canonical.display()
            )));
        }
        let ext = if canonical.is_dir() {
            String::new()
        } else {
            canonical
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default()
        };
        let result = match self.system.importers.get(&ext) {
            Some(importer) => importer(&canonical, self, cx),
            None => Err(cx.error(format!(
                "\"{}\": unsupported file type",
                canonical.display()
            ))),
        };
        self.active_files.borrow_mut().remove(&canonical);
        result
    }
}

/// The directory importer: present a directory as a record whose fields
/// are its importable children, loaded on first access.
fn import_directory(path: &Path, _sstate: &SourceState, cx: &dyn Context) -> Result<Value> {
    let entries = std::fs::read_dir(path)
        .map_err(|e| cx.error(format!("\"{}\": {e}", path.display())))?;
    let mut fields: IndexMap<Symbol, DirSlot> = IndexMap::new();
    let mut names: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| cx.error(format!("\"{}\": {e}", path.display())))?;
        let child = entry.path();
        let stem = if child.is_dir() {
            child.file_name().map(|n| n.to_string_lossy().into_owned())
        } else {
            child.file_stem().map(|n| n.to_string_lossy().into_owned())
        };
        if let Some(stem) = stem
            && !stem.starts_with('.')
        {
            names.push((stem, child));
        }
    }
    names.sort();
    for (stem, child) in names {
        fields.insert(Symbol::new(&stem), DirSlot::Pending(child));
    }
    Ok(Value::Ref(Rc::new(RefValue::DirRecord(Rc::new(
        DirRecordData {
            path: path.to_path_buf(),
            fields: RefCell::new(fields),
        },
    )))))
}
