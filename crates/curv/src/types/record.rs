//! Record kinds: dynamic records, modules, directory records.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::Result;
use crate::symbol::Symbol;
use crate::system::SourceState;
use crate::types::function::{Closure, Function};
use crate::value::{RefValue, Ternary, Value};

/// A dynamic record: an insertion-ordered map from symbol to value.
pub type DRecord = IndexMap<Symbol, Value>;

/// A module value: a slot array plus a dictionary shared by every instance
/// of the same module literal.
///
/// Slots holding a raw `Lambda` are wrapped into a `Closure` with this
/// module as nonlocals each time they are read. Storing the closure itself
/// would create a reference cycle from the slot array back to the module;
/// storing the lambda keeps ownership acyclic and gives the recursive-module
/// semantics for free.
#[derive(Debug)]
pub struct ModuleData {
    pub dict: Rc<IndexMap<Symbol, usize>>,
    pub slots: RefCell<Vec<Value>>,
}

impl ModuleData {
    pub fn new(dict: Rc<IndexMap<Symbol, usize>>, nslots: usize) -> Rc<Self> {
        Rc::new(Self {
            dict,
            slots: RefCell::new(vec![Value::Missing; nslots]),
        })
    }

    pub fn size(&self) -> usize {
        self.dict.len()
    }
}

/// Fetch the contents of a module slot, normalised to a proper value.
pub fn module_get(module: &Rc<ModuleData>, slot: usize) -> Value {
    let raw = module.slots.borrow()[slot].clone();
    match &raw {
        Value::Ref(r) => match &**r {
            RefValue::Lambda(lambda) => Value::Ref(Rc::new(RefValue::Function(
                Function::Closure(Closure::from_lambda(lambda, Rc::clone(module))),
            ))),
            _ => raw,
        },
        _ => raw,
    }
}

pub fn module_field(module: &Rc<ModuleData>, name: &Symbol, cx: &dyn Context) -> Result<Value> {
    match module.dict.get(name) {
        Some(&slot) => Ok(module_get(module, slot)),
        None => Err(cx.error(format!(".{name}: not defined"))),
    }
}

/// A filesystem directory presented as a record. Children are imported on
/// demand through the importer table, so field access can fail.
#[derive(Debug)]
pub struct DirRecordData {
    pub path: PathBuf,
    pub fields: RefCell<IndexMap<Symbol, DirSlot>>,
}

#[derive(Debug, Clone)]
pub enum DirSlot {
    Pending(PathBuf),
    Ready(Value),
}

pub fn dir_record_field(
    dir: &Rc<DirRecordData>,
    name: &Symbol,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let slot = dir.fields.borrow().get(name).cloned();
    match slot {
        None => Err(cx.error(format!(".{name}: not defined"))),
        Some(DirSlot::Ready(v)) => Ok(v),
        Some(DirSlot::Pending(path)) => {
            let value = sstate.import_file(&path, cx)?;
            dir.fields
                .borrow_mut()
                .insert(name.clone(), DirSlot::Ready(value.clone()));
            Ok(value)
        }
    }
}

/// Field access over any record kind.
pub fn record_field(
    rec: &Rc<RefValue>,
    name: &Symbol,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    match &**rec {
        RefValue::Record(fields) => match fields.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(cx.error(format!(".{name}: not defined"))),
        },
        RefValue::Module(module) => module_field(module, name, cx),
        RefValue::DirRecord(dir) => dir_record_field(dir, name, sstate, cx),
        _ => Err(cx.error(format!("{}: not a record", Value::Ref(Rc::clone(rec))))),
    }
}

pub fn record_has_field(rec: &RefValue, name: &Symbol) -> bool {
    match rec {
        RefValue::Record(fields) => fields.contains_key(name),
        RefValue::Module(module) => module.dict.contains_key(name),
        RefValue::DirRecord(dir) => dir.fields.borrow().contains_key(name),
        _ => false,
    }
}

pub fn record_size(rec: &RefValue) -> usize {
    match rec {
        RefValue::Record(fields) => fields.len(),
        RefValue::Module(module) => module.size(),
        RefValue::DirRecord(dir) => dir.fields.borrow().len(),
        _ => 0,
    }
}

/// The field names of a record, in insertion order.
pub fn record_field_names(rec: &RefValue) -> Vec<Symbol> {
    match rec {
        RefValue::Record(fields) => fields.keys().cloned().collect(),
        RefValue::Module(module) => module.dict.keys().cloned().collect(),
        RefValue::DirRecord(dir) => dir.fields.borrow().keys().cloned().collect(),
        _ => Vec::new(),
    }
}

pub fn module_fields(module: &Rc<ModuleData>) -> Vec<(Symbol, Value)> {
    module
        .dict
        .iter()
        .map(|(k, &slot)| (k.clone(), module_get(module, slot)))
        .collect()
}

/// Structural record equality: same field sets, equal field values.
/// Traversal is by key order so the result does not depend on insertion
/// order.
pub fn records_equal(a: &Rc<RefValue>, b: &Rc<RefValue>, cx: &dyn Context) -> Result<Ternary> {
    // Directory-record equality compares pathnames and was handled before
    // we get here; a dir record never equals another record kind.
    if matches!(&**a, RefValue::DirRecord(_)) || matches!(&**b, RefValue::DirRecord(_)) {
        return Ok(Ternary::False);
    }
    let fields_of = |r: &Rc<RefValue>| -> Vec<(Symbol, Value)> {
        match &**r {
            RefValue::Module(m) => module_fields(m),
            RefValue::Record(fields) => {
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            _ => Vec::new(),
        }
    };
    let mut fa = fields_of(a);
    let mut fb = fields_of(b);
    if fa.len() != fb.len() {
        return Ok(Ternary::False);
    }
    fa.sort_by(|x, y| x.0.cmp(&y.0));
    fb.sort_by(|x, y| x.0.cmp(&y.0));
    let mut acc = Ternary::True;
    for ((ka, va), (kb, vb)) in fa.iter().zip(fb.iter()) {
        if ka != kb {
            return Ok(Ternary::False);
        }
        acc = acc.and(va.equal(vb, cx)?);
        if acc == Ternary::False {
            return Ok(acc);
        }
    }
    Ok(acc)
}

/// Promote any record kind to a drecord for amendment; the copy-on-write
/// step of `tree_amend` on records.
pub fn update_drecord(rec: &Value, sstate: &SourceState, cx: &dyn Context) -> Result<DRecord> {
    let Value::Ref(r) = rec else {
        return Err(cx.error(format!("{rec}: not a record")));
    };
    match &**r {
        RefValue::Record(fields) => Ok(fields.clone()),
        RefValue::Module(module) => Ok(module_fields(module).into_iter().collect()),
        RefValue::DirRecord(dir) => {
            let names = record_field_names(r);
            let mut out = DRecord::new();
            for name in names {
                let v = dir_record_field(dir, &name, sstate, cx)?;
                out.insert(name, v);
            }
            Ok(out)
        }
        _ => Err(cx.error(format!("{rec}: not a record"))),
    }
}
