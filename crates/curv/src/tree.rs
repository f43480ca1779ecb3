//! Polymorphic indexing and amendment over trees.
//!
//! A tree is any nest of lists and records. An index is a number
//! (positional), a symbol (field), a list of indexes (broadcast), or one of
//! the first-class index values `TId`/`TPath`/`TSlice`. Amendment is
//! copy-on-write: the spine is cloned once and subsequent amendments into
//! the clone mutate in place, since ownership is unique by then.

use std::rc::Rc;

use crate::context::{Context, Rewriting};
use crate::error::Result;
use crate::meaning::Operation;
use crate::sc::ty::sc_type_of;
use crate::symbol::Symbol;
use crate::system::SourceState;
use crate::types::index::{IndexValue, make_tslice};
use crate::types::reactive::{Reactive, ReactiveExpr};
use crate::types::record::{record_field, update_drecord};
use crate::value::{RefValue, Value};

fn num_is_int(n: f64) -> bool {
    n.fract() == 0.0 && n.is_finite()
}

/// Index with a boxed slice: the argument of `a[i,j]`, a list applied as a
/// nested path.
pub fn get_value_at_boxed_slice(
    value: &Value,
    slice: &Value,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let Some(view) = slice.list_view() else {
        return Err(cx.error(format!("{slice}: not a list")));
    };
    let items: Vec<Value> = view.iter().collect();
    let index = make_tslice(&items);
    tree_fetch(value, &index, sstate, cx)
}

pub fn tree_fetch(
    tree: &Value,
    index: &Value,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let lcx = while_indexing(tree, index, cx);
    if let Value::Num(num) = index {
        if num_is_int(*num) {
            let i = positional(tree, *num, &lcx)?;
            let view = tree.list_view().expect("positional checked");
            return Ok(view.at(i));
        }
    } else if let Some(sym) = index.maybe_symbol() {
        return fetch_field(tree, &sym.clone(), sstate, &lcx);
    } else if let Value::Ref(r) = index {
        match &**r {
            RefValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for i in items {
                    out.push(tree_fetch(tree, i, sstate, cx)?);
                }
                return Ok(Value::list(out));
            }
            RefValue::Index(IndexValue::TPath(i1, i2)) => {
                let sub = tree_fetch(tree, i1, sstate, cx)?;
                return tree_fetch(&sub, i2, sstate, cx);
            }
            RefValue::Index(IndexValue::TSlice(i1, i2)) => {
                return tree_fetch_slice(tree, i1, i2, sstate, cx);
            }
            RefValue::Index(IndexValue::TId) => return Ok(tree.clone()),
            RefValue::Reactive(re) => {
                if re.sc_type().is_num() {
                    let tree_type = sc_type_of(tree);
                    if tree_type.is_list()
                        && let Some(syntax) = cx.syntax()
                    {
                        let expr = Rc::new(Operation::IndexApp {
                            syntax: Rc::clone(&syntax),
                            base: Rc::new(Operation::Constant {
                                syntax: Rc::clone(&syntax),
                                value: tree.clone(),
                            }),
                            index: re.expr(Rc::clone(&syntax)),
                        });
                        return Ok(Value::Ref(Rc::new(RefValue::Reactive(Reactive::Expr(
                            ReactiveExpr {
                                ty: tree_type.elem_type(),
                                expr,
                            },
                        )))));
                    }
                }
            }
            _ => {}
        }
    }
    Err(lcx.error(format!("Bad index: {index}")))
}

/// `tree_fetch` through `TSlice(index, index2)`: apply `index`, then map
/// `index2` over the result.
pub fn tree_fetch_slice(
    tree: &Value,
    index: &Value,
    index2: &Value,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let lcx = while_indexing(tree, index, cx);
    if let Value::Num(num) = index {
        if num_is_int(*num) {
            let i = positional(tree, *num, &lcx)?;
            let view = tree.list_view().expect("positional checked");
            let sub = view.at(i);
            return tree_fetch(&sub, index2, sstate, cx);
        }
    } else if let Some(sym) = index.maybe_symbol() {
        let sub = fetch_field(tree, &sym.clone(), sstate, &lcx)?;
        return tree_fetch(&sub, index2, sstate, cx);
    } else if let Value::Ref(r) = index {
        match &**r {
            RefValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for i in items {
                    out.push(tree_fetch_slice(tree, i, index2, sstate, cx)?);
                }
                return Ok(Value::list(out));
            }
            RefValue::Index(IndexValue::TPath(i1, i2)) => {
                let sub = tree_fetch(tree, i1, sstate, cx)?;
                return tree_fetch_slice(&sub, i2, index2, sstate, cx);
            }
            RefValue::Index(IndexValue::TSlice(i1, i2)) => {
                // Associative law of tslice: normalise the head.
                let rest = Value::Ref(Rc::new(RefValue::Index(IndexValue::TSlice(
                    i2.clone(),
                    index2.clone(),
                ))));
                return tree_fetch_slice(tree, i1, &rest, sstate, cx);
            }
            RefValue::Index(IndexValue::TId) => {
                return tree_fetch(tree, index2, sstate, cx);
            }
            _ => {}
        }
    }
    Err(lcx.error(format!("Bad index: {index}")))
}

pub fn tree_amend(
    tree: &Value,
    index: &Value,
    elems: Value,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let lcx = while_indexing(tree, index, cx);
    if let Value::Num(num) = index {
        if num_is_int(*num) {
            let i = positional(tree, *num, &lcx)?;
            return Ok(amend_seq_at(tree, i, elems));
        }
    } else if let Some(sym) = index.maybe_symbol() {
        let sym = sym.clone();
        let mut fields = update_drecord(tree, sstate, &bad_collection(&lcx))?;
        fields.insert(sym, elems);
        return Ok(Value::Ref(Rc::new(RefValue::Record(fields))));
    } else if let Value::Ref(r) = index {
        match &**r {
            RefValue::List(items) => {
                let Some(eview) = elems.list_view() else {
                    return Err(bad_index(&lcx).error(format!("{elems}: not a list")));
                };
                if eview.len() != items.len() {
                    return Err(bad_index(&lcx).error(format!(
                        "list pattern: expected {} items, got {}",
                        items.len(),
                        eview.len()
                    )));
                }
                let new_elems: Vec<Value> = eview.iter().collect();
                let mut out = tree.clone();
                for (i, e) in items.iter().zip(new_elems) {
                    out = tree_amend(&out, i, e, sstate, cx)?;
                }
                return Ok(out);
            }
            RefValue::Index(IndexValue::TPath(i1, i2)) => {
                let sub = tree_fetch(tree, i1, sstate, cx)?;
                let new_sub = tree_amend(&sub, i2, elems, sstate, cx)?;
                return tree_amend(tree, i1, new_sub, sstate, cx);
            }
            RefValue::Index(IndexValue::TSlice(i1, i2)) => {
                return tree_amend_slice(tree, i1, i2, elems, sstate, cx);
            }
            RefValue::Index(IndexValue::TId) => return Ok(elems),
            _ => {}
        }
    }
    Err(lcx.error(format!("Bad index: {index}")))
}

pub fn tree_amend_slice(
    tree: &Value,
    index: &Value,
    index2: &Value,
    elems: Value,
    sstate: &SourceState,
    cx: &dyn Context,
) -> Result<Value> {
    let lcx = while_indexing(tree, index, cx);
    if let Value::Num(num) = index {
        if num_is_int(*num) {
            let i = positional(tree, *num, &lcx)?;
            let view = tree.list_view().expect("positional checked");
            let sub = view.at(i);
            let new_sub = tree_amend(&sub, index2, elems, sstate, cx)?;
            return Ok(amend_seq_at(tree, i, new_sub));
        }
    } else if let Some(sym) = index.maybe_symbol() {
        let sym = sym.clone();
        let mut fields = update_drecord(tree, sstate, &bad_collection(&lcx))?;
        let old = fields
            .get(&sym)
            .cloned()
            .ok_or_else(|| bad_index(&lcx).error(format!(".{sym}: not defined")))?;
        let new_sub = tree_amend(&old, index2, elems, sstate, cx)?;
        fields.insert(sym, new_sub);
        return Ok(Value::Ref(Rc::new(RefValue::Record(fields))));
    } else if let Value::Ref(r) = index {
        match &**r {
            RefValue::List(items) => {
                let Some(eview) = elems.list_view() else {
                    return Err(bad_index(&lcx).error(format!("{elems}: not a list")));
                };
                if eview.len() != items.len() {
                    return Err(bad_index(&lcx).error(format!(
                        "list pattern: expected {} items, got {}",
                        items.len(),
                        eview.len()
                    )));
                }
                let new_elems: Vec<Value> = eview.iter().collect();
                let mut out = tree.clone();
                for (i, e) in items.iter().zip(new_elems) {
                    let sub = tree_fetch(&out, i, sstate, cx)?;
                    let new_sub = tree_amend(&sub, index2, e, sstate, cx)?;
                    out = tree_amend(&out, i, new_sub, sstate, cx)?;
                }
                return Ok(out);
            }
            RefValue::Index(IndexValue::TPath(i1, i2)) => {
                let sub = tree_fetch(tree, i1, sstate, cx)?;
                let new_sub = tree_amend(&sub, i2, elems, sstate, cx)?;
                return tree_amend_slice(tree, i1, index2, new_sub, sstate, cx);
            }
            RefValue::Index(IndexValue::TSlice(i1, i2)) => {
                let rest = Value::Ref(Rc::new(RefValue::Index(IndexValue::TSlice(
                    i2.clone(),
                    index2.clone(),
                ))));
                return tree_amend_slice(tree, i1, &rest, elems, sstate, cx);
            }
            RefValue::Index(IndexValue::TId) => {
                return tree_amend(tree, index2, elems, sstate, cx);
            }
            _ => {}
        }
    }
    Err(lcx.error(format!("Bad index: {index}")))
}

/// Positional index check against a list or string.
fn positional(tree: &Value, num: f64, lcx: &dyn Context) -> Result<usize> {
    let Some(view) = tree.list_view() else {
        return Err(bad_collection(lcx).error(format!("{tree}: not a list")));
    };
    let len = view.len();
    if num < 0.0 || num >= len as f64 {
        return Err(bad_index(lcx).error(format!(
            "{}: out of range [0..{}]",
            crate::format::num_repr(num),
            len.saturating_sub(1)
        )));
    }
    Ok(num as usize)
}

fn fetch_field(
    tree: &Value,
    sym: &Symbol,
    sstate: &SourceState,
    lcx: &dyn Context,
) -> Result<Value> {
    let Value::Ref(r) = tree else {
        return Err(bad_collection(lcx).error(format!("{tree}: not a record")));
    };
    if !matches!(
        &**r,
        RefValue::Record(_) | RefValue::Module(_) | RefValue::DirRecord(_)
    ) {
        return Err(bad_collection(lcx).error(format!("{tree}: not a record")));
    }
    record_field(r, sym, sstate, &bad_index(lcx))
}

/// Replace one element of a list or string, cloning the spine only when it
/// is shared. Amending a string with a non-character converts it to a list.
fn amend_seq_at(tree: &Value, i: usize, elem: Value) -> Value {
    let Value::Ref(rc) = tree else {
        unreachable!("amend_seq_at: positional() checked the collection")
    };
    let mut rc = Rc::clone(rc);
    match (Rc::make_mut(&mut rc), &elem) {
        (RefValue::List(items), _) => items[i] = elem,
        (RefValue::String(bytes), Value::Char(c)) => bytes[i] = *c,
        (refv @ RefValue::String(_), _) => {
            let RefValue::String(bytes) = &*refv else {
                unreachable!()
            };
            let mut items: Vec<Value> = bytes.iter().map(|&b| Value::Char(b)).collect();
            items[i] = elem;
            *refv = RefValue::List(items);
        }
        _ => unreachable!("amend_seq_at: positional() checked the collection"),
    }
    Value::Ref(rc)
}

fn while_indexing<'a>(
    tree: &Value,
    index: &Value,
    cx: &'a dyn Context,
) -> Rewriting<'a, impl Fn(String) -> String> {
    let collection = crate::format::repr(tree);
    let index = crate::format::repr(index);
    Rewriting::new(cx, move |msg| {
        format!("{msg}\ncollection: {collection}\nindex: {index}")
    })
}

fn bad_index<'a>(parent: &'a dyn Context) -> Rewriting<'a, impl Fn(String) -> String> {
    Rewriting::new(parent, |msg| format!("Bad index: {msg}"))
}

fn bad_collection<'a>(parent: &'a dyn Context) -> Rewriting<'a, impl Fn(String) -> String> {
    Rewriting::new(parent, |msg| {
        format!("Index incompatible with collection: {msg}")
    })
}
