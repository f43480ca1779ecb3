//! The std namespace: builtin functions and constants, consulted by name
//! lookup once all scoped environments are exhausted.

use std::path::PathBuf;
use std::rc::Rc;

use ahash::AHashMap;

use crate::context::{AtFrame, Context};
use crate::error::{Fail, Result};
use crate::frame::Frame;
use crate::prim::unary_num_kernel;
use crate::symbol::Symbol;
use crate::types::function::{Builtin, BuiltinFn, Function};
use crate::types::index::{IndexValue, make_tpath, make_tslice};
use crate::value::{RefValue, Value};

fn func(name: &str, call: BuiltinFn) -> (Symbol, Value) {
    let sym = Symbol::new(name);
    (
        sym.clone(),
        Value::Ref(Rc::new(RefValue::Function(Function::Builtin(Builtin {
            name: sym,
            call,
        })))),
    )
}

macro_rules! num_builtin {
    ($fname:ident, $name:literal, $kernel:expr) => {
        fn $fname(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
            let cx = AtFrame { frame: &*fm };
            unary_num_kernel($name, &arg, &$kernel, &cx)
        }
    };
}

num_builtin!(bi_sqrt, "sqrt", f64::sqrt);
num_builtin!(bi_abs, "abs", f64::abs);
num_builtin!(bi_floor, "floor", f64::floor);
num_builtin!(bi_ceil, "ceil", f64::ceil);
num_builtin!(bi_round, "round", f64::round);
num_builtin!(bi_trunc, "trunc", f64::trunc);
num_builtin!(bi_sin, "sin", f64::sin);
num_builtin!(bi_cos, "cos", f64::cos);
num_builtin!(bi_tan, "tan", f64::tan);
num_builtin!(bi_asin, "asin", f64::asin);
num_builtin!(bi_acos, "acos", f64::acos);
num_builtin!(bi_atan, "atan", f64::atan);
num_builtin!(bi_exp, "exp", f64::exp);
num_builtin!(bi_log, "log", f64::ln);

fn bi_count(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    match arg.list_view() {
        Some(view) => Ok(Value::Num(view.len() as f64)),
        None => Err(cx.error(format!("count {arg}: not a list"))),
    }
}

fn fold_nums(
    name: &str,
    arg: &Value,
    zero: f64,
    fold: fn(f64, f64) -> f64,
    cx: &dyn Context,
) -> Result<Value> {
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("{name} {arg}: not a list")));
    };
    let mut acc = zero;
    for item in view.iter() {
        match item {
            Value::Num(n) => acc = fold(acc, n),
            other => return Err(cx.error(format!("{name} {other}: domain error"))),
        }
    }
    Ok(Value::num(acc))
}

fn bi_max(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    fold_nums("max", &arg, f64::NEG_INFINITY, f64::max, &cx)
}

fn bi_min(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    fold_nums("min", &arg, f64::INFINITY, f64::min, &cx)
}

fn bi_sum(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    fold_nums("sum", &arg, 0.0, |a, b| a + b, &cx)
}

/// `char`: numeric code (or nest of codes) to character values.
fn bi_char(arg: Value, fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    match &arg {
        Value::Num(_) => {
            let cx = AtFrame { frame: &*fm };
            let code = arg.to_int(0, 255, &cx)?;
            Ok(Value::Char(code as u8))
        }
        Value::Char(_) => Ok(arg),
        _ => {
            let items: Vec<Value> = {
                let cx = AtFrame { frame: &*fm };
                let Some(view) = arg.list_view() else {
                    return Err(cx.error(format!("char {arg}: domain error")));
                };
                view.iter().collect()
            };
            let mut out = crate::types::list::ListBuilder::new();
            for item in items {
                out.push(bi_char(item, fail, fm)?);
            }
            Ok(out.get_value())
        }
    }
}

fn bi_fields(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let Value::Ref(r) = &arg else {
        return Err(cx.error(format!("fields {arg}: not a record")));
    };
    if !matches!(
        &**r,
        RefValue::Record(_) | RefValue::Module(_) | RefValue::DirRecord(_)
    ) {
        return Err(cx.error(format!("fields {arg}: not a record")));
    }
    let names = crate::types::record::record_field_names(r);
    Ok(Value::list(
        names.into_iter().map(Value::symbol).collect(),
    ))
}

fn bi_print(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let mut bytes = Vec::new();
    crate::format::write_string_bytes(&mut bytes, &arg);
    bytes.push(b'\n');
    fm.sstate
        .system
        .console_write(&String::from_utf8_lossy(&bytes));
    Ok(Value::Missing)
}

fn bi_warning(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let mut bytes = Vec::new();
    crate::format::write_string_bytes(&mut bytes, &arg);
    fm.sstate
        .system
        .warning(&String::from_utf8_lossy(&bytes));
    Ok(Value::Missing)
}

fn bi_error(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let mut bytes = Vec::new();
    crate::format::write_string_bytes(&mut bytes, &arg);
    Err(cx.error(String::from_utf8_lossy(&bytes).into_owned()))
}

fn bi_assert(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    if arg.to_bool(&cx)? {
        Ok(Value::Missing)
    } else {
        Err(cx.error("assertion failed".to_string()))
    }
}

/// `match [f, g, ...]`: the piecewise function of its cases.
fn bi_match(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("match {arg}: not a list")));
    };
    Ok(Value::Ref(Rc::new(RefValue::Function(
        Function::Piecewise(view.iter().collect()),
    ))))
}

/// `compose [f, g, ...]`: function composition in pipeline order.
fn bi_compose(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("compose {arg}: not a list")));
    };
    Ok(Value::Ref(Rc::new(RefValue::Function(
        Function::Composite(view.iter().collect()),
    ))))
}

fn bi_is_bool(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    Ok(Value::Bool(matches!(arg, Value::Bool(_))))
}

fn bi_is_num(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    Ok(Value::Bool(matches!(arg, Value::Num(_))))
}

fn bi_is_char(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    Ok(Value::Bool(matches!(arg, Value::Char(_))))
}

fn bi_is_list(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    Ok(Value::Bool(arg.list_view().is_some()))
}

fn bi_is_record(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    let is = matches!(
        &arg,
        Value::Ref(r) if matches!(
            &**r,
            RefValue::Record(_) | RefValue::Module(_) | RefValue::DirRecord(_)
        )
    );
    Ok(Value::Bool(is))
}

fn bi_is_fun(arg: Value, _fail: Fail, _fm: &mut Frame<'_>) -> Result<Value> {
    let is = matches!(&arg, Value::Ref(r) if matches!(&**r, RefValue::Function(_)));
    Ok(Value::Bool(is))
}

/// `file "path"`: import a file as a value, resolved against the location
/// of the importing source.
fn bi_file(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let path = match &arg {
        Value::Ref(r) => match &**r {
            RefValue::String(bytes) => {
                PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => return Err(cx.error(format!("file {arg}: not a string"))),
        },
        _ => return Err(cx.error(format!("file {arg}: not a string"))),
    };
    let resolved = fm.sstate.resolve_path(&path);
    let sstate = Rc::clone(&fm.sstate);
    sstate.import_file(&resolved, &cx)
}

fn bi_tpath(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("tpath {arg}: not a list")));
    };
    let items: Vec<Value> = view.iter().collect();
    Ok(make_tpath(&items))
}

fn bi_tslice(arg: Value, _fail: Fail, fm: &mut Frame<'_>) -> Result<Value> {
    let cx = AtFrame { frame: &*fm };
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("tslice {arg}: not a list")));
    };
    let items: Vec<Value> = view.iter().collect();
    Ok(make_tslice(&items))
}

/// Build the std namespace.
pub fn std_namespace() -> AHashMap<Symbol, Value> {
    let mut ns = AHashMap::new();
    for (name, value) in [
        func("sqrt", bi_sqrt),
        func("abs", bi_abs),
        func("floor", bi_floor),
        func("ceil", bi_ceil),
        func("round", bi_round),
        func("trunc", bi_trunc),
        func("sin", bi_sin),
        func("cos", bi_cos),
        func("tan", bi_tan),
        func("asin", bi_asin),
        func("acos", bi_acos),
        func("atan", bi_atan),
        func("exp", bi_exp),
        func("log", bi_log),
        func("count", bi_count),
        func("max", bi_max),
        func("min", bi_min),
        func("sum", bi_sum),
        func("char", bi_char),
        func("fields", bi_fields),
        func("print", bi_print),
        func("warning", bi_warning),
        func("error", bi_error),
        func("assert", bi_assert),
        func("match", bi_match),
        func("compose", bi_compose),
        func("is_bool", bi_is_bool),
        func("is_num", bi_is_num),
        func("is_char", bi_is_char),
        func("is_list", bi_is_list),
        func("is_record", bi_is_record),
        func("is_fun", bi_is_fun),
        func("file", bi_file),
        func("tpath", bi_tpath),
        func("tslice", bi_tslice),
        (Symbol::new("pi"), Value::Num(std::f64::consts::PI)),
        (Symbol::new("tau"), Value::Num(std::f64::consts::TAU)),
        (Symbol::new("inf"), Value::Num(f64::INFINITY)),
        (Symbol::new("true"), Value::Bool(true)),
        (Symbol::new("false"), Value::Bool(false)),
        (Symbol::new("null"), Value::symbol(Symbol::new("null"))),
        (
            Symbol::new("tid"),
            Value::Ref(Rc::new(RefValue::Index(IndexValue::TId))),
        ),
    ] {
        ns.insert(name, value);
    }
    ns
}
