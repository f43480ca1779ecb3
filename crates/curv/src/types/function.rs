//! Function values.
//!
//! A user function is a `Closure`: a compiled lambda plus the module of
//! captured nonlocals. A `Lambda` is the compile-time part alone; it is not
//! a proper value but is stored in module slots (see `types::record`).
//! `Piecewise` tries its cases in order, falling through on pattern-match
//! failure; `Composite` pipes a value through its cases left to right.

use std::rc::Rc;

use crate::context::{AtArg, AtPhrase, Context};
use crate::error::{Fail, Result};
use crate::frame::{Frame, tail_eval_frame};
use crate::meaning::Operation;
use crate::pattern::Pattern;
use crate::phrase::Phrase;
use crate::symbol::Symbol;
use crate::types::record::ModuleData;
use crate::value::{RefValue, Value};

/// The compile-time component of a function value: everything but the
/// captured nonlocals.
#[derive(Debug)]
pub struct LambdaData {
    pub pattern: Rc<Pattern>,
    pub body: Rc<Operation>,
    pub nslots: usize,
    pub name: Option<Symbol>,
}

/// A user-defined function: a lambda closed over its nonlocals module.
#[derive(Debug, Clone)]
pub struct Closure {
    pub pattern: Rc<Pattern>,
    pub body: Rc<Operation>,
    pub nonlocals: Rc<ModuleData>,
    pub nslots: usize,
    pub name: Option<Symbol>,
}

impl Closure {
    pub fn from_lambda(lambda: &Rc<LambdaData>, nonlocals: Rc<ModuleData>) -> Self {
        Self {
            pattern: Rc::clone(&lambda.pattern),
            body: Rc::clone(&lambda.body),
            nonlocals,
            nslots: lambda.nslots,
            name: lambda.name.clone(),
        }
    }

    /// Bind the argument and turn `fm` into this closure's call frame,
    /// leaving the body as the next operation of the trampoline. This is the
    /// tail-call path: the frame is reused, so recursion in tail position
    /// runs in constant stack depth.
    pub fn tail_call(
        &self,
        arg: Value,
        fm: &mut Frame<'_>,
        call_phrase: &Rc<Phrase>,
    ) -> Result<()> {
        let slots = self.bind(arg, Fail::Hard, fm)?.expect("hard bind");
        fm.slots = slots;
        fm.nonlocals = Some(Rc::clone(&self.nonlocals));
        fm.call_phrase = Some(Rc::clone(call_phrase));
        fm.func_name = self.name.clone();
        fm.next_op = Some(Rc::clone(&self.body));
        Ok(())
    }

    /// Match the argument against the parameter pattern, producing the call
    /// frame's slot vector. Soft failure reports a mismatch as `None` so
    /// piecewise functions can fall through.
    fn bind(&self, arg: Value, fail: Fail, fm: &Frame<'_>) -> Result<Option<Vec<Value>>> {
        let mut slots = vec![Value::Missing; self.nslots];
        let cx = AtArg {
            func_name: self.name.clone(),
            argpos: 0,
            frame: fm,
        };
        match fail {
            Fail::Hard => {
                self.pattern.exec(&mut slots, &arg, &cx)?;
                Ok(Some(slots))
            }
            Fail::Soft => {
                if self.pattern.try_exec(&mut slots, &arg, &cx)? {
                    Ok(Some(slots))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

pub type BuiltinFn = fn(Value, Fail, &mut Frame<'_>) -> Result<Value>;

/// A function provided by the std namespace.
#[derive(Debug, Clone)]
pub struct Builtin {
    pub name: Symbol,
    pub call: BuiltinFn,
}

#[derive(Debug, Clone)]
pub enum Function {
    Builtin(Builtin),
    Closure(Closure),
    /// `match [f, g, ...]`: first case whose parameter pattern matches.
    Piecewise(Vec<Value>),
    /// `compose [f, g, ...]`: the value flows through each case in order.
    Composite(Vec<Value>),
}

impl Function {
    pub fn name(&self) -> Option<Symbol> {
        match self {
            Self::Builtin(b) => Some(b.name.clone()),
            Self::Closure(c) => c.name.clone(),
            Self::Piecewise(_) | Self::Composite(_) => None,
        }
    }

    /// Call the function. With `Fail::Soft`, a parameter pattern mismatch
    /// yields `None` instead of an error; every other failure still raises.
    pub fn call(
        &self,
        arg: Value,
        fail: Fail,
        fm: &mut Frame<'_>,
        call_phrase: &Rc<Phrase>,
    ) -> Result<Option<Value>> {
        match self {
            Self::Builtin(b) => {
                let mut f2 = Frame::child(
                    fm,
                    Some(Rc::clone(call_phrase)),
                    Some(b.name.clone()),
                    None,
                    0,
                );
                (b.call)(arg, fail, &mut f2).map(Some)
            }
            Self::Closure(c) => {
                let Some(slots) = c.bind(arg, fail, fm)? else {
                    return Ok(None);
                };
                let mut f2 = Frame::child(
                    fm,
                    Some(Rc::clone(call_phrase)),
                    c.name.clone(),
                    Some(Rc::clone(&c.nonlocals)),
                    0,
                );
                f2.slots = slots;
                f2.next_op = Some(Rc::clone(&c.body));
                tail_eval_frame(&mut f2).map(Some)
            }
            Self::Piecewise(cases) => {
                for case in cases {
                    let func = value_to_function(case, fm, call_phrase)?;
                    if let Some(v) = func.call(arg.clone(), Fail::Soft, fm, call_phrase)? {
                        return Ok(Some(v));
                    }
                }
                match fail {
                    Fail::Soft => Ok(None),
                    Fail::Hard => {
                        let cx = AtPhrase::new(Rc::clone(call_phrase), fm);
                        Err(cx.error(format!("{arg}: no matching pattern")))
                    }
                }
            }
            Self::Composite(cases) => {
                let mut value = arg;
                for case in cases {
                    let func = value_to_function(case, fm, call_phrase)?;
                    value = func
                        .call(value, Fail::Hard, fm, call_phrase)?
                        .expect("hard call");
                }
                Ok(Some(value))
            }
        }
    }
}

/// Convert a value to a function. A record with a `call` field is callable
/// through that field, recursively. Fails softly with `None`.
pub fn maybe_function(
    value: &Value,
    fm: &Frame<'_>,
    call_phrase: &Rc<Phrase>,
) -> Result<Option<Function>> {
    match value {
        Value::Ref(r) => match &**r {
            RefValue::Function(f) => Ok(Some(f.clone())),
            RefValue::Record(_) | RefValue::Module(_) | RefValue::DirRecord(_) => {
                let call_sym = Symbol::new("call");
                if crate::types::record::record_has_field(r, &call_sym) {
                    let cx = AtPhrase::new(Rc::clone(call_phrase), fm);
                    let inner =
                        crate::types::record::record_field(r, &call_sym, &fm.sstate, &cx)?;
                    maybe_function(&inner, fm, call_phrase)
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Convert a value to a function, raising "not a function" on failure.
pub fn value_to_function(
    value: &Value,
    fm: &Frame<'_>,
    call_phrase: &Rc<Phrase>,
) -> Result<Function> {
    match maybe_function(value, fm, call_phrase)? {
        Some(f) => Ok(f),
        None => {
            let cx = AtPhrase::new(Rc::clone(call_phrase), fm);
            Err(cx.error(format!("{value}: not a function")))
        }
    }
}
