//! The Meaning tree: the analysed, executable form of a phrase.
//!
//! Every operation supports three interpreters over the same tree:
//! `eval`/`exec` (concrete evaluation), `tail_eval` (the trampoline step
//! used for proper tail calls), and `sc_eval` (the shape compiler's
//! abstract evaluation, in `crate::sc`). Operations are value-hashable so
//! the shape compiler can emit one SSA register for a diamond-shaped
//! subexpression.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::{AtPhrase, Context};
use crate::error::{Fail, Result};
use crate::frame::Frame;
use crate::pattern::Pattern;
use crate::phrase::Phrase;
use crate::prim::{BinaryPrim, UnaryPrim};
use crate::symbol::Symbol;
use crate::types::function::{Closure, Function, LambdaData, maybe_function};
use crate::types::list::ListBuilder;
use crate::types::reactive::{Reactive, ReactiveExpr};
use crate::types::record::{DRecord, ModuleData, module_get, record_field};
use crate::sc::ty::ScType;
use crate::value::{RefValue, Ternary, Value};

/// One segment of an analysed string literal.
#[derive(Debug)]
pub enum StringOpSeg {
    Literal(Vec<u8>),
    /// `${expr}` and `$identifier`: value converted as by `print_string`.
    Str(Rc<Operation>),
    /// `$(expr)`: value converted as by `print_repr`.
    Repr(Rc<Operation>),
    /// `$[c1,c2,...]`: characters by numeric code.
    Chars(Rc<Operation>),
}

/// The initialiser sequence of a recursive scope that evaluates to a module.
#[derive(Debug)]
pub struct ScopeExecutable {
    /// Frame slot holding the module while it is being initialised.
    pub module_slot: usize,
    pub dict: Rc<IndexMap<Symbol, usize>>,
    pub actions: Vec<Rc<Operation>>,
}

#[derive(Debug)]
pub enum Operation {
    Constant {
        syntax: Rc<Phrase>,
        value: Value,
    },
    /// A reference to a local binding in the current frame.
    LocalDataRef {
        syntax: Rc<Phrase>,
        slot: usize,
    },
    /// A reference to a field of the module under construction: frame slot
    /// `module_slot` holds the module, `slot` indexes into it.
    ModuleDataRef {
        syntax: Rc<Phrase>,
        module_slot: usize,
        slot: usize,
    },
    /// A reference to a captured nonlocal of the current closure.
    NonlocalDataRef {
        syntax: Rc<Phrase>,
        slot: usize,
    },
    /// A by-name reference resolved through the closure's nonlocals module
    /// at run time; used inside mutually recursive function groups, whose
    /// shared dictionary is assembled after their bodies are analysed.
    SymbolicRef {
        syntax: Rc<Phrase>,
        name: Symbol,
    },
    Call {
        syntax: Rc<Phrase>,
        func: Rc<Operation>,
        arg: Rc<Operation>,
    },
    Dot {
        syntax: Rc<Phrase>,
        base: Rc<Operation>,
        name: Symbol,
    },
    /// `a@i`: fetch through the tree lens layer.
    IndexApp {
        syntax: Rc<Phrase>,
        base: Rc<Operation>,
        index: Rc<Operation>,
    },
    ListExpr {
        syntax: Rc<Phrase>,
        items: Vec<Rc<Operation>>,
    },
    RecordExpr {
        syntax: Rc<Phrase>,
        items: Vec<Rc<Operation>>,
    },
    /// `name: value` inside a record constructor.
    FieldSetter {
        syntax: Rc<Phrase>,
        name: Rc<Operation>,
        value: Rc<Operation>,
    },
    StringExpr {
        syntax: Rc<Phrase>,
        segments: Vec<StringOpSeg>,
    },
    /// `...expr` in a list or record constructor.
    Spread {
        syntax: Rc<Phrase>,
        arg: Rc<Operation>,
    },
    Unary {
        syntax: Rc<Phrase>,
        prim: UnaryPrim,
        arg: Rc<Operation>,
    },
    BinOp {
        syntax: Rc<Phrase>,
        prim: BinaryPrim,
        left: Rc<Operation>,
        right: Rc<Operation>,
    },
    /// `==` / `!=`, ternary equality.
    Equal {
        syntax: Rc<Phrase>,
        left: Rc<Operation>,
        right: Rc<Operation>,
        negate: bool,
    },
    And {
        syntax: Rc<Phrase>,
        left: Rc<Operation>,
        right: Rc<Operation>,
    },
    Or {
        syntax: Rc<Phrase>,
        left: Rc<Operation>,
        right: Rc<Operation>,
    },
    IfElse {
        syntax: Rc<Phrase>,
        cond: Rc<Operation>,
        then_part: Rc<Operation>,
        else_part: Option<Rc<Operation>>,
    },
    RangeGen {
        syntax: Rc<Phrase>,
        first: Rc<Operation>,
        last: Rc<Operation>,
        step: Option<Rc<Operation>>,
        open: bool,
    },
    /// Scope executable + body: `let`, `do`, and parenthesised statement
    /// sequences ending in an expression.
    Block {
        syntax: Rc<Phrase>,
        actions: Vec<Rc<Operation>>,
        body: Rc<Operation>,
    },
    ForOp {
        syntax: Rc<Phrase>,
        pattern: Rc<Pattern>,
        sequence: Rc<Operation>,
        body: Rc<Operation>,
    },
    WhileOp {
        syntax: Rc<Phrase>,
        cond: Rc<Operation>,
        body: Rc<Operation>,
    },
    Compound {
        syntax: Rc<Phrase>,
        items: Vec<Rc<Operation>>,
    },
    /// Initialise the bindings of one data definition.
    DataSetter {
        syntax: Rc<Phrase>,
        module_slot: Option<usize>,
        pattern: Rc<Pattern>,
        definiens: Rc<Operation>,
    },
    /// Install a strongly-connected group of function definitions, sharing
    /// one nonlocals module.
    FunctionSetter {
        syntax: Rc<Phrase>,
        module_slot: Option<usize>,
        nonlocals: Rc<Operation>,
        elements: Vec<(usize, Rc<LambdaData>)>,
    },
    /// Install the fields produced by an `include`, evaluated at analysis
    /// time.
    IncludeSetter {
        syntax: Rc<Phrase>,
        module_slot: Option<usize>,
        elements: Vec<(usize, Value)>,
    },
    LambdaExpr {
        syntax: Rc<Phrase>,
        pattern: Rc<Pattern>,
        body: Rc<Operation>,
        nslots: usize,
        nonlocal_dict: Rc<IndexMap<Symbol, usize>>,
        nonlocal_exprs: Vec<Rc<Operation>>,
        name: Option<Symbol>,
    },
    ScopedModuleExpr {
        syntax: Rc<Phrase>,
        executable: ScopeExecutable,
    },
    /// An anonymous module with a fixed dictionary and eagerly evaluated
    /// slot expressions: the shared nonlocals of a function group.
    EnumModuleExpr {
        syntax: Rc<Phrase>,
        dict: Rc<IndexMap<Symbol, usize>>,
        exprs: Vec<Rc<Operation>>,
    },
    /// Build a `TPath` index value from component indexes.
    TPathExpr {
        syntax: Rc<Phrase>,
        indexes: Vec<Rc<Operation>>,
    },
    /// `locative := expr`. Without an index this is a plain slot write;
    /// with one it is fetch/amend/store through the tree lens layer.
    Assign {
        syntax: Rc<Phrase>,
        slot: usize,
        index: Option<Rc<Operation>>,
        expr: Rc<Operation>,
    },
}

/// Where `exec` sends the values or fields an operation generates.
pub trait Executor {
    fn push_value(&mut self, value: Value, cx: &dyn Context) -> Result<()>;
    fn push_field(&mut self, name: Symbol, value: Value, cx: &dyn Context) -> Result<()>;
}

pub struct ListExecutor(pub ListBuilder);

impl Executor for ListExecutor {
    fn push_value(&mut self, value: Value, _cx: &dyn Context) -> Result<()> {
        self.0.push(value);
        Ok(())
    }

    fn push_field(&mut self, name: Symbol, _value: Value, cx: &dyn Context) -> Result<()> {
        Err(cx.error(format!("field {name}: not legal in a list constructor")))
    }
}

pub struct RecordExecutor<'a>(pub &'a mut DRecord);

impl Executor for RecordExecutor<'_> {
    fn push_value(&mut self, value: Value, cx: &dyn Context) -> Result<()> {
        Err(cx.error(format!("{value}: not a record field")))
    }

    fn push_field(&mut self, name: Symbol, value: Value, _cx: &dyn Context) -> Result<()> {
        self.0.insert(name, value);
        Ok(())
    }
}

/// The executor used in plain statement position, where generating a value
/// is an error.
pub struct ActionExecutor;

impl Executor for ActionExecutor {
    fn push_value(&mut self, value: Value, cx: &dyn Context) -> Result<()> {
        // Action functions (print, assert, ...) return the missing value;
        // anything else is an expression misused as a statement.
        if value.is_missing() {
            return Ok(());
        }
        Err(cx.error(format!("{value}: expression used as a statement")))
    }

    fn push_field(&mut self, name: Symbol, _value: Value, cx: &dyn Context) -> Result<()> {
        Err(cx.error(format!("field {name}: not legal here")))
    }
}

impl Operation {
    pub fn syntax(&self) -> &Rc<Phrase> {
        match self {
            Self::Constant { syntax, .. }
            | Self::LocalDataRef { syntax, .. }
            | Self::ModuleDataRef { syntax, .. }
            | Self::NonlocalDataRef { syntax, .. }
            | Self::SymbolicRef { syntax, .. }
            | Self::Call { syntax, .. }
            | Self::Dot { syntax, .. }
            | Self::IndexApp { syntax, .. }
            | Self::ListExpr { syntax, .. }
            | Self::RecordExpr { syntax, .. }
            | Self::FieldSetter { syntax, .. }
            | Self::StringExpr { syntax, .. }
            | Self::Spread { syntax, .. }
            | Self::Unary { syntax, .. }
            | Self::BinOp { syntax, .. }
            | Self::Equal { syntax, .. }
            | Self::And { syntax, .. }
            | Self::Or { syntax, .. }
            | Self::IfElse { syntax, .. }
            | Self::RangeGen { syntax, .. }
            | Self::Block { syntax, .. }
            | Self::ForOp { syntax, .. }
            | Self::WhileOp { syntax, .. }
            | Self::Compound { syntax, .. }
            | Self::DataSetter { syntax, .. }
            | Self::FunctionSetter { syntax, .. }
            | Self::IncludeSetter { syntax, .. }
            | Self::LambdaExpr { syntax, .. }
            | Self::ScopedModuleExpr { syntax, .. }
            | Self::EnumModuleExpr { syntax, .. }
            | Self::TPathExpr { syntax, .. }
            | Self::Assign { syntax, .. } => syntax,
        }
    }

    /// Evaluate as an expression.
    pub fn eval(self: &Rc<Self>, fm: &mut Frame<'_>) -> Result<Value> {
        match &**self {
            Self::Constant { value, .. } => Ok(value.clone()),
            Self::LocalDataRef { slot, .. } => Ok(fm.slots[*slot].clone()),
            Self::ModuleDataRef {
                syntax,
                module_slot,
                slot,
            } => {
                let module = expect_module(&fm.slots[*module_slot], syntax, fm)?;
                Ok(module_get(&module, *slot))
            }
            Self::NonlocalDataRef { syntax, slot } => {
                let module = fm.nonlocals.clone().ok_or_else(|| {
                    AtPhrase::new(Rc::clone(syntax), fm)
                        .error("internal error: no nonlocals".to_string())
                })?;
                Ok(module_get(&module, *slot))
            }
            Self::SymbolicRef { syntax, name } => {
                let module = fm.nonlocals.clone().ok_or_else(|| {
                    AtPhrase::new(Rc::clone(syntax), fm)
                        .error("internal error: no nonlocals".to_string())
                })?;
                let slot = module.dict.get(name).copied().ok_or_else(|| {
                    AtPhrase::new(Rc::clone(syntax), fm)
                        .error(format!("internal error: {name} not captured"))
                })?;
                Ok(module_get(&module, slot))
            }
            Self::Call { syntax, func, arg } => {
                let funv = func.eval(fm)?;
                let argv = arg.eval(fm)?;
                call_func(funv, argv, syntax, fm)
            }
            Self::Dot { syntax, base, name } => {
                let basev = base.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                match &basev {
                    Value::Ref(r) => {
                        let sstate = Rc::clone(&fm.sstate);
                        record_field(r, name, &sstate, &cx)
                    }
                    _ => Err(cx.error(format!("{basev}: not a record"))),
                }
            }
            Self::IndexApp {
                syntax,
                base,
                index,
            } => {
                let basev = base.eval(fm)?;
                let indexv = index.eval(fm)?;
                let sstate = Rc::clone(&fm.sstate);
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                crate::tree::tree_fetch(&basev, &indexv, &sstate, &cx)
            }
            Self::ListExpr { items, .. } => {
                let mut ex = ListExecutor(ListBuilder::new());
                for item in items {
                    item.exec(fm, &mut ex)?;
                }
                Ok(ex.0.get_value())
            }
            Self::RecordExpr { items, .. } => {
                let mut fields = DRecord::new();
                {
                    let mut ex = RecordExecutor(&mut fields);
                    for item in items {
                        item.exec(fm, &mut ex)?;
                    }
                }
                Ok(Value::Ref(Rc::new(RefValue::Record(fields))))
            }
            Self::StringExpr { segments, .. } => {
                let mut bytes: Vec<u8> = Vec::new();
                for seg in segments {
                    match seg {
                        StringOpSeg::Literal(text) => bytes.extend_from_slice(text),
                        StringOpSeg::Str(op) => {
                            let v = op.eval(fm)?;
                            crate::format::write_string_bytes(&mut bytes, &v);
                        }
                        StringOpSeg::Repr(op) => {
                            let v = op.eval(fm)?;
                            bytes.extend_from_slice(crate::format::repr(&v).as_bytes());
                        }
                        StringOpSeg::Chars(op) => {
                            let v = op.eval(fm)?;
                            let cx = AtPhrase::new(Rc::clone(op.syntax()), fm);
                            push_chars(&mut bytes, &v, &cx)?;
                        }
                    }
                }
                Ok(Value::string(bytes))
            }
            Self::Unary { syntax, prim, arg } => {
                let x = arg.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                crate::prim::unary_op(*prim, x, &cx)
            }
            Self::BinOp {
                syntax,
                prim,
                left,
                right,
            } => {
                let x = left.eval(fm)?;
                let y = right.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                crate::prim::binary_op(*prim, x, y, &cx)
            }
            Self::Equal {
                syntax,
                left,
                right,
                negate,
            } => {
                let x = left.eval(fm)?;
                let y = right.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                match x.equal(&y, &cx)? {
                    Ternary::True => Ok(Value::Bool(!negate)),
                    Ternary::False => Ok(Value::Bool(*negate)),
                    Ternary::Unknown => Ok(Value::Ref(Rc::new(RefValue::Reactive(
                        Reactive::Expr(ReactiveExpr {
                            ty: ScType::bool(),
                            expr: Rc::clone(self),
                        }),
                    )))),
                }
            }
            Self::And { syntax, left, right } => {
                let a = left.eval(fm)?;
                match a {
                    Value::Bool(false) => Ok(Value::Bool(false)),
                    Value::Bool(true) => {
                        let b = right.eval(fm)?;
                        let cx = AtPhrase::new(Rc::clone(syntax), fm);
                        b.to_bool(&cx).map(Value::Bool)
                    }
                    _ => reactive_or_bool_error(self, a, fm),
                }
            }
            Self::Or { syntax, left, right } => {
                let a = left.eval(fm)?;
                match a {
                    Value::Bool(true) => Ok(Value::Bool(true)),
                    Value::Bool(false) => {
                        let b = right.eval(fm)?;
                        let cx = AtPhrase::new(Rc::clone(syntax), fm);
                        b.to_bool(&cx).map(Value::Bool)
                    }
                    _ => reactive_or_bool_error(self, a, fm),
                }
            }
            Self::IfElse {
                syntax,
                cond,
                then_part,
                else_part,
            } => {
                let c = cond.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                let else_part = else_part.as_ref().ok_or_else(|| {
                    cx.error("if without else: not an expression".to_string())
                })?;
                if c.to_bool(&cx)? {
                    then_part.eval(fm)
                } else {
                    else_part.eval(fm)
                }
            }
            Self::RangeGen { .. } => {
                let mut ex = ListExecutor(ListBuilder::new());
                self.exec(fm, &mut ex)?;
                Ok(ex.0.get_value())
            }
            Self::Block { actions, body, .. } => {
                let mut ex = ActionExecutor;
                for action in actions {
                    action.exec(fm, &mut ex)?;
                }
                body.eval(fm)
            }
            Self::LambdaExpr {
                syntax,
                pattern,
                body,
                nslots,
                nonlocal_dict,
                nonlocal_exprs,
                name,
            } => {
                let _ = syntax;
                let nonlocals = ModuleData::new(Rc::clone(nonlocal_dict), nonlocal_exprs.len());
                for (i, expr) in nonlocal_exprs.iter().enumerate() {
                    let v = expr.eval(fm)?;
                    nonlocals.slots.borrow_mut()[i] = v;
                }
                Ok(Value::Ref(Rc::new(RefValue::Function(Function::Closure(
                    Closure {
                        pattern: Rc::clone(pattern),
                        body: Rc::clone(body),
                        nonlocals,
                        nslots: *nslots,
                        name: name.clone(),
                    },
                )))))
            }
            Self::ScopedModuleExpr { executable, .. } => {
                let module = ModuleData::new(
                    Rc::clone(&executable.dict),
                    executable.dict.len(),
                );
                let module_value = Value::Ref(Rc::new(RefValue::Module(module)));
                fm.slots[executable.module_slot] = module_value.clone();
                let mut ex = ActionExecutor;
                for action in &executable.actions {
                    action.exec(fm, &mut ex)?;
                }
                Ok(module_value)
            }
            Self::TPathExpr { indexes, .. } => {
                let mut values = Vec::with_capacity(indexes.len());
                for ix in indexes {
                    values.push(ix.eval(fm)?);
                }
                Ok(crate::types::index::make_tpath(&values))
            }
            Self::EnumModuleExpr { dict, exprs, .. } => {
                let module = ModuleData::new(Rc::clone(dict), exprs.len());
                for (i, expr) in exprs.iter().enumerate() {
                    let v = expr.eval(fm)?;
                    module.slots.borrow_mut()[i] = v;
                }
                Ok(Value::Ref(Rc::new(RefValue::Module(module))))
            }
            Self::FieldSetter { syntax, .. }
            | Self::Spread { syntax, .. }
            | Self::ForOp { syntax, .. }
            | Self::WhileOp { syntax, .. }
            | Self::Compound { syntax, .. }
            | Self::DataSetter { syntax, .. }
            | Self::FunctionSetter { syntax, .. }
            | Self::IncludeSetter { syntax, .. }
            | Self::Assign { syntax, .. } => Err(AtPhrase::new(Rc::clone(syntax), fm)
                .error("not an expression".to_string())),
        }
    }

    /// Execute as a statement or generator, emitting values or fields into
    /// the executor.
    pub fn exec(self: &Rc<Self>, fm: &mut Frame<'_>, ex: &mut dyn Executor) -> Result<()> {
        match &**self {
            Self::FieldSetter {
                syntax,
                name,
                value,
            } => {
                let namev = name.eval(fm)?;
                let sym = {
                    let cx = AtPhrase::new(Rc::clone(syntax), fm);
                    let Some(sym) = namev.maybe_symbol().cloned() else {
                        return Err(cx.error(format!("{namev}: not a symbol")));
                    };
                    sym
                };
                let v = value.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                ex.push_field(sym, v, &cx)
            }
            Self::Spread { syntax, arg } => {
                let v = arg.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                if let Some(view) = v.list_view() {
                    for item in view.iter() {
                        ex.push_value(item, &cx)?;
                    }
                    return Ok(());
                }
                if let Value::Ref(r) = &v
                    && matches!(
                        &**r,
                        RefValue::Record(_) | RefValue::Module(_) | RefValue::DirRecord(_)
                    )
                {
                    let names = crate::types::record::record_field_names(r);
                    let sstate = Rc::clone(&fm.sstate);
                    for name in names {
                        let fv = record_field(r, &name, &sstate, &cx)?;
                        ex.push_field(name, fv, &cx)?;
                    }
                    return Ok(());
                }
                Err(cx.error(format!("{v}: not a list or record")))
            }
            Self::RangeGen {
                syntax,
                first,
                last,
                step,
                open,
            } => {
                let cx_phrase = Rc::clone(syntax);
                let firstv = first.eval(fm)?;
                let lastv = last.eval(fm)?;
                let stepv = match step {
                    Some(s) => s.eval(fm)?,
                    None => Value::Num(1.0),
                };
                let cx = AtPhrase::new(cx_phrase, fm);
                let a = firstv.to_num(&cx)?;
                let b = lastv.to_num(&cx)?;
                let s = stepv.to_num(&cx)?;
                if s == 0.0 || !s.is_finite() || !a.is_finite() || !b.is_finite() {
                    return Err(cx.error(format!(
                        "{}..{} by {}: invalid range",
                        crate::format::num_repr(a),
                        crate::format::num_repr(b),
                        crate::format::num_repr(s)
                    )));
                }
                let mut i: u64 = 0;
                loop {
                    let x = a + (i as f64) * s;
                    let done = if s > 0.0 {
                        if *open { x >= b } else { x > b }
                    } else if *open {
                        x <= b
                    } else {
                        x < b
                    };
                    if done {
                        break;
                    }
                    ex.push_value(Value::Num(x), &cx)?;
                    i += 1;
                }
                Ok(())
            }
            Self::IfElse {
                syntax,
                cond,
                then_part,
                else_part,
            } => {
                let c = cond.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                if c.to_bool(&cx)? {
                    then_part.exec(fm, ex)
                } else if let Some(else_part) = else_part {
                    else_part.exec(fm, ex)
                } else {
                    Ok(())
                }
            }
            Self::ForOp {
                pattern,
                sequence,
                body,
                ..
            } => {
                let seqv = sequence.eval(fm)?;
                let cx_syntax = Rc::clone(sequence.syntax());
                let Some(view) = seqv.list_view() else {
                    let cx = AtPhrase::new(cx_syntax, fm);
                    return Err(cx.error(format!("{seqv}: not a list")));
                };
                let elems: Vec<Value> = view.iter().collect();
                for elem in elems {
                    let mut slots = std::mem::take(&mut fm.slots);
                    let r = pattern.exec(
                        &mut slots,
                        &elem,
                        &AtPhrase::analysing(Rc::clone(pattern.syntax())),
                    );
                    fm.slots = slots;
                    r?;
                    body.exec(fm, ex)?;
                }
                Ok(())
            }
            Self::WhileOp { syntax, cond, body } => {
                loop {
                    let c = cond.eval(fm)?;
                    let cx = AtPhrase::new(Rc::clone(syntax), fm);
                    if !c.to_bool(&cx)? {
                        return Ok(());
                    }
                    body.exec(fm, ex)?;
                }
            }
            Self::Compound { items, .. } => {
                for item in items {
                    item.exec(fm, ex)?;
                }
                Ok(())
            }
            Self::Block { actions, body, .. } => {
                let mut action_ex = ActionExecutor;
                for action in actions {
                    action.exec(fm, &mut action_ex)?;
                }
                body.exec(fm, ex)
            }
            Self::DataSetter {
                module_slot,
                pattern,
                definiens,
                ..
            } => {
                let v = definiens.eval(fm)?;
                let cx = AtPhrase::analysing(Rc::clone(definiens.syntax()));
                match module_slot {
                    None => {
                        let mut slots = std::mem::take(&mut fm.slots);
                        let r = pattern.exec(&mut slots, &v, &cx);
                        fm.slots = slots;
                        r
                    }
                    Some(ms) => {
                        let module = expect_module(&fm.slots[*ms], self.syntax(), fm)?;
                        let mut slots = module.slots.borrow_mut();
                        pattern.exec(&mut slots, &v, &cx)
                    }
                }
            }
            Self::FunctionSetter {
                module_slot,
                nonlocals,
                elements,
                ..
            } => {
                let nlv = nonlocals.eval(fm)?;
                let Value::Ref(r) = &nlv else {
                    unreachable!("nonlocals evaluates to a module")
                };
                let RefValue::Module(nl) = &**r else {
                    unreachable!("nonlocals evaluates to a module")
                };
                for (slot, lambda) in elements {
                    let closure = Value::Ref(Rc::new(RefValue::Function(Function::Closure(
                        Closure::from_lambda(lambda, Rc::clone(nl)),
                    ))));
                    match module_slot {
                        None => fm.slots[*slot] = closure,
                        Some(ms) => {
                            let module = expect_module(&fm.slots[*ms], self.syntax(), fm)?;
                            module.slots.borrow_mut()[*slot] = closure;
                        }
                    }
                }
                Ok(())
            }
            Self::IncludeSetter {
                module_slot,
                elements,
                ..
            } => {
                for (slot, value) in elements {
                    match module_slot {
                        None => fm.slots[*slot] = value.clone(),
                        Some(ms) => {
                            let module = expect_module(&fm.slots[*ms], self.syntax(), fm)?;
                            module.slots.borrow_mut()[*slot] = value.clone();
                        }
                    }
                }
                Ok(())
            }
            Self::Assign {
                syntax,
                slot,
                index,
                expr,
            } => {
                let rhs = expr.eval(fm)?;
                let Some(index) = index else {
                    fm.slots[*slot] = rhs;
                    return Ok(());
                };
                let path = index.eval(fm)?;
                let base = fm.slots[*slot].clone();
                let sstate = Rc::clone(&fm.sstate);
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                let amended = crate::tree::tree_amend(&base, &path, rhs, &sstate, &cx)?;
                fm.slots[*slot] = amended;
                Ok(())
            }
            // An expression in generator position emits its value.
            _ => {
                let v = self.eval(fm)?;
                let cx = AtPhrase::analysing(Rc::clone(self.syntax()));
                ex.push_value(v, &cx)
            }
        }
    }

    /// One trampoline step: either complete with a result or hand the frame
    /// a continuation. Calls in tail position reuse the frame.
    pub fn tail_eval(self: &Rc<Self>, fm: &mut Frame<'_>) -> Result<()> {
        match &**self {
            Self::Call { syntax, func, arg } => {
                let funv = func.eval(fm)?;
                let argv = arg.eval(fm)?;
                if let Value::Ref(r) = &funv
                    && let RefValue::Function(Function::Closure(closure)) = &**r
                {
                    return closure.tail_call(argv, fm, syntax);
                }
                fm.result = call_func(funv, argv, syntax, fm)?;
                Ok(())
            }
            Self::IfElse {
                syntax,
                cond,
                then_part,
                else_part,
            } => {
                let c = cond.eval(fm)?;
                let cx = AtPhrase::new(Rc::clone(syntax), fm);
                let else_part = else_part.as_ref().ok_or_else(|| {
                    cx.error("if without else: not an expression".to_string())
                })?;
                fm.next_op = Some(if c.to_bool(&cx)? {
                    Rc::clone(then_part)
                } else {
                    Rc::clone(else_part)
                });
                Ok(())
            }
            Self::Block { actions, body, .. } => {
                let mut ex = ActionExecutor;
                for action in actions {
                    action.exec(fm, &mut ex)?;
                }
                fm.next_op = Some(Rc::clone(body));
                Ok(())
            }
            _ => {
                fm.result = self.eval(fm)?;
                Ok(())
            }
        }
    }

    /// Structural hash, for the shape compiler's operation cache.
    pub fn op_hash(&self) -> u64 {
        let mut state = ahash::AHasher::default();
        self.hash_into(&mut state);
        state.finish()
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Constant { value, .. } => value.hash_value(state),
            Self::LocalDataRef { slot, .. } | Self::NonlocalDataRef { slot, .. } => {
                slot.hash(state);
            }
            Self::ModuleDataRef {
                module_slot, slot, ..
            } => {
                module_slot.hash(state);
                slot.hash(state);
            }
            Self::SymbolicRef { name, .. } | Self::Dot { name, .. } => name.hash(state),
            Self::Call { func, arg, .. } => {
                func.hash_into(state);
                arg.hash_into(state);
            }
            Self::IndexApp { base, index, .. } => {
                base.hash_into(state);
                index.hash_into(state);
            }
            Self::Unary { prim, arg, .. } => {
                (*prim as u8).hash(state);
                arg.hash_into(state);
            }
            Self::BinOp {
                prim, left, right, ..
            } => {
                (*prim as u8).hash(state);
                left.hash_into(state);
                right.hash_into(state);
            }
            Self::Equal {
                left,
                right,
                negate,
                ..
            } => {
                negate.hash(state);
                left.hash_into(state);
                right.hash_into(state);
            }
            Self::And { left, right, .. } | Self::Or { left, right, .. } => {
                left.hash_into(state);
                right.hash_into(state);
            }
            Self::IfElse {
                cond,
                then_part,
                else_part,
                ..
            } => {
                cond.hash_into(state);
                then_part.hash_into(state);
                if let Some(e) = else_part {
                    e.hash_into(state);
                }
            }
            Self::ListExpr { items, .. } => {
                items.len().hash(state);
                for item in items {
                    item.hash_into(state);
                }
            }
            // The remaining variants key by identity: good enough for the
            // op cache, which only needs hash/eq consistency.
            other => (other as *const Self as usize).hash(state),
        }
    }

    /// Hash-consistent structural equality over the same subset of variants
    /// hashed structurally by [`Self::op_hash`].
    pub fn hash_eq(&self, other: &Self) -> bool {
        use Operation as O;
        match (self, other) {
            (O::Constant { value: a, .. }, O::Constant { value: b, .. }) => a.hash_eq(b),
            (O::LocalDataRef { slot: a, .. }, O::LocalDataRef { slot: b, .. })
            | (O::NonlocalDataRef { slot: a, .. }, O::NonlocalDataRef { slot: b, .. }) => a == b,
            (
                O::ModuleDataRef {
                    module_slot: am,
                    slot: a,
                    ..
                },
                O::ModuleDataRef {
                    module_slot: bm,
                    slot: b,
                    ..
                },
            ) => am == bm && a == b,
            (O::SymbolicRef { name: a, .. }, O::SymbolicRef { name: b, .. })
            | (O::Dot { name: a, .. }, O::Dot { name: b, .. }) => a == b,
            (
                O::Call {
                    func: af, arg: aa, ..
                },
                O::Call {
                    func: bf, arg: ba, ..
                },
            ) => af.hash_eq(bf) && aa.hash_eq(ba),
            (
                O::IndexApp {
                    base: ab,
                    index: ai,
                    ..
                },
                O::IndexApp {
                    base: bb,
                    index: bi,
                    ..
                },
            ) => ab.hash_eq(bb) && ai.hash_eq(bi),
            (
                O::Unary {
                    prim: ap, arg: aa, ..
                },
                O::Unary {
                    prim: bp, arg: ba, ..
                },
            ) => ap == bp && aa.hash_eq(ba),
            (
                O::BinOp {
                    prim: ap,
                    left: al,
                    right: ar,
                    ..
                },
                O::BinOp {
                    prim: bp,
                    left: bl,
                    right: br,
                    ..
                },
            ) => ap == bp && al.hash_eq(bl) && ar.hash_eq(br),
            (
                O::Equal {
                    left: al,
                    right: ar,
                    negate: an,
                    ..
                },
                O::Equal {
                    left: bl,
                    right: br,
                    negate: bn,
                    ..
                },
            ) => an == bn && al.hash_eq(bl) && ar.hash_eq(br),
            (
                O::And {
                    left: al,
                    right: ar,
                    ..
                },
                O::And {
                    left: bl,
                    right: br,
                    ..
                },
            )
            | (
                O::Or {
                    left: al,
                    right: ar,
                    ..
                },
                O::Or {
                    left: bl,
                    right: br,
                    ..
                },
            ) => al.hash_eq(bl) && ar.hash_eq(br),
            (
                O::IfElse {
                    cond: ac,
                    then_part: at,
                    else_part: ae,
                    ..
                },
                O::IfElse {
                    cond: bc,
                    then_part: bt,
                    else_part: be,
                    ..
                },
            ) => {
                ac.hash_eq(bc)
                    && at.hash_eq(bt)
                    && match (ae, be) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.hash_eq(b),
                        _ => false,
                    }
            }
            (O::ListExpr { items: a, .. }, O::ListExpr { items: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.hash_eq(y))
            }
            _ => std::ptr::eq(self, other),
        }
    }
}

fn expect_module(
    value: &Value,
    syntax: &Rc<Phrase>,
    fm: &Frame<'_>,
) -> Result<Rc<ModuleData>> {
    if let Value::Ref(r) = value
        && let RefValue::Module(m) = &**r
    {
        return Ok(Rc::clone(m));
    }
    Err(AtPhrase::new(Rc::clone(syntax), fm)
        .error("internal error: module slot does not hold a module".to_string()))
}

fn reactive_or_bool_error(
    op: &Rc<Operation>,
    operand: Value,
    fm: &mut Frame<'_>,
) -> Result<Value> {
    if let Value::Ref(r) = &operand
        && let RefValue::Reactive(re) = &**r
        && re.sc_type().is_bool()
    {
        return Ok(Value::Ref(Rc::new(RefValue::Reactive(Reactive::Expr(
            ReactiveExpr {
                ty: ScType::bool(),
                expr: Rc::clone(op),
            },
        )))));
    }
    let cx = AtPhrase::new(Rc::clone(op.syntax()), fm);
    Err(cx.error(format!("{operand}: not a boolean")))
}

/// The juxtaposition operator `f x`: call a function, or index into a list
/// or string with a bracketed index path.
pub fn call_func(
    funv: Value,
    argv: Value,
    call_phrase: &Rc<Phrase>,
    fm: &mut Frame<'_>,
) -> Result<Value> {
    if let Some(func) = maybe_function(&funv, fm, call_phrase)? {
        return Ok(func
            .call(argv, Fail::Hard, fm, call_phrase)?
            .expect("hard call returns a value"));
    }
    if funv.list_view().is_some() {
        let sstate = Rc::clone(&fm.sstate);
        let cx = AtPhrase::new(Rc::clone(call_phrase), fm);
        return crate::tree::get_value_at_boxed_slice(&funv, &argv, &sstate, &cx);
    }
    let cx = AtPhrase::new(Rc::clone(call_phrase), fm);
    Err(cx.error(format!("{funv}: not a function")))
}

fn push_chars(bytes: &mut Vec<u8>, value: &Value, cx: &dyn Context) -> Result<()> {
    match value {
        Value::Num(_) => {
            let code = value.to_int(1, 255, cx)?;
            bytes.push(code as u8);
            Ok(())
        }
        Value::Char(c) => {
            bytes.push(*c);
            Ok(())
        }
        _ => {
            let Some(view) = value.list_view() else {
                return Err(cx.error(format!("{value}: not a character code")));
            };
            let items: Vec<Value> = view.iter().collect();
            for item in items {
                push_chars(bytes, &item, cx)?;
            }
            Ok(())
        }
    }
}
