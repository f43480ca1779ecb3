//! The SubCurv compiler: an abstract evaluator over the Meaning tree.
//!
//! Where concrete evaluation produces values, this produces `ScValue`s:
//! typed SSA register names written into an output stream. Function calls
//! on closures are inlined, eliminating first-class functions; nonlocals
//! captured by a closure become compile-time constants. Recurrence through
//! the same operation is memoised per function in an op-cache keyed by
//! operation hash, so diamond-shaped expression DAGs emit shared registers.

use std::fmt;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::AHashMap;

use crate::context::Context;
use crate::error::{Exception, Result};
use crate::meaning::Operation;
use crate::pattern::Pattern;
use crate::phrase::Phrase;
use crate::prim::{BinaryPrim, UnaryPrim};
use crate::sc::context::AtScPhrase;
use crate::sc::ty::{ScType, sc_type_of, sc_unify_tensor_types};
use crate::symbol::Symbol;
use crate::types::function::{Closure, Function};
use crate::types::reactive::Reactive;
use crate::types::record::{ModuleData, module_get};
use crate::value::{RefValue, Value};

/// An SSA variable: its register number and type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScValue {
    pub index: u32,
    pub ty: ScType,
}

impl fmt::Display for ScValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

/// Key wrapper giving operations their value-hash identity in the op cache.
pub struct OpKey(pub Rc<Operation>);

impl Hash for OpKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.op_hash().hash(state);
    }
}

impl PartialEq for OpKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.hash_eq(&other.0)
    }
}

impl Eq for OpKey {}

/// Hash-keyed cache of constants already emitted.
struct ValKey(Value);

impl Hash for ValKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_value(state);
    }
}

impl PartialEq for ValKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.hash_eq(&other.0)
    }
}

impl Eq for ValKey {}

/// Global state for the GLSL code generator.
pub struct ScCompiler {
    constants: String,
    body: String,
    in_constants: bool,
    valcount: u32,
    valcache: AHashMap<ValKey, ScValue>,
    /// Uniform variables encountered while compiling; declared in the
    /// output preamble.
    pub uniforms: Vec<(Symbol, ScType)>,
}

impl Default for ScCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScCompiler {
    pub fn new() -> Self {
        Self {
            constants: String::new(),
            body: String::new(),
            in_constants: false,
            valcount: 0,
            valcache: AHashMap::new(),
            uniforms: Vec::new(),
        }
    }

    pub fn newvalue(&mut self, ty: ScType) -> ScValue {
        let v = ScValue {
            index: self.valcount,
            ty,
        };
        self.valcount += 1;
        v
    }

    fn out(&mut self) -> &mut String {
        if self.in_constants {
            &mut self.constants
        } else {
            &mut self.body
        }
    }

    /// Emit `ty name = rhs;` and return the new SSA value.
    fn emit(
        &mut self,
        ty: ScType,
        rhs: &str,
        cx_phrase: &Rc<Phrase>,
        fm: &ScFrame<'_>,
    ) -> Result<ScValue> {
        let Some(glsl) = ty.glsl_name() else {
            return Err(sc_error(
                cx_phrase,
                fm,
                format!("type {ty} has no GPU representation"),
            ));
        };
        let v = self.newvalue(ty);
        let out = self.out();
        let _ = writeln!(out, "  {glsl} {v} = {rhs};");
        Ok(v)
    }

    /// The main entry point: compile a function value into a GLSL function
    /// definition with the given signature, returning the full text.
    pub fn define_function(
        &mut self,
        name: &str,
        param_type: ScType,
        result_type: ScType,
        func: &Value,
        cx: &dyn Context,
    ) -> Result<String> {
        let Value::Ref(r) = func else {
            return Err(cx.error(format!("{func}: not a function")));
        };
        let RefValue::Function(Function::Closure(closure)) = &**r else {
            return Err(cx.error(format!(
                "{func}: only closures can be compiled to GPU code"
            )));
        };
        let mut fm = ScFrame {
            root_context: Some(cx),
            parent: None,
            call_phrase: None,
            nonlocals: Some(Rc::clone(&closure.nonlocals)),
            slots: vec![None; closure.nslots],
            op_cache: AHashMap::new(),
        };
        let param = self.newvalue(param_type.clone());
        bind_sc_param(&closure.pattern, &param, self, &mut fm)?;
        let result = sc_eval_op(&closure.body, self, &mut fm)?;
        if result.ty != result_type {
            return Err(sc_error(
                closure.body.syntax(),
                &fm,
                format!(
                    "function result type mismatch: expected {result_type}, got {}",
                    result.ty
                ),
            ));
        }
        let mut text = String::new();
        for (uname, uty) in &self.uniforms {
            let glsl = uty.glsl_name().unwrap_or("float");
            let _ = writeln!(text, "uniform {glsl} {uname};");
        }
        let rt = result_type.glsl_name().unwrap_or("float");
        let pt = param_type.glsl_name().unwrap_or("float");
        let _ = writeln!(text, "{rt} {name}({pt} {param})");
        let _ = writeln!(text, "{{");
        text.push_str(&self.constants);
        text.push_str(&self.body);
        let _ = writeln!(text, "  return {result};");
        let _ = writeln!(text, "}}");
        Ok(text)
    }
}

/// A call frame of the abstract evaluator: isomorphic to `Frame`, with
/// local slots holding `ScValue`s instead of values.
pub struct ScFrame<'p> {
    /// The dynamic context that requested the compilation; set on the root
    /// frame only. SC errors rewrite their message through it.
    pub root_context: Option<&'p dyn Context>,
    pub parent: Option<&'p ScFrame<'p>>,
    pub call_phrase: Option<Rc<Phrase>>,
    pub nonlocals: Option<Rc<ModuleData>>,
    pub slots: Vec<Option<ScValue>>,
    /// Memoises operations already lowered within this function body.
    pub op_cache: AHashMap<OpKey, ScValue>,
}

/// Build a "Shape Compiler:" exception at a phrase, rewritten through the
/// dynamic context that requested the compilation.
fn sc_error(phrase: &Rc<Phrase>, fm: &ScFrame<'_>, msg: String) -> Exception {
    AtScPhrase {
        phrase: Rc::clone(phrase),
        frame: fm,
    }
    .error(msg)
}

/// Abstract-evaluate an operation to a typed SSA value.
pub fn sc_eval_op(
    op: &Rc<Operation>,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
) -> Result<ScValue> {
    if let Some(cached) = fm.op_cache.get(&OpKey(Rc::clone(op))) {
        return Ok(cached.clone());
    }
    let result = sc_eval_uncached(op, sc, fm)?;
    fm.op_cache.insert(OpKey(Rc::clone(op)), result.clone());
    Ok(result)
}

fn sc_eval_uncached(
    op: &Rc<Operation>,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
) -> Result<ScValue> {
    match &**op {
        Operation::Constant { syntax, value } => sc_eval_const(sc, fm, value, syntax),
        Operation::LocalDataRef { syntax, slot } => fm.slots[*slot]
            .clone()
            .ok_or_else(|| sc_error(syntax, fm, "unbound local".to_string())),
        Operation::NonlocalDataRef { syntax, slot } => {
            let Some(nl) = fm.nonlocals.clone() else {
                return Err(sc_error(syntax, fm, "no nonlocals".to_string()));
            };
            let value = module_get(&nl, *slot);
            sc_eval_const(sc, fm, &value, syntax)
        }
        Operation::SymbolicRef { syntax, name } => {
            let Some(nl) = fm.nonlocals.clone() else {
                return Err(sc_error(syntax, fm, "no nonlocals".to_string()));
            };
            let Some(&slot) = nl.dict.get(name) else {
                return Err(sc_error(syntax, fm, format!("{name} not captured")));
            };
            let value = module_get(&nl, slot);
            sc_eval_const(sc, fm, &value, syntax)
        }
        Operation::Unary { syntax, prim, arg } => {
            let x = sc_eval_op(arg, sc, fm)?;
            match prim {
                UnaryPrim::Pos | UnaryPrim::Neg => {
                    if !x.ty.is_num_plex() {
                        return Err(sc_error(
                            syntax,
                            fm,
                            format!("operand type {} is not numeric", x.ty),
                        ));
                    }
                    let ty = x.ty.clone();
                    sc.emit(ty, &format!("{}{x}", prim.name()), syntax, fm)
                }
                UnaryPrim::Not => {
                    if !x.ty.is_bool_or_vec() {
                        return Err(sc_error(
                            syntax,
                            fm,
                            format!("operand type {} is not boolean", x.ty),
                        ));
                    }
                    let ty = x.ty.clone();
                    if ty.is_bool() {
                        sc.emit(ty, &format!("!{x}"), syntax, fm)
                    } else {
                        sc.emit(ty, &format!("not({x})"), syntax, fm)
                    }
                }
            }
        }
        Operation::BinOp {
            syntax,
            prim,
            left,
            right,
        } => {
            let x = sc_eval_op(left, sc, fm)?;
            let y = sc_eval_op(right, sc, fm)?;
            sc_binop(sc, fm, *prim, &x, &y, syntax)
        }
        Operation::Equal {
            syntax,
            left,
            right,
            negate,
        } => {
            let x = sc_eval_op(left, sc, fm)?;
            let y = sc_eval_op(right, sc, fm)?;
            if x.ty != y.ty || !x.ty.is_plex() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("cannot compare {} with {}", x.ty, y.ty),
                ));
            }
            let op_str = if *negate { "!=" } else { "==" };
            sc.emit(ScType::bool(), &format!("{x} {op_str} {y}"), syntax, fm)
        }
        Operation::And { syntax, left, right } | Operation::Or { syntax, left, right } => {
            let x = sc_eval_op(left, sc, fm)?;
            let y = sc_eval_op(right, sc, fm)?;
            if !x.ty.is_bool() || !y.ty.is_bool() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("operands of type {} and {} are not booleans", x.ty, y.ty),
                ));
            }
            let op_str = if matches!(&**op, Operation::And { .. }) {
                "&&"
            } else {
                "||"
            };
            sc.emit(ScType::bool(), &format!("{x} {op_str} {y}"), syntax, fm)
        }
        Operation::IfElse {
            syntax,
            cond,
            then_part,
            else_part,
        } => {
            let Some(else_part) = else_part else {
                return Err(sc_error(
                    syntax,
                    fm,
                    "if without else: not an expression".to_string(),
                ));
            };
            let c = sc_eval_op(cond, sc, fm)?;
            if !c.ty.is_bool() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("condition type {} is not boolean", c.ty),
                ));
            }
            let a = sc_eval_op(then_part, sc, fm)?;
            let b = sc_eval_op(else_part, sc, fm)?;
            let ty = sc_unify_tensor_types(&a.ty, &b.ty);
            if ty.is_error() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("branch types {} and {} do not unify", a.ty, b.ty),
                ));
            }
            let a = sc_extend(sc, fm, a, &ty, syntax)?;
            let b = sc_extend(sc, fm, b, &ty, syntax)?;
            sc.emit(ty, &format!("{c} ? {a} : {b}"), syntax, fm)
        }
        Operation::Call { syntax, func, arg } => {
            let funv = resolve_const_function(func, fm).ok_or_else(|| {
                sc_error(
                    syntax,
                    fm,
                    "called function is not a compile-time constant".to_string(),
                )
            })?;
            sc_call(&funv, arg, sc, fm, syntax)
        }
        Operation::ListExpr { syntax, items } => {
            let mut vals = Vec::with_capacity(items.len());
            for item in items {
                vals.push(sc_eval_op(item, sc, fm)?);
            }
            sc_list(sc, fm, &vals, syntax)
        }
        Operation::IndexApp {
            syntax,
            base,
            index,
        } => {
            let basev = sc_eval_op(base, sc, fm)?;
            if !basev.ty.is_list() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("type {} cannot be indexed", basev.ty),
                ));
            }
            let elem = basev.ty.elem_type();
            let ix = sc_eval_op(index, sc, fm)?;
            if !ix.ty.is_num() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("index type {} is not a number", ix.ty),
                ));
            }
            sc.emit(elem, &format!("{basev}[int({ix})]"), syntax, fm)
        }
        Operation::Block { actions, body, .. } => {
            for action in actions {
                sc_exec_action(action, sc, fm)?;
            }
            sc_eval_op(body, sc, fm)
        }
        other => Err(sc_error(
            other.syntax(),
            fm,
            format!("operation not supported: {}", op_class_name(other)),
        )),
    }
}

fn op_class_name(op: &Operation) -> &'static str {
    match op {
        Operation::Constant { .. } => "Constant",
        Operation::LocalDataRef { .. } => "Local_Data_Ref",
        Operation::ModuleDataRef { .. } => "Module_Data_Ref",
        Operation::NonlocalDataRef { .. } => "Nonlocal_Data_Ref",
        Operation::SymbolicRef { .. } => "Symbolic_Ref",
        Operation::Call { .. } => "Call_Expr",
        Operation::Dot { .. } => "Dot_Expr",
        Operation::IndexApp { .. } => "Index_Expr",
        Operation::ListExpr { .. } => "List_Expr",
        Operation::RecordExpr { .. } => "Record_Expr",
        Operation::FieldSetter { .. } => "Field_Setter",
        Operation::StringExpr { .. } => "String_Expr",
        Operation::Spread { .. } => "Spread_Op",
        Operation::Unary { .. } => "Unary_Op_Expr",
        Operation::BinOp { .. } => "Binary_Op_Expr",
        Operation::Equal { .. } => "Equal_Expr",
        Operation::And { .. } => "And_Expr",
        Operation::Or { .. } => "Or_Expr",
        Operation::IfElse { .. } => "If_Else_Op",
        Operation::RangeGen { .. } => "Range_Gen",
        Operation::Block { .. } => "Block_Op",
        Operation::ForOp { .. } => "For_Op",
        Operation::WhileOp { .. } => "While_Op",
        Operation::Compound { .. } => "Compound_Op",
        Operation::DataSetter { .. } => "Data_Setter",
        Operation::FunctionSetter { .. } => "Function_Setter",
        Operation::IncludeSetter { .. } => "Include_Setter",
        Operation::LambdaExpr { .. } => "Lambda_Expr",
        Operation::ScopedModuleExpr { .. } => "Scoped_Module_Expr",
        Operation::EnumModuleExpr { .. } => "Enum_Module_Expr",
        Operation::TPathExpr { .. } => "TPath_Expr",
        Operation::Assign { .. } => "Assignment_Action",
    }
}

/// Statement support inside blocks: data setters bind SSA values to slots.
fn sc_exec_action(
    op: &Rc<Operation>,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
) -> Result<()> {
    match &**op {
        Operation::DataSetter {
            module_slot: None,
            pattern,
            definiens,
            ..
        } => {
            let v = sc_eval_op(definiens, sc, fm)?;
            bind_sc_param(pattern, &v, sc, fm)
        }
        other => Err(sc_error(
            other.syntax(),
            fm,
            format!("operation not supported: {}", op_class_name(other)),
        )),
    }
}

/// Bind a parameter pattern against an SSA value; list-pattern elements
/// are extracted into registers of their own. Used for the root function
/// parameter and for data setters inside blocks.
fn bind_sc_param(
    pattern: &Rc<Pattern>,
    value: &ScValue,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
) -> Result<()> {
    match &**pattern {
        Pattern::Skip { .. } => Ok(()),
        Pattern::Id { slot, .. } => {
            fm.slots[*slot] = Some(value.clone());
            Ok(())
        }
        Pattern::List { syntax, items } => {
            if !value.ty.is_list() || value.ty.count() as usize != items.len() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!(
                        "pattern expects {} elements, argument type is {}",
                        items.len(),
                        value.ty
                    ),
                ));
            }
            for (i, item) in items.iter().enumerate() {
                let elem = sc.emit(value.ty.elem_type(), &format!("{value}[{i}]"), syntax, fm)?;
                bind_sc_param(item, &elem, sc, fm)?;
            }
            Ok(())
        }
        Pattern::Record { syntax, .. } => Err(sc_error(
            syntax,
            fm,
            "record patterns are not supported".to_string(),
        )),
    }
}

fn resolve_const_function(func: &Rc<Operation>, fm: &ScFrame<'_>) -> Option<Value> {
    match &**func {
        Operation::Constant { value, .. } => Some(value.clone()),
        Operation::NonlocalDataRef { slot, .. } => {
            fm.nonlocals.as_ref().map(|nl| module_get(nl, *slot))
        }
        Operation::SymbolicRef { name, .. } => fm.nonlocals.as_ref().and_then(|nl| {
            nl.dict.get(name).map(|&slot| module_get(nl, slot))
        }),
        _ => None,
    }
}

/// Inline a call: closures get a child frame with patterns bound to SSA
/// values; builtins map to GLSL intrinsics.
fn sc_call(
    funv: &Value,
    arg: &Rc<Operation>,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    let Value::Ref(r) = funv else {
        return Err(sc_error(syntax, fm, format!("{funv}: not a function")));
    };
    match &**r {
        RefValue::Function(Function::Closure(closure)) => {
            sc_call_closure(closure, arg, sc, fm, syntax)
        }
        RefValue::Function(Function::Builtin(b)) => {
            let x = sc_eval_op(arg, sc, fm)?;
            let glsl = match b.name.as_str() {
                "sqrt" | "abs" | "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "exp"
                | "log" | "floor" | "ceil" | "round" | "trunc" => b.name.as_str(),
                _ => {
                    return Err(sc_error(
                        syntax,
                        fm,
                        format!("builtin {} is not supported", b.name),
                    ));
                }
            };
            if !x.ty.is_num_or_vec() {
                return Err(sc_error(
                    syntax,
                    fm,
                    format!("operand type {} is not numeric", x.ty),
                ));
            }
            let ty = x.ty.clone();
            sc.emit(ty, &format!("{glsl}({x})"), syntax, fm)
        }
        _ => Err(sc_error(syntax, fm, format!("{funv}: not a function"))),
    }
}

fn sc_call_closure(
    closure: &Closure,
    arg: &Rc<Operation>,
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    let mut slots = vec![None; closure.nslots];
    // Bind the parameter pattern in the caller's frame, then move the
    // result slots into the child frame.
    match &*closure.pattern {
        Pattern::Skip { .. } => {
            // Argument is still evaluated for effect-free typing.
            let _ = sc_eval_op(arg, sc, fm)?;
        }
        Pattern::Id { slot, .. } => {
            let v = sc_eval_op(arg, sc, fm)?;
            slots[*slot] = Some(v);
        }
        Pattern::List { items, .. } => {
            sc_bind_list(items, arg, &mut slots, sc, fm, syntax)?;
        }
        Pattern::Record { syntax: psyn, .. } => {
            return Err(sc_error(
                psyn,
                fm,
                "record patterns are not supported".to_string(),
            ));
        }
    }
    let mut child = ScFrame {
        root_context: None,
        parent: Some(&*fm),
        call_phrase: Some(Rc::clone(syntax)),
        nonlocals: Some(Rc::clone(&closure.nonlocals)),
        slots,
        op_cache: AHashMap::new(),
    };
    sc_eval_op(&closure.body, sc, &mut child)
}

fn sc_bind_list(
    items: &[Rc<Pattern>],
    arg: &Rc<Operation>,
    slots: &mut [Option<ScValue>],
    sc: &mut ScCompiler,
    fm: &mut ScFrame<'_>,
    syntax: &Rc<Phrase>,
) -> Result<()> {
    // `f[a,b]` with a literal list argument binds each element directly;
    // otherwise the argument is a vector whose components are extracted.
    if let Operation::ListExpr {
        items: arg_items, ..
    } = &**arg
        && arg_items.len() == items.len()
    {
        for (pat, arg_item) in items.iter().zip(arg_items.iter()) {
            let v = sc_eval_op(arg_item, sc, fm)?;
            match &**pat {
                Pattern::Skip { .. } => {}
                Pattern::Id { slot, .. } => slots[*slot] = Some(v),
                other => {
                    return Err(sc_error(
                        other.syntax(),
                        fm,
                        "pattern not supported".to_string(),
                    ));
                }
            }
        }
        return Ok(());
    }
    let argv = sc_eval_op(arg, sc, fm)?;
    if !argv.ty.is_list() || argv.ty.count() as usize != items.len() {
        return Err(sc_error(
            syntax,
            fm,
            format!(
                "pattern expects {} elements, argument type is {}",
                items.len(),
                argv.ty
            ),
        ));
    }
    for (i, pat) in items.iter().enumerate() {
        let elem = sc.emit(
            argv.ty.elem_type(),
            &format!("{argv}[{i}]"),
            syntax,
            fm,
        )?;
        match &**pat {
            Pattern::Skip { .. } => {}
            Pattern::Id { slot, .. } => slots[*slot] = Some(elem),
            other => {
                return Err(sc_error(
                    other.syntax(),
                    fm,
                    "pattern not supported".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Emit a constant into the constants buffer, memoised by value.
pub fn sc_eval_const(
    sc: &mut ScCompiler,
    fm: &ScFrame<'_>,
    value: &Value,
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    if let Some(cached) = sc.valcache.get(&ValKey(value.clone())) {
        return Ok(cached.clone());
    }
    if let Value::Ref(r) = value
        && let RefValue::Reactive(re) = &**r
    {
        return match re {
            Reactive::Uniform(u) => {
                let ty = u.ty.clone();
                if !sc.uniforms.iter().any(|(n, _)| n == &u.name) {
                    sc.uniforms.push((u.name.clone(), ty.clone()));
                }
                let v = sc.emit(ty, u.name.as_str(), syntax, fm)?;
                Ok(v)
            }
            Reactive::Expr(e) => {
                // A reactive expression compiles like any other operation,
                // in a frame of its own (it captures no locals).
                let mut child = ScFrame {
                    root_context: None,
                    parent: Some(fm),
                    call_phrase: Some(Rc::clone(syntax)),
                    nonlocals: None,
                    slots: Vec::new(),
                    op_cache: AHashMap::new(),
                };
                sc_eval_op(&e.expr, sc, &mut child)
            }
        };
    }
    let ty = sc_type_of(value);
    if ty.is_error() {
        return Err(sc_error(
            syntax,
            fm,
            format!("value {value} is not supported"),
        ));
    }
    let mut rhs = String::new();
    write_const(&mut rhs, value, &ty);
    let was_in_constants = sc.in_constants;
    sc.in_constants = true;
    let v = sc.emit(ty, &rhs, syntax, fm);
    sc.in_constants = was_in_constants;
    let v = v?;
    sc.valcache.insert(ValKey(value.clone()), v.clone());
    Ok(v)
}

fn write_const(out: &mut String, value: &Value, ty: &ScType) {
    match value {
        Value::Num(n) => {
            let _ = write!(out, "{}", glsl_num(*n));
        }
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Ref(r) => {
            if let RefValue::List(items) = &**r {
                let _ = write!(out, "{}(", ty.glsl_name().unwrap_or("float"));
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    match item {
                        Value::Num(n) => {
                            let _ = write!(out, "{}", glsl_num(*n));
                        }
                        nested => {
                            // Matrices flatten their column vectors.
                            let nested_ty = sc_type_of(nested);
                            let mut inner = String::new();
                            write_const(&mut inner, nested, &nested_ty);
                            out.push_str(&inner);
                        }
                    }
                }
                out.push(')');
            }
        }
        _ => {}
    }
}

/// Format a number as a GLSL float literal: always with a decimal point.
fn glsl_num(n: f64) -> String {
    if n == n.trunc() && n.is_finite() && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(n).to_string()
    }
}

/// Promote a scalar to a wider plex type by constructor, when needed.
fn sc_extend(
    sc: &mut ScCompiler,
    fm: &ScFrame<'_>,
    v: ScValue,
    ty: &ScType,
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    if &v.ty == ty {
        return Ok(v);
    }
    let name = ty.glsl_name().expect("plex target");
    sc.emit(ty.clone(), &format!("{name}({v})"), syntax, fm)
}

fn sc_binop(
    sc: &mut ScCompiler,
    fm: &ScFrame<'_>,
    prim: BinaryPrim,
    x: &ScValue,
    y: &ScValue,
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    let unified = sc_unify_tensor_types(&x.ty, &y.ty);
    if unified.is_error() || !unified.is_num_plex() {
        return Err(sc_error(
            syntax,
            fm,
            format!(
                "operand types {} and {} do not unify for {}",
                x.ty,
                y.ty,
                prim.name()
            ),
        ));
    }
    match prim {
        BinaryPrim::Add | BinaryPrim::Sub | BinaryPrim::Div => sc.emit(
            unified,
            &format!("{x} {} {y}", prim.name()),
            syntax,
            fm,
        ),
        BinaryPrim::Mul => {
            // `*` is elementwise in Curv; GLSL `*` on matrices is linear-
            // algebra product, so matrices use matrixCompMult.
            if x.ty.is_mat() && y.ty.is_mat() {
                sc.emit(unified, &format!("matrixCompMult({x}, {y})"), syntax, fm)
            } else {
                sc.emit(unified, &format!("{x} * {y}"), syntax, fm)
            }
        }
        BinaryPrim::Pow => {
            let x2 = sc_extend(sc, fm, x.clone(), &unified, syntax)?;
            let y2 = sc_extend(sc, fm, y.clone(), &unified, syntax)?;
            sc.emit(unified, &format!("pow({x2}, {y2})"), syntax, fm)
        }
        BinaryPrim::Less
        | BinaryPrim::LessOrEqual
        | BinaryPrim::Greater
        | BinaryPrim::GreaterOrEqual => {
            if x.ty.is_num() && y.ty.is_num() {
                sc.emit(ScType::bool(), &format!("{x} {} {y}", prim.name()), syntax, fm)
            } else {
                let fn_name = match prim {
                    BinaryPrim::Less => "lessThan",
                    BinaryPrim::LessOrEqual => "lessThanEqual",
                    BinaryPrim::Greater => "greaterThan",
                    _ => "greaterThanEqual",
                };
                let count = unified.count();
                let x2 = sc_extend(sc, fm, x.clone(), &unified, syntax)?;
                let y2 = sc_extend(sc, fm, y.clone(), &unified, syntax)?;
                let bool_vec = ScType::list(&ScType::bool(), count);
                sc.emit(bool_vec, &format!("{fn_name}({x2}, {y2})"), syntax, fm)
            }
        }
        BinaryPrim::Cat => Err(sc_error(
            syntax,
            fm,
            "operation not supported: Cat_Expr".to_string(),
        )),
    }
}

fn sc_list(
    sc: &mut ScCompiler,
    fm: &ScFrame<'_>,
    vals: &[ScValue],
    syntax: &Rc<Phrase>,
) -> Result<ScValue> {
    if vals.is_empty() {
        return Err(sc_error(
            syntax,
            fm,
            "empty lists are not supported".to_string(),
        ));
    }
    let elem = vals[0].ty.clone();
    for v in &vals[1..] {
        if v.ty != elem {
            return Err(sc_error(
                syntax,
                fm,
                format!("list elements of types {} and {} do not agree", elem, v.ty),
            ));
        }
    }
    let ty = ScType::list(&elem, vals.len() as u32);
    let Some(ctor) = ty.glsl_name() else {
        return Err(sc_error(
            syntax,
            fm,
            format!("type {ty} has no GPU representation"),
        ));
    };
    let args: Vec<String> = vals.iter().map(ToString::to_string).collect();
    sc.emit(ty.clone(), &format!("{ctor}({})", args.join(",")), syntax, fm)
}
