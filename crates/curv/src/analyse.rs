//! Semantic analysis: name resolution, slot assignment, captures.
//!
//! Analysis walks the phrase tree with an environment stack. Scope levels
//! hold bindings; lambda levels mark frame boundaries and record the
//! nonlocals their closures capture; function-unit levels route captures
//! into the shared nonlocals of a recursive function group (see
//! `crate::scope`).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::{AtPhrase, Context};
use crate::error::Result;
use crate::frame::{Frame, tail_eval_frame};
use crate::meaning::{Operation, StringOpSeg};
use crate::pattern::make_pattern;
use crate::phrase::{Phrase, StringSeg};
use crate::prim::{BinaryPrim, UnaryPrim};
use crate::scope::{self, RecScope};
use crate::source::TokenKind;
use crate::symbol::Symbol;
use crate::system::SourceState;
use crate::value::Value;

/// How to interpret a phrase relative to its environment.
///
/// `edepth` is the number of nested binding scopes out of which a `:=`
/// statement may reach. Compound phrases with no defined evaluation order
/// give their children an edepth of 0, which statically prevents a pure
/// expression from observing assignment order; sequential phrases
/// propagate; binding forms deepen by one for their body.
#[derive(Debug, Clone, Copy)]
pub struct Interp {
    edepth: u32,
    is_expr: bool,
}

impl Interp {
    pub fn expr() -> Self {
        Self {
            edepth: 0,
            is_expr: true,
        }
    }

    pub fn stmt(edepth: u32) -> Self {
        Self {
            edepth,
            is_expr: false,
        }
    }

    pub fn edepth(self) -> u32 {
        self.edepth
    }

    pub fn is_expr(self) -> bool {
        self.is_expr
    }

    pub fn deepen(self) -> Self {
        Self {
            edepth: self.edepth + 1,
            is_expr: self.is_expr,
        }
    }

    pub fn to_expr(self) -> Self {
        Self {
            edepth: self.edepth,
            is_expr: true,
        }
    }

    pub fn to_stmt(self) -> Self {
        Self {
            edepth: self.edepth,
            is_expr: false,
        }
    }
}

/// A named local binding. `is_mutable` is stamped by the first use of the
/// name on the left of `:=`.
#[derive(Debug)]
pub struct ScopedVariable {
    pub is_mutable: Cell<bool>,
}

#[derive(Debug)]
pub struct Binding {
    pub slot: usize,
    pub unit: usize,
    pub variable: Rc<ScopedVariable>,
}

/// A sequential scope: `local` definitions, lambda parameters, `for`
/// patterns. Each unit only sees previously bound names.
#[derive(Debug, Default)]
pub struct SeqScope {
    pub bindings: IndexMap<Symbol, Binding>,
    pub saved_nslots: usize,
}

/// Capture state of a lambda under analysis. A shared lambda (the right
/// side of a recursive function definition) does not capture for itself;
/// its nonlocals dictionary is assembled later by the function setter.
#[derive(Debug)]
pub struct LambdaCapture {
    pub shared: bool,
    pub dict: IndexMap<Symbol, usize>,
    pub exprs: Vec<Rc<Operation>>,
    saved_nslots: usize,
    saved_maxslots: usize,
}

impl LambdaCapture {
    /// Frame counters of the enclosing frame, saved when this boundary was
    /// pushed. The scope system borrows and updates them when analysis
    /// re-enters the outer frame through a recursive-scope lookup.
    pub fn saved_nslots(&self) -> usize {
        self.saved_nslots
    }

    pub fn saved_maxslots(&self) -> usize {
        self.saved_maxslots
    }

    pub fn update_saved(&mut self, nslots: usize, maxslots: usize) {
        self.saved_nslots = nslots;
        self.saved_maxslots = maxslots;
    }
}

#[derive(Clone)]
pub enum Level {
    Builtin,
    Seq(Rc<RefCell<SeqScope>>),
    Rec(Rc<RefCell<RecScope>>),
    Lambda(Rc<RefCell<LambdaCapture>>),
    /// Marks that a recursive-scope function unit is being analysed;
    /// everything it references from outside becomes a shared nonlocal.
    FuncUnit(Rc<RefCell<RecScope>>, usize),
}

pub struct Env {
    pub sstate: Rc<SourceState>,
    pub levels: Vec<Level>,
    pub frame_nslots: usize,
    pub frame_maxslots: usize,
}

impl Env {
    pub fn new(sstate: Rc<SourceState>) -> Self {
        Self {
            sstate,
            levels: vec![Level::Builtin],
            frame_nslots: 0,
            frame_maxslots: 0,
        }
    }

    pub fn make_slot(&mut self) -> usize {
        let slot = self.frame_nslots;
        self.frame_nslots += 1;
        if self.frame_maxslots < self.frame_nslots {
            self.frame_maxslots = self.frame_nslots;
        }
        slot
    }

    pub fn push_seq(&mut self) -> Rc<RefCell<SeqScope>> {
        let scope = Rc::new(RefCell::new(SeqScope {
            bindings: IndexMap::new(),
            saved_nslots: self.frame_nslots,
        }));
        self.levels.push(Level::Seq(Rc::clone(&scope)));
        scope
    }

    /// Pop a sequential scope; its slots may be reused by siblings.
    pub fn pop_seq(&mut self, scope: &Rc<RefCell<SeqScope>>) {
        self.levels.pop();
        self.frame_nslots = scope.borrow().saved_nslots;
    }

    pub fn push_lambda(&mut self, shared: bool) -> Rc<RefCell<LambdaCapture>> {
        let capture = Rc::new(RefCell::new(LambdaCapture {
            shared,
            dict: IndexMap::new(),
            exprs: Vec::new(),
            saved_nslots: self.frame_nslots,
            saved_maxslots: self.frame_maxslots,
        }));
        self.levels.push(Level::Lambda(Rc::clone(&capture)));
        self.frame_nslots = 0;
        self.frame_maxslots = 0;
        capture
    }

    /// Pop a lambda boundary, returning the size of its call frame.
    pub fn pop_lambda(&mut self, capture: &Rc<RefCell<LambdaCapture>>) -> usize {
        self.levels.pop();
        let nslots = self.frame_maxslots;
        let c = capture.borrow();
        self.frame_nslots = c.saved_nslots;
        self.frame_maxslots = c.saved_maxslots;
        nslots
    }

    /// Resolve a name to its meaning, assigning nonlocal slots and
    /// recording captures along the way.
    pub fn lookup(&mut self, id: &Rc<Phrase>, name: &Symbol) -> Result<Rc<Operation>> {
        self.lookup_from(self.levels.len(), id, name)
    }

    fn lookup_from(
        &mut self,
        from: usize,
        id: &Rc<Phrase>,
        name: &Symbol,
    ) -> Result<Rc<Operation>> {
        let mut idx = from;
        while idx > 0 {
            idx -= 1;
            match self.levels[idx].clone() {
                Level::Builtin => {
                    if let Some(value) = self.sstate.system.std_namespace.get(name) {
                        return Ok(Rc::new(Operation::Constant {
                            syntax: Rc::clone(id),
                            value: value.clone(),
                        }));
                    }
                    return Err(
                        AtPhrase::analysing(Rc::clone(id)).error(format!("{name}: not defined"))
                    );
                }
                Level::Seq(scope) => {
                    if let Some(b) = scope.borrow().bindings.get(name) {
                        return Ok(Rc::new(Operation::LocalDataRef {
                            syntax: Rc::clone(id),
                            slot: b.slot,
                        }));
                    }
                }
                Level::Rec(scope) => {
                    let found = scope.borrow().bindings.get(name).map(|b| (b.slot, b.unit));
                    if let Some((slot, unit)) = found {
                        scope::trigger_unit(self, idx, &scope, unit, Some(id))?;
                        let target_is_module = scope.borrow().target_is_module;
                        return Ok(Rc::new(if target_is_module {
                            Operation::ModuleDataRef {
                                syntax: Rc::clone(id),
                                module_slot: scope
                                    .borrow()
                                    .module_slot
                                    .expect("module scope has a module slot"),
                                slot,
                            }
                        } else {
                            Operation::LocalDataRef {
                                syntax: Rc::clone(id),
                                slot,
                            }
                        }));
                    }
                }
                Level::Lambda(capture) => {
                    let inner = self.lookup_from(idx, id, name)?;
                    if capture.borrow().shared {
                        // Constants and symbolic refs pass through; the
                        // shared dictionary resolves the rest at run time.
                        return Ok(inner);
                    }
                    if let Operation::Constant { .. } = &*inner {
                        return Ok(inner);
                    }
                    let mut c = capture.borrow_mut();
                    let slot = match c.dict.get(name) {
                        Some(&slot) => slot,
                        None => {
                            let slot = c.dict.len();
                            c.dict.insert(name.clone(), slot);
                            c.exprs.push(inner);
                            slot
                        }
                    };
                    return Ok(Rc::new(Operation::NonlocalDataRef {
                        syntax: Rc::clone(id),
                        slot,
                    }));
                }
                Level::FuncUnit(scope, unit) => {
                    let inner = self.lookup_from(idx, id, name)?;
                    if let Operation::Constant { .. } = &*inner {
                        return Ok(inner);
                    }
                    scope.borrow_mut().units[unit]
                        .nonlocals
                        .insert(name.clone(), inner);
                    return Ok(Rc::new(Operation::SymbolicRef {
                        syntax: Rc::clone(id),
                        name: name.clone(),
                    }));
                }
            }
        }
        Err(AtPhrase::analysing(Rc::clone(id)).error(format!("{name}: not defined")))
    }

    /// Resolve the base of a locative. Only bindings within `edepth`
    /// enclosing scopes are assignable; module fields never are.
    pub fn lookup_lvar(&mut self, id: &Rc<Phrase>, name: &Symbol, edepth: u32) -> Result<usize> {
        let mut crossed = 0u32;
        for idx in (0..self.levels.len()).rev() {
            match self.levels[idx].clone() {
                Level::Builtin => break,
                Level::Seq(scope) => {
                    if let Some(b) = scope.borrow().bindings.get(name) {
                        if crossed >= edepth {
                            return Err(AtPhrase::analysing(Rc::clone(id))
                                .error(format!("{name}: not assignable here")));
                        }
                        b.variable.is_mutable.set(true);
                        return Ok(b.slot);
                    }
                    crossed += 1;
                }
                Level::Rec(scope) => {
                    let s = scope.borrow();
                    if let Some(b) = s.bindings.get(name) {
                        if s.target_is_module {
                            return Err(AtPhrase::analysing(Rc::clone(id))
                                .error(format!("{name}: not assignable")));
                        }
                        if crossed >= edepth {
                            return Err(AtPhrase::analysing(Rc::clone(id))
                                .error(format!("{name}: not assignable here")));
                        }
                        b.variable.is_mutable.set(true);
                        return Ok(b.slot);
                    }
                    crossed += 1;
                }
                // Assignment cannot reach through a function boundary.
                Level::Lambda(_) | Level::FuncUnit(..) => break,
            }
        }
        Err(AtPhrase::analysing(Rc::clone(id)).error(format!("{name}: not a locative")))
    }
}

/// Analyse a phrase into an operation.
pub fn analyse_op(phrase: &Rc<Phrase>, env: &mut Env, interp: Interp) -> Result<Rc<Operation>> {
    match &**phrase {
        Phrase::Ident { symbol, .. } => env.lookup(phrase, symbol),
        Phrase::Numeral { loc } => {
            let n: f64 = loc.text().parse().map_err(|_| {
                AtPhrase::analysing(Rc::clone(phrase)).error("bad numeral".to_string())
            })?;
            Ok(Rc::new(Operation::Constant {
                syntax: Rc::clone(phrase),
                value: Value::Num(n),
            }))
        }
        Phrase::HexNumeral { loc } => {
            let digits = &loc.text()[2..];
            let n = u64::from_str_radix(digits, 16).map_err(|_| {
                AtPhrase::analysing(Rc::clone(phrase)).error("bad numeral".to_string())
            })?;
            Ok(Rc::new(Operation::Constant {
                syntax: Rc::clone(phrase),
                value: Value::Num(n as f64),
            }))
        }
        Phrase::SymbolLit { symbol, .. } => Ok(Rc::new(Operation::Constant {
            syntax: Rc::clone(phrase),
            value: Value::from_symbol_name(symbol.as_str()),
        })),
        Phrase::StringLit { loc, segments } => {
            let mut segs = Vec::with_capacity(segments.len());
            for seg in segments {
                segs.push(match seg {
                    StringSeg::Text(tok) => {
                        let text =
                            &loc.source().text[tok.first as usize..tok.last as usize];
                        StringOpSeg::Literal(text.as_bytes().to_vec())
                    }
                    StringSeg::Newline(_) => StringOpSeg::Literal(vec![b'\n']),
                    StringSeg::CharEscape(tok) => {
                        let text =
                            &loc.source().text[tok.first as usize..tok.last as usize];
                        // `$.` contributes `$`; `$=` contributes `"`.
                        StringOpSeg::Literal(vec![if text.ends_with('=') {
                            b'"'
                        } else {
                            b'$'
                        }])
                    }
                    StringSeg::Ident(tok) => {
                        let text =
                            &loc.source().text[tok.first as usize + 1..tok.last as usize];
                        let sym = Symbol::new(text);
                        let id = Rc::new(Phrase::Ident {
                            loc: crate::source::SrcLoc::new(Rc::clone(loc.source()), *tok),
                            symbol: sym.clone(),
                        });
                        StringOpSeg::Str(env.lookup(&id, &sym)?)
                    }
                    StringSeg::Brace(sub) => {
                        StringOpSeg::Str(analyse_op(sub, env, Interp::expr())?)
                    }
                    StringSeg::Paren(sub) => {
                        StringOpSeg::Repr(analyse_op(sub, env, Interp::expr())?)
                    }
                    StringSeg::Bracket(sub) => {
                        StringOpSeg::Chars(analyse_op(sub, env, Interp::expr())?)
                    }
                });
            }
            Ok(Rc::new(Operation::StringExpr {
                syntax: Rc::clone(phrase),
                segments: segs,
            }))
        }
        Phrase::Unary { op, arg, .. } => match op.kind {
            TokenKind::Minus => unary(phrase, UnaryPrim::Neg, arg, env),
            TokenKind::Plus => unary(phrase, UnaryPrim::Pos, arg, env),
            TokenKind::Not => unary(phrase, UnaryPrim::Not, arg, env),
            TokenKind::Ellipsis => Ok(Rc::new(Operation::Spread {
                syntax: Rc::clone(phrase),
                arg: analyse_op(arg, env, Interp::expr())?,
            })),
            _ => Err(AtPhrase::analysing(Rc::clone(phrase))
                .error("unknown unary operator".to_string())),
        },
        Phrase::Binary { left, op, right } => match op.kind {
            TokenKind::Plus => binop(phrase, BinaryPrim::Add, left, right, env),
            TokenKind::Minus => binop(phrase, BinaryPrim::Sub, left, right, env),
            TokenKind::Times => binop(phrase, BinaryPrim::Mul, left, right, env),
            TokenKind::Over => binop(phrase, BinaryPrim::Div, left, right, env),
            TokenKind::Power => binop(phrase, BinaryPrim::Pow, left, right, env),
            TokenKind::PlusPlus => binop(phrase, BinaryPrim::Cat, left, right, env),
            TokenKind::Less => binop(phrase, BinaryPrim::Less, left, right, env),
            TokenKind::LessOrEqual => binop(phrase, BinaryPrim::LessOrEqual, left, right, env),
            TokenKind::Greater => binop(phrase, BinaryPrim::Greater, left, right, env),
            TokenKind::GreaterOrEqual => {
                binop(phrase, BinaryPrim::GreaterOrEqual, left, right, env)
            }
            TokenKind::Equal | TokenKind::NotEqual => Ok(Rc::new(Operation::Equal {
                syntax: Rc::clone(phrase),
                left: analyse_op(left, env, Interp::expr())?,
                right: analyse_op(right, env, Interp::expr())?,
                negate: op.kind == TokenKind::NotEqual,
            })),
            TokenKind::And => Ok(Rc::new(Operation::And {
                syntax: Rc::clone(phrase),
                left: analyse_op(left, env, Interp::expr())?,
                right: analyse_op(right, env, Interp::expr())?,
            })),
            TokenKind::Or => Ok(Rc::new(Operation::Or {
                syntax: Rc::clone(phrase),
                left: analyse_op(left, env, Interp::expr())?,
                right: analyse_op(right, env, Interp::expr())?,
            })),
            TokenKind::Colon => {
                let name = analyse_field_name(left, env)?;
                Ok(Rc::new(Operation::FieldSetter {
                    syntax: Rc::clone(phrase),
                    name,
                    value: analyse_op(right, env, Interp::expr())?,
                }))
            }
            TokenKind::Assign => analyse_assignment(phrase, left, right, env, interp),
            TokenKind::Equate => Err(AtPhrase::analysing(Rc::clone(phrase))
                .error("a definition is not allowed in this context".to_string())),
            _ => Err(AtPhrase::analysing(Rc::clone(phrase))
                .error("unknown binary operator".to_string())),
        },
        Phrase::Range {
            first, op, last, step,
        } => Ok(Rc::new(Operation::RangeGen {
            syntax: Rc::clone(phrase),
            first: analyse_op(first, env, Interp::expr())?,
            last: analyse_op(last, env, Interp::expr())?,
            step: match step {
                Some(s) => Some(analyse_op(s, env, Interp::expr())?),
                None => None,
            },
            open: op.kind == TokenKind::OpenRange,
        })),
        Phrase::Lambda { pattern, body, .. } => {
            analyse_lambda(phrase, pattern, body, env, false, None)
        }
        Phrase::Call { func, arg } => Ok(Rc::new(Operation::Call {
            syntax: Rc::clone(phrase),
            func: analyse_op(func, env, Interp::expr())?,
            arg: analyse_op(arg, env, Interp::expr())?,
        })),
        Phrase::IndexApp { base, index, .. } => Ok(Rc::new(Operation::IndexApp {
            syntax: Rc::clone(phrase),
            base: analyse_op(base, env, Interp::expr())?,
            index: analyse_op(index, env, Interp::expr())?,
        })),
        Phrase::Dot { base, member, .. } => {
            let name = match &**member {
                Phrase::Ident { symbol, .. } => symbol.clone(),
                _ => {
                    return Err(AtPhrase::analysing(Rc::clone(member))
                        .error("not a field name".to_string()));
                }
            };
            Ok(Rc::new(Operation::Dot {
                syntax: Rc::clone(phrase),
                base: analyse_op(base, env, Interp::expr())?,
                name,
            }))
        }
        Phrase::Paren { body, .. } => match body {
            None => Ok(Rc::new(Operation::ListExpr {
                syntax: Rc::clone(phrase),
                items: Vec::new(),
            })),
            Some(body) => match &**body {
                Phrase::Comma { items, .. } => analyse_list(phrase, items, env, interp),
                Phrase::Semicolon { items, .. } => {
                    analyse_block(phrase, items, env, interp)
                }
                _ => analyse_op(body, env, interp),
            },
        },
        Phrase::Bracket { body, .. } => match body {
            None => Ok(Rc::new(Operation::ListExpr {
                syntax: Rc::clone(phrase),
                items: Vec::new(),
            })),
            Some(body) => {
                let items = body.items();
                analyse_list(phrase, &items, env, interp)
            }
        },
        Phrase::Brace { body, .. } => match body {
            None => Ok(Rc::new(Operation::RecordExpr {
                syntax: Rc::clone(phrase),
                items: Vec::new(),
            })),
            Some(body) if body.is_definition() => {
                scope::analyse_module_expr(body, phrase, env)
            }
            Some(body) => {
                let mut items = Vec::new();
                for item in body.items() {
                    items.push(analyse_record_item(&item, env)?);
                }
                Ok(Rc::new(Operation::RecordExpr {
                    syntax: Rc::clone(phrase),
                    items,
                }))
            }
        },
        Phrase::Comma { items, .. } => analyse_list(phrase, items, env, interp),
        Phrase::Semicolon { items, .. } => analyse_block(phrase, items, env, interp),
        Phrase::IfElse {
            cond,
            then_part,
            else_part,
            ..
        } => {
            if interp.is_expr() && else_part.is_none() {
                return Err(AtPhrase::analysing(Rc::clone(phrase))
                    .error("if without else: not an expression".to_string()));
            }
            Ok(Rc::new(Operation::IfElse {
                syntax: Rc::clone(phrase),
                cond: analyse_op(cond, env, Interp::expr())?,
                then_part: analyse_op(then_part, env, interp)?,
                else_part: match else_part {
                    Some(e) => Some(analyse_op(e, env, interp)?),
                    None => None,
                },
            }))
        }
        Phrase::Let { defs, body, .. } | Phrase::Parametric { defs, body, .. } => {
            scope::analyse_rec_block(defs, body, phrase, env, interp)
        }
        Phrase::Do { actions, body, .. } => {
            let mut items = actions.items();
            items.push(Rc::clone(body));
            analyse_block(phrase, &items, env, interp)
        }
        Phrase::ForLoop {
            pattern,
            sequence,
            body,
            ..
        } => {
            let sequence = analyse_op(sequence, env, Interp::expr())?;
            let seq_scope = env.push_seq();
            let pat = {
                let scope = Rc::clone(&seq_scope);
                make_pattern(pattern, &mut |name, ph| {
                    let slot = env.make_slot();
                    let mut s = scope.borrow_mut();
                    if s.bindings.contains_key(&name) {
                        return Err(AtPhrase::analysing(Rc::clone(ph))
                            .error(format!("{name}: multiply defined")));
                    }
                    s.bindings.insert(
                        name,
                        Binding {
                            slot,
                            unit: 0,
                            variable: Rc::new(ScopedVariable {
                                is_mutable: Cell::new(false),
                            }),
                        },
                    );
                    Ok(slot)
                })
            };
            let pat = match pat {
                Ok(p) => p,
                Err(e) => {
                    env.pop_seq(&seq_scope);
                    return Err(e);
                }
            };
            let body_op = analyse_op(body, env, interp.to_stmt().deepen());
            env.pop_seq(&seq_scope);
            Ok(Rc::new(Operation::ForOp {
                syntax: Rc::clone(phrase),
                pattern: pat,
                sequence,
                body: body_op?,
            }))
        }
        Phrase::WhileLoop { cond, body, .. } => Ok(Rc::new(Operation::WhileOp {
            syntax: Rc::clone(phrase),
            cond: analyse_op(cond, env, Interp::expr())?,
            body: analyse_op(body, env, interp.to_stmt().deepen())?,
        })),
        Phrase::Local { .. } => Err(AtPhrase::analysing(Rc::clone(phrase))
            .error("local definition is not allowed in this context".to_string())),
        Phrase::Include { .. } => Err(AtPhrase::analysing(Rc::clone(phrase))
            .error("include is not allowed in this context".to_string())),
        Phrase::Test { arg, .. } => analyse_op(arg, env, Interp::stmt(0)),
    }
}

fn unary(
    phrase: &Rc<Phrase>,
    prim: UnaryPrim,
    arg: &Rc<Phrase>,
    env: &mut Env,
) -> Result<Rc<Operation>> {
    Ok(Rc::new(Operation::Unary {
        syntax: Rc::clone(phrase),
        prim,
        arg: analyse_op(arg, env, Interp::expr())?,
    }))
}

fn binop(
    phrase: &Rc<Phrase>,
    prim: BinaryPrim,
    left: &Rc<Phrase>,
    right: &Rc<Phrase>,
    env: &mut Env,
) -> Result<Rc<Operation>> {
    Ok(Rc::new(Operation::BinOp {
        syntax: Rc::clone(phrase),
        prim,
        left: analyse_op(left, env, Interp::expr())?,
        right: analyse_op(right, env, Interp::expr())?,
    }))
}

/// Record constructor items: `name: value` bindings and `...record`
/// spreads.
fn analyse_record_item(item: &Rc<Phrase>, env: &mut Env) -> Result<Rc<Operation>> {
    match &**item {
        Phrase::Binary { op, .. } if op.kind == TokenKind::Colon => {
            analyse_op(item, env, Interp::stmt(0))
        }
        Phrase::Unary { op, .. } if op.kind == TokenKind::Ellipsis => {
            analyse_op(item, env, Interp::stmt(0))
        }
        // A bare identifier is shorthand for `name: name`.
        Phrase::Ident { symbol, .. } => {
            let value = env.lookup(item, symbol)?;
            Ok(Rc::new(Operation::FieldSetter {
                syntax: Rc::clone(item),
                name: Rc::new(Operation::Constant {
                    syntax: Rc::clone(item),
                    value: Value::symbol(symbol.clone()),
                }),
                value,
            }))
        }
        _ => analyse_op(item, env, Interp::stmt(0)),
    }
}

/// The field-name part of `name: value`: an identifier or symbol denotes
/// itself, anything else must evaluate to a symbol.
fn analyse_field_name(left: &Rc<Phrase>, env: &mut Env) -> Result<Rc<Operation>> {
    match &*left.skip_parens() {
        Phrase::Ident { symbol, .. } | Phrase::SymbolLit { symbol, .. } => {
            Ok(Rc::new(Operation::Constant {
                syntax: Rc::clone(left),
                value: Value::symbol(symbol.clone()),
            }))
        }
        _ => analyse_op(left, env, Interp::expr()),
    }
}

/// Analyse the items of a list constructor. Items are generators executed
/// in order; `local` is not among them.
fn analyse_list(
    phrase: &Rc<Phrase>,
    items: &[Rc<Phrase>],
    env: &mut Env,
    interp: Interp,
) -> Result<Rc<Operation>> {
    let mut ops = Vec::with_capacity(items.len());
    for item in items {
        ops.push(analyse_op(item, env, interp.to_stmt())?);
    }
    Ok(Rc::new(Operation::ListExpr {
        syntax: Rc::clone(phrase),
        items: ops,
    }))
}

/// Analyse a statement sequence ending in an expression: parenthesised
/// `(a; b; c)` and `do ... in body`. `local` definitions open a sequential
/// scope covering the following statements and the body.
pub fn analyse_block(
    phrase: &Rc<Phrase>,
    items: &[Rc<Phrase>],
    env: &mut Env,
    interp: Interp,
) -> Result<Rc<Operation>> {
    let (body, stmts) = items.split_last().ok_or_else(|| {
        AtPhrase::analysing(Rc::clone(phrase)).error("empty block".to_string())
    })?;
    let seq = env.push_seq();
    let deep = interp.deepen();
    let result = (|| {
        let mut actions = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match &**stmt {
                Phrase::Local { def, .. } => {
                    actions.push(scope::analyse_local_def(def, env, &seq, deep)?);
                }
                _ => actions.push(analyse_op(stmt, env, deep.to_stmt())?),
            }
        }
        let body_op = match &**body {
            Phrase::Local { def, .. } => {
                // A trailing local is a statement; the block produces no
                // value, which only statement contexts accept.
                scope::analyse_local_def(def, env, &seq, deep)?
            }
            _ => analyse_op(body, env, deep)?,
        };
        Ok(Rc::new(Operation::Block {
            syntax: Rc::clone(phrase),
            actions,
            body: body_op,
        }))
    })();
    env.pop_seq(&seq);
    result
}

/// `lhs := rhs`. Dotted and indexed accesses flatten into one index path
/// over a base slot; a parenthesised tuple of locatives over one base
/// becomes a list-shaped index.
fn analyse_assignment(
    phrase: &Rc<Phrase>,
    left: &Rc<Phrase>,
    right: &Rc<Phrase>,
    env: &mut Env,
    interp: Interp,
) -> Result<Rc<Operation>> {
    if interp.is_expr() {
        return Err(AtPhrase::analysing(Rc::clone(phrase))
            .error("an assignment is not an expression".to_string()));
    }
    let expr = analyse_op(right, env, Interp::expr())?;
    let lhs = left.skip_parens();
    if let Phrase::Comma { items, .. } = &*lhs {
        // (r.a, r.b) := (10, 20): one amend with a list-shaped index.
        let mut slot = None;
        let mut paths = Vec::with_capacity(items.len());
        for item in items {
            let (s, path) = analyse_locative(item, env, interp.edepth())?;
            match slot {
                None => slot = Some(s),
                Some(prev) if prev == s => {}
                Some(_) => {
                    return Err(AtPhrase::analysing(Rc::clone(item)).error(
                        "all targets of a tuple assignment must share one variable"
                            .to_string(),
                    ));
                }
            }
            paths.push(path);
        }
        let slot = slot.ok_or_else(|| {
            AtPhrase::analysing(Rc::clone(left)).error("not a locative".to_string())
        })?;
        return Ok(Rc::new(Operation::Assign {
            syntax: Rc::clone(phrase),
            slot,
            index: Some(Rc::new(Operation::ListExpr {
                syntax: Rc::clone(left),
                items: paths,
            })),
            expr,
        }));
    }
    let (slot, path) = analyse_locative(&lhs, env, interp.edepth())?;
    let index = match &*path {
        Operation::TPathExpr { indexes, .. } if indexes.is_empty() => None,
        _ => Some(path),
    };
    Ok(Rc::new(Operation::Assign {
        syntax: Rc::clone(phrase),
        slot,
        index,
        expr,
    }))
}

/// Flatten a locative phrase into (base slot, index path expression).
fn analyse_locative(
    phrase: &Rc<Phrase>,
    env: &mut Env,
    edepth: u32,
) -> Result<(usize, Rc<Operation>)> {
    let mut indexes_rev: Vec<Rc<Operation>> = Vec::new();
    let mut base = phrase.skip_parens();
    loop {
        match &*Rc::clone(&base) {
            Phrase::Dot { base: b, member, .. } => {
                let Phrase::Ident { symbol, .. } = &**member else {
                    return Err(AtPhrase::analysing(Rc::clone(member))
                        .error("not a field name".to_string()));
                };
                indexes_rev.push(Rc::new(Operation::Constant {
                    syntax: Rc::clone(member),
                    value: Value::symbol(symbol.clone()),
                }));
                base = b.skip_parens();
            }
            Phrase::IndexApp { base: b, index, .. } => {
                indexes_rev.push(analyse_op(index, env, Interp::expr())?);
                base = b.skip_parens();
            }
            Phrase::Ident { symbol, .. } => {
                let slot = env.lookup_lvar(&base, symbol, edepth)?;
                let indexes: Vec<Rc<Operation>> = indexes_rev.into_iter().rev().collect();
                return Ok((
                    slot,
                    Rc::new(Operation::TPathExpr {
                        syntax: Rc::clone(phrase),
                        indexes,
                    }),
                ));
            }
            _ => {
                return Err(AtPhrase::analysing(Rc::clone(&base))
                    .error("not a locative".to_string()));
            }
        }
    }
}

/// Analyse a lambda. A shared lambda belongs to a recursive function
/// definition: it does not capture its own nonlocals, and its body's free
/// names resolve through the function group's shared dictionary.
pub fn analyse_lambda(
    phrase: &Rc<Phrase>,
    pattern: &Rc<Phrase>,
    body: &Rc<Phrase>,
    env: &mut Env,
    shared: bool,
    name: Option<Symbol>,
) -> Result<Rc<Operation>> {
    let capture = env.push_lambda(shared);
    let params = env.push_seq();
    let result = (|| {
        let scope = Rc::clone(&params);
        let pat = make_pattern(pattern, &mut |pname, ph| {
            let slot = env.make_slot();
            let mut s = scope.borrow_mut();
            if s.bindings.contains_key(&pname) {
                return Err(AtPhrase::analysing(Rc::clone(ph))
                    .error(format!("{pname}: multiply defined")));
            }
            s.bindings.insert(
                pname,
                Binding {
                    slot,
                    unit: 0,
                    variable: Rc::new(ScopedVariable {
                        is_mutable: Cell::new(false),
                    }),
                },
            );
            Ok(slot)
        })?;
        let body_op = analyse_op(body, env, Interp::expr())?;
        Ok((pat, body_op))
    })();
    env.pop_seq(&params);
    let nslots = env.pop_lambda(&capture);
    let (pat, body_op) = result?;
    let c = capture.borrow();
    Ok(Rc::new(Operation::LambdaExpr {
        syntax: Rc::clone(phrase),
        pattern: pat,
        body: body_op,
        nslots,
        nonlocal_dict: Rc::new(c.dict.clone()),
        nonlocal_exprs: c.exprs.clone(),
        name,
    }))
}

/// Evaluate a phrase as a constant expression in the builtin environment;
/// used by `include`, whose argument is resolved at analysis time.
pub fn std_eval(phrase: &Rc<Phrase>, env: &Env) -> Result<Value> {
    let mut e2 = Env::new(Rc::clone(&env.sstate));
    let op = analyse_op(phrase, &mut e2, Interp::expr())?;
    let mut fm = Frame::root(Rc::clone(&env.sstate), e2.frame_maxslots);
    fm.next_op = Some(op);
    tail_eval_frame(&mut fm)
}
