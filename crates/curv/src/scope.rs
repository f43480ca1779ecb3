//! Definitions and scopes.
//!
//! A definition phrase becomes a `Definition`; a set of definitions becomes
//! a scope. Sequential scopes (`local`) bind in textual order, each unit
//! seeing only what precedes it. Recursive scopes (module bodies, `let`)
//! allow free mutual reference; to order their initialisers they run
//! Tarjan's strongly-connected-components algorithm over the dependency
//! graph discovered by name lookup. A data definition inside a cycle is an
//! illegal recursive reference; a cycle of function definitions becomes one
//! `Function_Setter` installing every closure over one shared nonlocals
//! module.

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::analyse::{
    Binding, Env, Interp, Level, ScopedVariable, SeqScope, analyse_lambda, analyse_op, std_eval,
};
use crate::context::{AtPhrase, Context};
use crate::error::Result;
use crate::meaning::{Operation, ScopeExecutable};
use crate::pattern::{Pattern, make_pattern};
use crate::phrase::Phrase;
use crate::source::TokenKind;
use crate::symbol::Symbol;
use crate::types::function::LambdaData;
use crate::types::record::record_field_names;
use crate::value::{RefValue, Value};

/// A unitary definition: one node of the recursive scope's dependency
/// graph. It can bind several names (via a pattern) but is analysed as a
/// unit.
#[derive(Debug, Clone)]
pub enum Definition {
    /// `pattern = expr` where the expression is not a lambda.
    Data {
        syntax: Rc<Phrase>,
        pattern: Rc<Phrase>,
        definiens: Rc<Phrase>,
    },
    /// `f = <lambda>` or `f x = expr`: single name, potentially recursive.
    Function {
        syntax: Rc<Phrase>,
        name: Symbol,
        name_phrase: Rc<Phrase>,
        lambda: Rc<Phrase>,
    },
    /// `include expr`: fields of a record, spliced in at analysis time.
    Include {
        syntax: Rc<Phrase>,
        arg: Rc<Phrase>,
    },
    /// `test stmt`: executed for its assertions, binds nothing.
    Test {
        syntax: Rc<Phrase>,
        arg: Rc<Phrase>,
    },
    /// A plain statement among definitions (programs mix them).
    Action { syntax: Rc<Phrase> },
    /// `local def`: only legal in sequential positions.
    Local {
        syntax: Rc<Phrase>,
        inner: Box<Definition>,
    },
    /// `(a=1, b=2)`: several definitions grouped as one phrase.
    Compound {
        syntax: Rc<Phrase>,
        items: Vec<Definition>,
    },
}

impl Definition {
    pub fn syntax(&self) -> &Rc<Phrase> {
        match self {
            Self::Data { syntax, .. }
            | Self::Function { syntax, .. }
            | Self::Include { syntax, .. }
            | Self::Test { syntax, .. }
            | Self::Action { syntax }
            | Self::Local { syntax, .. }
            | Self::Compound { syntax, .. } => syntax,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function { .. })
    }
}

/// Classify one statement of a compound definition.
pub fn classify_item(item: &Rc<Phrase>) -> Result<Definition> {
    match &**item {
        Phrase::Binary { left, op, right } if op.kind == TokenKind::Equate => {
            let lhs = left.skip_parens();
            match &*lhs {
                // `f x = expr`, possibly curried: build the lambda nest.
                Phrase::Call { .. } => {
                    let mut params: Vec<Rc<Phrase>> = Vec::new();
                    let mut base = Rc::clone(&lhs);
                    loop {
                        let next = match &*base {
                            Phrase::Call { func, arg } => {
                                params.push(Rc::clone(arg));
                                func.skip_parens()
                            }
                            _ => break,
                        };
                        base = next;
                    }
                    let Phrase::Ident { symbol, .. } = &*base else {
                        return Err(AtPhrase::analysing(Rc::clone(&base))
                            .error("invalid function definition".to_string()));
                    };
                    let mut lambda = Rc::clone(right);
                    for param in params {
                        lambda = Rc::new(Phrase::Lambda {
                            pattern: param,
                            arrow: *op,
                            body: lambda,
                        });
                    }
                    Ok(Definition::Function {
                        syntax: Rc::clone(item),
                        name: symbol.clone(),
                        name_phrase: base,
                        lambda,
                    })
                }
                Phrase::Ident { symbol, .. }
                    if matches!(&**right, Phrase::Lambda { .. }) =>
                {
                    Ok(Definition::Function {
                        syntax: Rc::clone(item),
                        name: symbol.clone(),
                        name_phrase: Rc::clone(&lhs),
                        lambda: Rc::clone(right),
                    })
                }
                _ => Ok(Definition::Data {
                    syntax: Rc::clone(item),
                    pattern: Rc::clone(left),
                    definiens: Rc::clone(right),
                }),
            }
        }
        Phrase::Include { arg, .. } => Ok(Definition::Include {
            syntax: Rc::clone(item),
            arg: Rc::clone(arg),
        }),
        Phrase::Test { arg, .. } => Ok(Definition::Test {
            syntax: Rc::clone(item),
            arg: Rc::clone(arg),
        }),
        Phrase::Local { def, .. } => Ok(Definition::Local {
            syntax: Rc::clone(item),
            inner: Box::new(classify_item(def)?),
        }),
        Phrase::Paren {
            body: Some(body), ..
        } if body.is_definition() => {
            let mut defs = classify_compound(body)?;
            if defs.len() == 1 {
                Ok(defs.remove(0))
            } else {
                Ok(Definition::Compound {
                    syntax: Rc::clone(item),
                    items: defs,
                })
            }
        }
        _ => Ok(Definition::Action {
            syntax: Rc::clone(item),
        }),
    }
}

/// Flatten a compound definition phrase into its units.
pub fn classify_compound(phrase: &Rc<Phrase>) -> Result<Vec<Definition>> {
    let mut defs = Vec::new();
    for item in phrase.items() {
        match &*item {
            Phrase::Comma { items, .. } | Phrase::Semicolon { items, .. } => {
                for sub in items {
                    defs.push(classify_item(sub)?);
                }
            }
            _ => defs.push(classify_item(&item)?),
        }
    }
    Ok(defs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    NotAnalysed,
    InProgress,
    Analysed,
}

/// One unit of a recursive scope, carrying its Tarjan bookkeeping and the
/// analysed artifacts the setters are assembled from.
pub struct Unit {
    pub def: Definition,
    pub state: UnitState,
    pub scc_ord: i32,
    pub scc_lowlink: i32,
    /// Names this unit references from enclosing scopes, captured for the
    /// shared nonlocals module of its function group.
    pub nonlocals: IndexMap<Symbol, Rc<Operation>>,
    /// Data units: the compiled pattern and analysed definiens.
    pub pattern: Option<Rc<Pattern>>,
    pub definiens_op: Option<Rc<Operation>>,
    /// Function units: the analysed lambda and the slot of its binding.
    pub lambda: Option<Rc<LambdaData>>,
    pub slot: usize,
    /// Include/test/action units: a ready-made setter.
    pub setter: Option<Rc<Operation>>,
    pub include_elements: Vec<(usize, Value)>,
}

impl Unit {
    fn new(def: Definition) -> Self {
        Self {
            def,
            state: UnitState::NotAnalysed,
            scc_ord: -1,
            scc_lowlink: -1,
            nonlocals: IndexMap::new(),
            pattern: None,
            definiens_op: None,
            lambda: None,
            slot: 0,
            setter: None,
            include_elements: Vec::new(),
        }
    }
}

/// A recursive scope being analysed.
pub struct RecScope {
    pub target_is_module: bool,
    /// Frame slot holding the module during initialisation, for module
    /// targets.
    pub module_slot: Option<usize>,
    pub syntax: Rc<Phrase>,
    pub bindings: IndexMap<Symbol, Binding>,
    pub units: Vec<Unit>,
    pub scc_count: i32,
    pub scc_stack: Vec<usize>,
    pub analysis_stack: Vec<usize>,
    /// Initialisation actions in dependency order.
    pub executable_actions: Vec<Rc<Operation>>,
    saved_nslots: usize,
}

impl RecScope {
    fn add_binding(
        &mut self,
        env: &mut Env,
        name: Symbol,
        name_phrase: &Rc<Phrase>,
        unit: usize,
    ) -> Result<usize> {
        if self.bindings.contains_key(&name) {
            return Err(AtPhrase::analysing(Rc::clone(name_phrase))
                .error(format!("{name}: multiply defined")));
        }
        let slot = if self.target_is_module {
            self.bindings.len()
        } else {
            env.make_slot()
        };
        self.bindings.insert(
            name,
            Binding {
                slot,
                unit,
                variable: Rc::new(ScopedVariable {
                    is_mutable: Cell::new(false),
                }),
            },
        );
        Ok(slot)
    }
}

/// `{a=1; f x = ...}`: a module literal.
pub fn analyse_module_expr(
    defs_phrase: &Rc<Phrase>,
    syntax: &Rc<Phrase>,
    env: &mut Env,
) -> Result<Rc<Operation>> {
    let defs = classify_compound(defs_phrase)?;
    let scope = build_rec_scope(defs, true, syntax, env)?;
    let result = analyse_rec_scope_units(env, &scope);
    env.levels.pop();
    env.frame_nslots = scope.borrow().saved_nslots;
    result?;
    let s = scope.borrow();
    let dict: IndexMap<Symbol, usize> = s
        .bindings
        .iter()
        .map(|(name, b)| (name.clone(), b.slot))
        .collect();
    Ok(Rc::new(Operation::ScopedModuleExpr {
        syntax: Rc::clone(syntax),
        executable: ScopeExecutable {
            module_slot: s.module_slot.expect("module scope has a slot"),
            dict: Rc::new(dict),
            actions: s.executable_actions.clone(),
        },
    }))
}

/// `let defs in body` and programs with a trailing expression: a recursive
/// scope over frame slots, then the body.
pub fn analyse_rec_block(
    defs_phrase: &Rc<Phrase>,
    body: &Rc<Phrase>,
    syntax: &Rc<Phrase>,
    env: &mut Env,
    interp: Interp,
) -> Result<Rc<Operation>> {
    let defs = classify_compound(defs_phrase)?;
    analyse_rec_block_defs(defs, body, syntax, env, interp)
}

pub fn analyse_rec_block_defs(
    defs: Vec<Definition>,
    body: &Rc<Phrase>,
    syntax: &Rc<Phrase>,
    env: &mut Env,
    interp: Interp,
) -> Result<Rc<Operation>> {
    let scope = build_rec_scope(defs, false, syntax, env)?;
    let result = (|| {
        analyse_rec_scope_units(env, &scope)?;
        analyse_op(body, env, interp.deepen())
    })();
    env.levels.pop();
    env.frame_nslots = scope.borrow().saved_nslots;
    let body_op = result?;
    Ok(Rc::new(Operation::Block {
        syntax: Rc::clone(syntax),
        actions: scope.borrow().executable_actions.clone(),
        body: body_op,
    }))
}

/// Create the scope, register every unit's bindings, push the scope level.
fn build_rec_scope(
    defs: Vec<Definition>,
    target_is_module: bool,
    syntax: &Rc<Phrase>,
    env: &mut Env,
) -> Result<Rc<std::cell::RefCell<RecScope>>> {
    let module_slot = if target_is_module {
        Some(env.make_slot())
    } else {
        None
    };
    let scope = Rc::new(std::cell::RefCell::new(RecScope {
        target_is_module,
        module_slot,
        syntax: Rc::clone(syntax),
        bindings: IndexMap::new(),
        units: Vec::new(),
        scc_count: 0,
        scc_stack: Vec::new(),
        analysis_stack: Vec::new(),
        executable_actions: Vec::new(),
        saved_nslots: env.frame_nslots,
    }));
    env.levels.push(Level::Rec(Rc::clone(&scope)));
    for def in defs {
        let result = add_unit(env, &scope, def);
        if let Err(e) = result {
            env.levels.pop();
            return Err(e);
        }
    }
    Ok(scope)
}

fn add_unit(
    env: &mut Env,
    scope: &Rc<std::cell::RefCell<RecScope>>,
    def: Definition,
) -> Result<()> {
    let unitno = scope.borrow().units.len();
    match &def {
        Definition::Data { pattern, .. } => {
            let pat = make_pattern(pattern, &mut |name, ph| {
                scope.borrow_mut().add_binding(env, name, ph, unitno)
            })?;
            let mut s = scope.borrow_mut();
            let mut unit = Unit::new(def.clone());
            unit.pattern = Some(pat);
            s.units.push(unit);
        }
        Definition::Function {
            name, name_phrase, ..
        } => {
            let slot = scope
                .borrow_mut()
                .add_binding(env, name.clone(), name_phrase, unitno)?;
            let mut s = scope.borrow_mut();
            let mut unit = Unit::new(def.clone());
            unit.slot = slot;
            s.units.push(unit);
        }
        Definition::Include { arg, syntax } => {
            // The include argument is evaluated in the builtin environment
            // at analysis time; its fields become bindings of this scope.
            let value = std_eval(arg, env)?;
            let Value::Ref(r) = &value else {
                return Err(AtPhrase::analysing(Rc::clone(arg))
                    .error(format!("{value}: not a record")));
            };
            let names = record_field_names(r);
            if names.is_empty() && !matches!(&**r, RefValue::Record(_) | RefValue::Module(_))
            {
                return Err(AtPhrase::analysing(Rc::clone(arg))
                    .error(format!("{value}: not a record")));
            }
            let mut elements = Vec::with_capacity(names.len());
            let cx = AtPhrase::analysing(Rc::clone(arg));
            for name in names {
                let fval =
                    crate::types::record::record_field(r, &name, &env.sstate, &cx)?;
                let slot =
                    scope
                        .borrow_mut()
                        .add_binding(env, name.clone(), syntax, unitno)?;
                elements.push((slot, fval));
            }
            let mut s = scope.borrow_mut();
            let mut unit = Unit::new(def.clone());
            unit.include_elements = elements;
            s.units.push(unit);
        }
        Definition::Test { .. } | Definition::Action { .. } => {
            scope.borrow_mut().units.push(Unit::new(def));
        }
        Definition::Compound { items, .. } => {
            for sub in items.clone() {
                add_unit(env, scope, sub)?;
            }
        }
        Definition::Local { syntax, .. } => {
            return Err(AtPhrase::analysing(Rc::clone(syntax)).error(
                "local definition is not allowed in a recursive scope".to_string(),
            ));
        }
    }
    Ok(())
}

/// Analyse every unit that name lookup has not already forced.
fn analyse_rec_scope_units(
    env: &mut Env,
    scope: &Rc<std::cell::RefCell<RecScope>>,
) -> Result<()> {
    let n = scope.borrow().units.len();
    for u in 0..n {
        if scope.borrow().units[u].state == UnitState::NotAnalysed {
            analyse_unit(env, scope, u, None)?;
        }
    }
    Ok(())
}

/// Called from name lookup when a reference lands on a not-yet-analysed
/// unit: analyse it with the environment truncated to the scope's level,
/// preserving the frame counters of any lambda boundaries being skipped.
pub fn trigger_unit(
    env: &mut Env,
    level_idx: usize,
    scope: &Rc<std::cell::RefCell<RecScope>>,
    unit: usize,
    id: Option<&Rc<Phrase>>,
) -> Result<()> {
    let suffix = env.levels.split_off(level_idx + 1);
    let saved_counters = (env.frame_nslots, env.frame_maxslots);
    // The innermost frame of the truncated environment is the one below the
    // first lambda boundary in the suffix, whose saved counters we borrow.
    let lambda_pos = suffix
        .iter()
        .position(|l| matches!(l, Level::Lambda(_)));
    let boundary = lambda_pos.map(|pos| {
        let Level::Lambda(capture) = &suffix[pos] else {
            unreachable!()
        };
        Rc::clone(capture)
    });
    if let Some(capture) = &boundary {
        let c = capture.borrow();
        env.frame_nslots = c.saved_nslots();
        env.frame_maxslots = c.saved_maxslots();
    }
    let result = analyse_unit(env, scope, unit, id);
    if let Some(capture) = &boundary {
        capture
            .borrow_mut()
            .update_saved(env.frame_nslots, env.frame_maxslots);
        env.frame_nslots = saved_counters.0;
        env.frame_maxslots = saved_counters.1;
    } else {
        // Same frame: temporaries allocated for the unit may be reused.
        env.frame_nslots = saved_counters.0;
        env.frame_maxslots = env.frame_maxslots.max(saved_counters.1);
    }
    env.levels.extend(suffix);
    result
}

fn recursive_reference_error(
    id: Option<&Rc<Phrase>>,
    fallback: &Rc<Phrase>,
) -> crate::error::Exception {
    let at = id.unwrap_or(fallback);
    AtPhrase::analysing(Rc::clone(at)).error("illegal recursive reference".to_string())
}

/// Tarjan's algorithm, driven by the recursion of `analyse_op` through
/// name lookup. When a unit closes its strongly connected component, the
/// component's initialisation action is appended to the executable, which
/// therefore ends up in dependency order.
pub fn analyse_unit(
    env: &mut Env,
    scope: &Rc<std::cell::RefCell<RecScope>>,
    uidx: usize,
    id: Option<&Rc<Phrase>>,
) -> Result<()> {
    let (state, is_function) = {
        let s = scope.borrow();
        (s.units[uidx].state, s.units[uidx].def.is_function())
    };
    match state {
        UnitState::Analysed => return Ok(()),
        UnitState::InProgress => {
            // A back edge. Recursion through data is illegal; through
            // functions it only propagates the lowlink.
            if !is_function {
                let syntax = scope.borrow().units[uidx].def.syntax().clone();
                return Err(recursive_reference_error(id, &syntax));
            }
            let mut s = scope.borrow_mut();
            let ord = s.units[uidx].scc_ord;
            if let Some(&parent) = s.analysis_stack.last() {
                let low = s.units[parent].scc_lowlink.min(ord);
                s.units[parent].scc_lowlink = low;
            }
            return Ok(());
        }
        UnitState::NotAnalysed => {}
    }
    {
        let mut s = scope.borrow_mut();
        let ord = s.scc_count;
        s.scc_count += 1;
        let unit = &mut s.units[uidx];
        unit.state = UnitState::InProgress;
        unit.scc_ord = ord;
        unit.scc_lowlink = ord;
        s.scc_stack.push(uidx);
        s.analysis_stack.push(uidx);
    }
    let def = scope.borrow().units[uidx].def.clone();
    let analysed = match &def {
        Definition::Data { definiens, .. } => {
            analyse_op(definiens, env, Interp::expr()).map(|op| {
                scope.borrow_mut().units[uidx].definiens_op = Some(op);
            })
        }
        Definition::Function { name, lambda, .. } => {
            env.levels
                .push(Level::FuncUnit(Rc::clone(scope), uidx));
            let result = match &**lambda {
                Phrase::Lambda { pattern, body, .. } => {
                    analyse_lambda(lambda, pattern, body, env, true, Some(name.clone()))
                }
                _ => Err(AtPhrase::analysing(Rc::clone(lambda))
                    .error("not a function definition".to_string())),
            };
            env.levels.pop();
            result.map(|op| {
                let Operation::LambdaExpr {
                    pattern,
                    body,
                    nslots,
                    name,
                    ..
                } = &*op
                else {
                    unreachable!("analyse_lambda returns a lambda expression")
                };
                scope.borrow_mut().units[uidx].lambda = Some(Rc::new(LambdaData {
                    pattern: Rc::clone(pattern),
                    body: Rc::clone(body),
                    nslots: *nslots,
                    name: name.clone(),
                }));
            })
        }
        Definition::Include { .. } => Ok(()),
        Definition::Test { arg, .. } => {
            // A test cannot mutate free variables; deleting it must not
            // change program semantics.
            analyse_op(arg, env, Interp::stmt(0)).map(|op| {
                scope.borrow_mut().units[uidx].setter = Some(op);
            })
        }
        Definition::Action { syntax } => {
            analyse_op(syntax, env, Interp::stmt(1)).map(|op| {
                scope.borrow_mut().units[uidx].setter = Some(op);
            })
        }
        Definition::Local { syntax, .. } => Err(AtPhrase::analysing(Rc::clone(syntax))
            .error("local definition is not allowed in a recursive scope".to_string())),
        Definition::Compound { .. } => unreachable!("compounds are flattened into units"),
    };
    analysed?;
    // Unwind: propagate the lowlink to the parent on the analysis stack.
    {
        let mut s = scope.borrow_mut();
        s.analysis_stack.pop();
        let low = s.units[uidx].scc_lowlink;
        if let Some(&parent) = s.analysis_stack.last()
            && low < s.units[parent].scc_lowlink
        {
            s.units[parent].scc_lowlink = low;
            if !is_function {
                let syntax = s.units[uidx].def.syntax().clone();
                drop(s);
                return Err(recursive_reference_error(id, &syntax));
            }
        }
    }
    let (ord, low) = {
        let s = scope.borrow();
        (s.units[uidx].scc_ord, s.units[uidx].scc_lowlink)
    };
    if ord == low {
        emit_scc(scope, uidx)?;
    }
    Ok(())
}

/// `uidx` is the lowest unit of its SCC; every member is above it on the
/// SCC stack. Emit one initialisation action for the whole component.
fn emit_scc(scope: &Rc<std::cell::RefCell<RecScope>>, uidx: usize) -> Result<()> {
    let mut s = scope.borrow_mut();
    let module_slot = s.module_slot;
    if !s.units[uidx].def.is_function() {
        let top = s.scc_stack.pop().expect("unit is on the scc stack");
        debug_assert_eq!(top, uidx);
        s.units[uidx].state = UnitState::Analysed;
        let unit = &s.units[uidx];
        let action: Rc<Operation> = match &unit.def {
            Definition::Data { syntax, .. } => Rc::new(Operation::DataSetter {
                syntax: Rc::clone(syntax),
                module_slot,
                pattern: Rc::clone(unit.pattern.as_ref().expect("data unit analysed")),
                definiens: Rc::clone(
                    unit.definiens_op.as_ref().expect("data unit analysed"),
                ),
            }),
            Definition::Include { syntax, .. } => Rc::new(Operation::IncludeSetter {
                syntax: Rc::clone(syntax),
                module_slot,
                elements: unit.include_elements.clone(),
            }),
            Definition::Test { .. } | Definition::Action { .. } => {
                Rc::clone(unit.setter.as_ref().expect("action unit analysed"))
            }
            _ => unreachable!("function units are emitted as a group"),
        };
        s.executable_actions.push(action);
        return Ok(());
    }
    // A function group: everything from uidx's position up.
    let pos = s
        .scc_stack
        .iter()
        .position(|&u| u == uidx)
        .expect("unit is on the scc stack");
    let group: Vec<usize> = s.scc_stack.split_off(pos);
    let syntax = if group.len() == 1 {
        s.units[group[0]].def.syntax().clone()
    } else {
        s.syntax.clone()
    };
    let mut dict: IndexMap<Symbol, usize> = IndexMap::new();
    let mut exprs: Vec<Rc<Operation>> = Vec::new();
    let mut elements: Vec<(usize, Rc<LambdaData>)> = Vec::new();
    for &g in &group {
        let unit = &s.units[g];
        let Definition::Function { name, .. } = &unit.def else {
            return Err(AtPhrase::analysing(unit.def.syntax().clone())
                .error("recursive data definition".to_string()));
        };
        let lambda = Rc::clone(unit.lambda.as_ref().expect("function unit analysed"));
        dict.insert(name.clone(), dict.len());
        exprs.push(Rc::new(Operation::Constant {
            syntax: unit.def.syntax().clone(),
            value: Value::Ref(Rc::new(RefValue::Lambda(Rc::clone(&lambda)))),
        }));
        elements.push((unit.slot, lambda));
    }
    for &g in &group {
        // Captures from enclosing scopes join the shared dictionary.
        let nonlocals: Vec<(Symbol, Rc<Operation>)> = s.units[g]
            .nonlocals
            .iter()
            .map(|(k, v)| (k.clone(), Rc::clone(v)))
            .collect();
        for (name, op) in nonlocals {
            if !dict.contains_key(&name) {
                dict.insert(name, dict.len());
                exprs.push(op);
            }
        }
    }
    for &g in &group {
        s.units[g].state = UnitState::Analysed;
    }
    let nonlocals = Rc::new(Operation::EnumModuleExpr {
        syntax: Rc::clone(&syntax),
        dict: Rc::new(dict),
        exprs,
    });
    s.executable_actions.push(Rc::new(Operation::FunctionSetter {
        syntax,
        module_slot,
        nonlocals,
        elements,
    }));
    Ok(())
}

/// `local <def>` inside a statement sequence: bindings become visible to
/// the following statements, and the setter joins the action list in
/// textual order.
pub fn analyse_local_def(
    def_phrase: &Rc<Phrase>,
    env: &mut Env,
    seq: &Rc<std::cell::RefCell<SeqScope>>,
    interp: Interp,
) -> Result<Rc<Operation>> {
    let def = classify_item(def_phrase)?;
    analyse_seq_def(&def, env, seq, interp)
}

fn analyse_seq_def(
    def: &Definition,
    env: &mut Env,
    seq: &Rc<std::cell::RefCell<SeqScope>>,
    interp: Interp,
) -> Result<Rc<Operation>> {
    match def {
        Definition::Local { inner, .. } => analyse_seq_def(inner, env, seq, interp),
        Definition::Data {
            syntax,
            pattern,
            definiens,
        } => {
            // Sequential: the definiens only sees earlier bindings.
            let op = analyse_op(definiens, env, Interp::expr())?;
            let pat = seq_pattern(pattern, env, seq)?;
            Ok(Rc::new(Operation::DataSetter {
                syntax: Rc::clone(syntax),
                module_slot: None,
                pattern: pat,
                definiens: op,
            }))
        }
        Definition::Function {
            syntax,
            name,
            name_phrase,
            lambda,
        } => {
            let op = match &**lambda {
                Phrase::Lambda { pattern, body, .. } => {
                    analyse_lambda(lambda, pattern, body, env, false, Some(name.clone()))?
                }
                _ => analyse_op(lambda, env, Interp::expr())?,
            };
            let pat = seq_pattern(name_phrase, env, seq)?;
            Ok(Rc::new(Operation::DataSetter {
                syntax: Rc::clone(syntax),
                module_slot: None,
                pattern: pat,
                definiens: op,
            }))
        }
        Definition::Include { syntax, arg } => {
            let value = std_eval(arg, env)?;
            let Value::Ref(r) = &value else {
                return Err(AtPhrase::analysing(Rc::clone(arg))
                    .error(format!("{value}: not a record")));
            };
            let names = record_field_names(r);
            let cx = AtPhrase::analysing(Rc::clone(arg));
            let mut elements = Vec::with_capacity(names.len());
            for name in names {
                let fval = crate::types::record::record_field(r, &name, &env.sstate, &cx)?;
                let slot = add_seq_binding(env, seq, name, syntax)?;
                elements.push((slot, fval));
            }
            Ok(Rc::new(Operation::IncludeSetter {
                syntax: Rc::clone(syntax),
                module_slot: None,
                elements,
            }))
        }
        Definition::Test { arg, .. } => analyse_op(arg, env, Interp::stmt(0)),
        Definition::Action { syntax } => analyse_op(syntax, env, interp.to_stmt()),
        Definition::Compound { syntax, items } => {
            let mut actions = Vec::with_capacity(items.len());
            for sub in items {
                actions.push(analyse_seq_def(sub, env, seq, interp)?);
            }
            Ok(Rc::new(Operation::Compound {
                syntax: Rc::clone(syntax),
                items: actions,
            }))
        }
    }
}

fn seq_pattern(
    pattern: &Rc<Phrase>,
    env: &mut Env,
    seq: &Rc<std::cell::RefCell<SeqScope>>,
) -> Result<Rc<Pattern>> {
    let scope = Rc::clone(seq);
    make_pattern(pattern, &mut |name, ph| {
        add_seq_binding(env, &scope, name, ph)
    })
}

fn add_seq_binding(
    env: &mut Env,
    seq: &Rc<std::cell::RefCell<SeqScope>>,
    name: Symbol,
    at: &Rc<Phrase>,
) -> Result<usize> {
    let slot = env.make_slot();
    let mut s = seq.borrow_mut();
    if s.bindings.contains_key(&name) {
        return Err(
            AtPhrase::analysing(Rc::clone(at)).error(format!("{name}: multiply defined"))
        );
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
}
