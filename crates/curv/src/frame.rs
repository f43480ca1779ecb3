//! Call frames and the tail-evaluation trampoline.

use std::rc::Rc;

use crate::error::{FuncLoc, Result};
use crate::meaning::Operation;
use crate::phrase::Phrase;
use crate::symbol::Symbol;
use crate::system::SourceState;
use crate::types::record::ModuleData;
use crate::value::Value;

/// An evaluation context: the registers of the Curv virtual machine.
///
/// A program has a frame for its top-level expression; every function call
/// gets one. Frames link to their parent only for stack traces; evaluation
/// never walks the chain.
pub struct Frame<'p> {
    pub sstate: Rc<SourceState>,
    pub parent: Option<&'p Frame<'p>>,
    /// The slot array of the called closure's nonlocals module, or None for
    /// builtin calls and program frames.
    pub nonlocals: Option<Rc<ModuleData>>,
    /// Source of the call that created this frame. Frames without one (the
    /// program frame) do not appear in stack traces.
    pub call_phrase: Option<Rc<Phrase>>,
    /// Name of the function called into this frame, if it has one.
    pub func_name: Option<Symbol>,
    /// Local bindings: function arguments, block bindings, temporaries.
    pub slots: Vec<Value>,
    /// Trampoline register: the next operation for `tail_eval_frame`, or
    /// None when `result` holds the answer.
    pub next_op: Option<Rc<Operation>>,
    pub result: Value,
}

impl<'p> Frame<'p> {
    pub fn root(sstate: Rc<SourceState>, nslots: usize) -> Self {
        Self {
            sstate,
            parent: None,
            nonlocals: None,
            call_phrase: None,
            func_name: None,
            slots: vec![Value::Missing; nslots],
            next_op: None,
            result: Value::Missing,
        }
    }

    pub fn child(
        parent: &'p Frame<'p>,
        call_phrase: Option<Rc<Phrase>>,
        func_name: Option<Symbol>,
        nonlocals: Option<Rc<ModuleData>>,
        nslots: usize,
    ) -> Self {
        Self {
            sstate: Rc::clone(&parent.sstate),
            parent: Some(parent),
            nonlocals,
            call_phrase,
            func_name,
            slots: vec![Value::Missing; nslots],
            next_op: None,
            result: Value::Missing,
        }
    }

    /// Append this frame chain's stack-trace entries, innermost first.
    pub fn append_trace(&self, locs: &mut Vec<FuncLoc>) {
        let mut frame: Option<&Frame<'_>> = Some(self);
        while let Some(f) = frame {
            if let Some(cp) = &f.call_phrase {
                locs.push(FuncLoc::new(f.func_name.clone(), cp.location()));
            }
            frame = f.parent;
        }
    }
}

/// Run the trampoline until an operation produces a value instead of a
/// continuation. Operations that can tail-call (calls, if/else, blocks,
/// compounds) set `next_op` rather than recursing, so tail recursion through
/// them does not grow the Rust stack.
pub fn tail_eval_frame(fm: &mut Frame<'_>) -> Result<Value> {
    while let Some(op) = fm.next_op.take() {
        op.tail_eval(fm)?;
    }
    Ok(std::mem::take(&mut fm.result))
}
