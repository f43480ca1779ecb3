//! Error contexts.
//!
//! A `Context` captures where an error happened (the lexical site plus the
//! dynamic call stack) and how to decorate its message. Contexts compose:
//! `AtField` wraps a parent context and prepends to its rewrite, so a deeply
//! nested failure reads "at index [2]: at field .bbox: ...".

use std::rc::Rc;

use crate::error::{Exception, FuncLoc};
use crate::frame::Frame;
use crate::phrase::Phrase;
use crate::source::SrcLoc;
use crate::symbol::Symbol;

pub trait Context {
    /// Append the stack of source locations for this context, innermost
    /// first.
    fn locations(&self, locs: &mut Vec<FuncLoc>);

    /// Decorate an error message with what this context knows.
    fn rewrite_message(&self, msg: String) -> String {
        msg
    }

    /// The phrase the context points at, when it has one. The reactive path
    /// of the broadcast framework uses this to give a reactive expression
    /// its call-site syntax.
    fn syntax(&self) -> Option<Rc<Phrase>> {
        None
    }

    /// Build an exception at this context.
    fn error(&self, msg: String) -> Exception {
        let mut locs = Vec::new();
        self.locations(&mut locs);
        Exception::new(self.rewrite_message(msg), locs)
    }
}

/// At a token, before any frames exist (scanner and parser errors).
pub struct AtToken {
    pub loc: SrcLoc,
}

impl Context for AtToken {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        locs.push(FuncLoc::new(None, self.loc.clone()));
    }
}

/// At a phrase, optionally with the dynamic call stack behind it.
pub struct AtPhrase<'a> {
    pub phrase: Rc<Phrase>,
    pub frame: Option<&'a Frame<'a>>,
}

impl<'a> AtPhrase<'a> {
    pub fn new(phrase: Rc<Phrase>, frame: &'a Frame<'a>) -> Self {
        Self {
            phrase,
            frame: Some(frame),
        }
    }

    /// A phrase context with no evaluation stack (used during analysis).
    pub fn analysing(phrase: Rc<Phrase>) -> Self {
        Self {
            phrase,
            frame: None,
        }
    }
}

impl Context for AtPhrase<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        locs.push(FuncLoc::new(None, self.phrase.location()));
        if let Some(frame) = self.frame {
            frame.append_trace(locs);
        }
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        Some(Rc::clone(&self.phrase))
    }
}

/// At a call frame: points at the call phrase.
pub struct AtFrame<'a> {
    pub frame: &'a Frame<'a>,
}

impl Context for AtFrame<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        self.frame.append_trace(locs);
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.frame.call_phrase.clone()
    }
}

/// At the argument of a function call. Rewrites messages to
/// "argument #N of f: ..." when the function has a name.
pub struct AtArg<'a> {
    pub func_name: Option<Symbol>,
    pub argpos: u32,
    pub frame: &'a Frame<'a>,
}

impl Context for AtArg<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        if let Some(call_phrase) = &self.frame.call_phrase {
            // Underline the argument part of the call, then dump the stack
            // starting at the parent frame; underlining the same call twice
            // looks stupid.
            let arg_loc = match &**call_phrase {
                Phrase::Call { arg, .. } => arg.location(),
                other => other.location(),
            };
            locs.push(FuncLoc::new(self.func_name.clone(), arg_loc));
            if let Some(parent) = self.frame.parent {
                parent.append_trace(locs);
            }
        } else {
            self.frame.append_trace(locs);
        }
    }

    fn rewrite_message(&self, msg: String) -> String {
        match &self.func_name {
            None => format!("function argument: {msg}"),
            Some(name) => format!("argument #{} of {name}: {msg}", self.argpos + 1),
        }
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.frame.call_phrase.as_ref().map(|cp| match &**cp {
            Phrase::Call { arg, .. } => Rc::clone(arg),
            _ => Rc::clone(cp),
        })
    }
}

/// "at field .name:" wrapper.
pub struct AtField<'a> {
    pub name: Symbol,
    pub parent: &'a dyn Context,
}

impl Context for AtField<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        self.parent.locations(locs);
    }

    fn rewrite_message(&self, msg: String) -> String {
        self.parent
            .rewrite_message(format!("at field .{}: {msg}", self.name))
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.parent.syntax()
    }
}

/// "at index [N]:" wrapper.
pub struct AtIndex<'a> {
    pub index: usize,
    pub parent: &'a dyn Context,
}

impl Context for AtIndex<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        self.parent.locations(locs);
    }

    fn rewrite_message(&self, msg: String) -> String {
        self.parent
            .rewrite_message(format!("at index [{}]: {msg}", self.index))
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.parent.syntax()
    }
}

/// A context with no location at all, for host-side conversions.
pub struct AtSystem;

impl Context for AtSystem {
    fn locations(&self, _locs: &mut Vec<FuncLoc>) {}
}

/// Generic message-rewriting wrapper, the building block the tree lens
/// layer uses for its "Bad index:" / "Index incompatible with collection:"
/// decorations.
pub struct Rewriting<'a, F: Fn(String) -> String> {
    pub parent: &'a dyn Context,
    pub rewrite: F,
}

impl<'a, F: Fn(String) -> String> Rewriting<'a, F> {
    pub fn new(parent: &'a dyn Context, rewrite: F) -> Self {
        Self { parent, rewrite }
    }
}

impl<F: Fn(String) -> String> Context for Rewriting<'_, F> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        self.parent.locations(locs);
    }

    fn rewrite_message(&self, msg: String) -> String {
        self.parent.rewrite_message((self.rewrite)(msg))
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.parent.syntax()
    }
}
