//! Error contexts for the shape compiler.
//!
//! Shape-compiler frames carry no run-time stack, but the root frame holds
//! the dynamic [`Context`] that asked for the compilation. Messages raised
//! anywhere inside the compiler are prefixed "Shape Compiler: " and then
//! rewritten by that enclosing context, so an error inside a compiled
//! argument still reads "argument #2 of render: Shape Compiler: ...".

use std::rc::Rc;

use crate::context::Context;
use crate::error::FuncLoc;
use crate::phrase::Phrase;
use crate::sc::compiler::ScFrame;

/// At a shape-compiler call frame.
pub struct AtScFrame<'a> {
    pub frame: &'a ScFrame<'a>,
}

impl Context for AtScFrame<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        sc_frame_locations(self.frame, locs);
    }

    fn rewrite_message(&self, msg: String) -> String {
        sc_frame_rewrite_message(self.frame, msg)
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        self.frame.call_phrase.clone()
    }
}

/// At a phrase, inside a shape-compiler frame.
pub struct AtScPhrase<'a> {
    pub phrase: Rc<Phrase>,
    pub frame: &'a ScFrame<'a>,
}

impl Context for AtScPhrase<'_> {
    fn locations(&self, locs: &mut Vec<FuncLoc>) {
        locs.push(FuncLoc::new(None, self.phrase.location()));
        sc_frame_locations(self.frame, locs);
    }

    fn rewrite_message(&self, msg: String) -> String {
        sc_frame_rewrite_message(self.frame, msg)
    }

    fn syntax(&self) -> Option<Rc<Phrase>> {
        Some(Rc::clone(&self.phrase))
    }
}

/// The stack-trace entries of a shape-compiler frame chain: one per inlined
/// call, then whatever the root context knows.
pub fn sc_frame_locations(frame: &ScFrame<'_>, locs: &mut Vec<FuncLoc>) {
    let mut f = Some(frame);
    while let Some(fr) = f {
        if let Some(cp) = &fr.call_phrase {
            locs.push(FuncLoc::new(None, cp.location()));
        }
        if let Some(root) = fr.root_context {
            root.locations(locs);
        }
        f = fr.parent;
    }
}

/// Prefix the message with "Shape Compiler: ", then let the dynamic context
/// that requested the compilation rewrite the result.
pub fn sc_frame_rewrite_message(frame: &ScFrame<'_>, msg: String) -> String {
    let mut msg = format!("Shape Compiler: {msg}");
    let mut f = Some(frame);
    while let Some(fr) = f {
        if let Some(root) = fr.root_context {
            msg = root.rewrite_message(msg);
        }
        f = fr.parent;
    }
    msg
}
