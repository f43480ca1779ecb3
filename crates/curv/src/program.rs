//! The program driver: scan, parse, analyse, evaluate.

use std::path::Path;
use std::rc::Rc;

use crate::analyse::{Env, Interp, analyse_block, analyse_op};
use crate::context::Context;
use crate::error::{Exception, Result};
use crate::frame::{Frame, tail_eval_frame};
use crate::meaning::Operation;
use crate::parse::parse_program;
use crate::phrase::Phrase;
use crate::scan::Scanner;
use crate::scope;
use crate::source::Source;
use crate::system::{SourceState, System};
use crate::value::Value;

/// Compiles and runs one Curv program. Keeps the source and the analysed
/// form around so later errors can re-quote the original code.
pub struct Program {
    sstate: Rc<SourceState>,
    phrase: Option<Rc<Phrase>>,
    meaning: Option<Rc<Operation>>,
    frame_maxslots: usize,
}

impl Program {
    pub fn new(system: Rc<System>) -> Self {
        Self::with_sstate(SourceState::new(system, None))
    }

    pub fn with_sstate(sstate: Rc<SourceState>) -> Self {
        Self {
            sstate,
            phrase: None,
            meaning: None,
            frame_maxslots: 0,
        }
    }

    pub fn sstate(&self) -> &Rc<SourceState> {
        &self.sstate
    }

    /// Scan, parse and analyse the source.
    pub fn compile(&mut self, source: Rc<Source>) -> Result<()> {
        let mut scanner = Scanner::new(source);
        let phrase = parse_program(&mut scanner)?;
        let mut env = Env::new(Rc::clone(&self.sstate));
        let meaning = analyse_program_phrase(&phrase, &mut env)?;
        self.phrase = Some(phrase);
        self.meaning = Some(meaning);
        self.frame_maxslots = env.frame_maxslots;
        Ok(())
    }

    /// Run the compiled program to a value.
    pub fn eval(&self) -> Result<Value> {
        let meaning = self
            .meaning
            .clone()
            .ok_or_else(|| Exception::bare("program has not been compiled"))?;
        let mut fm = Frame::root(Rc::clone(&self.sstate), self.frame_maxslots);
        fm.next_op = Some(meaning);
        tail_eval_frame(&mut fm)
    }

    pub fn syntax(&self) -> Option<&Rc<Phrase>> {
        self.phrase.as_ref()
    }
}

/// A program is one phrase; what it means depends on its shape.
///
/// * every statement is a definition: a module (a source file defining
///   names evaluates to a record of them),
/// * definitions followed by a trailing expression: a recursive scope over
///   the definitions, then the expression (the command-line shape),
/// * `local` definitions and actions with a trailing expression: a
///   sequential block,
/// * a single expression: itself.
fn analyse_program_phrase(phrase: &Rc<Phrase>, env: &mut Env) -> Result<Rc<Operation>> {
    let items = phrase.items();
    let (body, stmts) = items.split_last().expect("parser rejects empty programs");
    if body.is_definition() {
        return scope::analyse_module_expr(phrase, phrase, env);
    }
    if stmts.is_empty() {
        return analyse_op(body, env, Interp::expr());
    }
    if stmts.iter().any(|i| matches!(&**i, Phrase::Local { .. })) {
        return analyse_block(phrase, &items, env, Interp::stmt(0));
    }
    if stmts.iter().any(|i| i.is_definition()) {
        let mut defs = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            defs.push(scope::classify_item(stmt)?);
        }
        return scope::analyse_rec_block_defs(defs, body, phrase, env, Interp::stmt(0));
    }
    analyse_block(phrase, &items, env, Interp::stmt(0))
}

/// Compile and evaluate an expression string against a system. The name
/// appears in diagnostics.
pub fn eval_str(text: &str, name: &str, system: Rc<System>) -> Result<Value> {
    let mut prog = Program::new(system);
    prog.compile(Source::new(name, text))?;
    prog.eval()
}

/// The `.curv` importer: evaluate the file as a program in a nested source
/// state (sharing the active-files set for cycle detection).
pub fn import_curv_file(path: &Path, sstate: &SourceState, cx: &dyn Context) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| cx.error(format!("\"{}\": {e}", path.display())))?;
    let nested = sstate.nested(path.to_path_buf());
    let mut prog = Program::with_sstate(nested);
    prog.compile(Source::new(path.display().to_string(), text))?;
    prog.eval()
}
