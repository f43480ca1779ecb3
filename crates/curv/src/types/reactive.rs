//! Reactive values: symbolic stand-ins for GPU uniform variables.
//!
//! A reactive value has a SubCurv type but no concrete contents; arithmetic
//! on it builds a reactive expression over the same Meaning tree that the
//! shape compiler later lowers to SSA form. Equality involving a reactive
//! value is Unknown.

use std::rc::Rc;

use crate::meaning::Operation;
use crate::phrase::Phrase;
use crate::sc::ty::ScType;
use crate::symbol::Symbol;
use crate::value::{RefValue, Value};

/// A named GPU uniform, created by a `parametric` parameter.
#[derive(Debug, Clone)]
pub struct UniformVariable {
    pub name: Symbol,
    pub ty: ScType,
}

/// An expression over reactive operands, captured as an analysed operation.
#[derive(Debug, Clone)]
pub struct ReactiveExpr {
    pub ty: ScType,
    pub expr: Rc<Operation>,
}

#[derive(Debug, Clone)]
pub enum Reactive {
    Uniform(UniformVariable),
    Expr(ReactiveExpr),
}

impl Reactive {
    pub fn sc_type(&self) -> ScType {
        match self {
            Self::Uniform(u) => u.ty.clone(),
            Self::Expr(e) => e.ty.clone(),
        }
    }

    /// The operation form of the reactive value, for embedding into a larger
    /// reactive expression. A uniform embeds as a constant holding itself.
    pub fn expr(&self, syntax: Rc<Phrase>) -> Rc<Operation> {
        match self {
            Self::Uniform(u) => Rc::new(Operation::Constant {
                syntax,
                value: Value::Ref(Rc::new(RefValue::Reactive(Self::Uniform(u.clone())))),
            }),
            Self::Expr(e) => Rc::clone(&e.expr),
        }
    }
}
