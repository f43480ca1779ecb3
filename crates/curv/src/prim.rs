//! The array-broadcasting primitive framework.
//!
//! Curv is an array language: scalar operations generalise over arrays by
//! element-wise operation and broadcasting.
//!
//! ```text
//! 2 + 2 == 4                  -- a scalar operation
//! [3,4] + [10,20] == [13,24]  -- element-wise addition
//! 1 + [10,20] == [11,21]      -- broadcasting
//! ```
//!
//! A reactive operand of scalar type produces a reactive expression node
//! whose syntax is the call site, instead of a concrete value.

use std::rc::Rc;

use crate::context::{AtIndex, Context};
use crate::error::Result;
use crate::meaning::Operation;
use crate::phrase::Phrase;
use crate::sc::ty::ScType;
use crate::types::list::ListBuilder;
use crate::types::reactive::{Reactive, ReactiveExpr};
use crate::value::{RefValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryPrim {
    Pos,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryPrim {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// `++` catenation over lists and strings.
    Cat,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl BinaryPrim {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Cat => "++",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// The scalar kernel; `None` is a domain failure (a NaN result, or a
    /// comparison that is not being applied to numbers).
    fn kernel(self, a: f64, b: f64) -> Option<Value> {
        match self {
            Self::Add => num_or_none(a + b),
            Self::Sub => num_or_none(a - b),
            Self::Mul => num_or_none(a * b),
            Self::Div => num_or_none(a / b),
            Self::Pow => num_or_none(a.powf(b)),
            Self::Less => Some(Value::Bool(a < b)),
            Self::LessOrEqual => Some(Value::Bool(a <= b)),
            Self::Greater => Some(Value::Bool(a > b)),
            Self::GreaterOrEqual => Some(Value::Bool(a >= b)),
            Self::Cat => None,
        }
    }

    /// Result type when applied to reactive numeric operands.
    fn reactive_type(self) -> ScType {
        match self {
            Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual => {
                ScType::bool()
            }
            _ => ScType::num(),
        }
    }
}

impl UnaryPrim {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pos => "+",
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}

fn num_or_none(n: f64) -> Option<Value> {
    if n.is_nan() { None } else { Some(Value::Num(n)) }
}

fn as_list(v: &Value) -> Option<&Vec<Value>> {
    match v {
        Value::Ref(r) => match &**r {
            RefValue::List(items) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn as_reactive(v: &Value) -> Option<&Reactive> {
    match v {
        Value::Ref(r) => match &**r {
            RefValue::Reactive(re) => Some(re),
            _ => None,
        },
        _ => None,
    }
}

/// The operation form of a value, for embedding in a reactive expression.
fn to_expr(v: &Value, syntax: &Rc<Phrase>) -> Rc<Operation> {
    match as_reactive(v) {
        Some(re) => re.expr(Rc::clone(syntax)),
        None => Rc::new(Operation::Constant {
            syntax: Rc::clone(syntax),
            value: v.clone(),
        }),
    }
}

/// Apply a binary primitive with broadcasting.
pub fn binary_op(prim: BinaryPrim, x: Value, y: Value, cx: &dyn Context) -> Result<Value> {
    if prim == BinaryPrim::Cat {
        let mut lb = ListBuilder::new();
        lb.concat(&x, cx)?;
        lb.concat(&y, cx)?;
        return Ok(lb.get_value());
    }
    bin_dispatch(prim, &x, &y, cx)
}

fn bin_dispatch(prim: BinaryPrim, x: &Value, y: &Value, cx: &dyn Context) -> Result<Value> {
    // fast path: both operands are numbers
    if let (Value::Num(a), Value::Num(b)) = (x, y) {
        return match prim.kernel(*a, *b) {
            Some(v) => Ok(v),
            None => Err(cx.error(format!(
                "{}{}{}: domain error",
                crate::format::repr(x),
                prim.name(),
                crate::format::repr(y)
            ))),
        };
    }
    match (as_list(x), as_list(y)) {
        (Some(xs), Some(ys)) => {
            if xs.len() != ys.len() {
                return Err(cx.error(format!(
                    "{}: mismatched list sizes ({},{}) in array operation",
                    prim.name(),
                    xs.len(),
                    ys.len()
                )));
            }
            let mut out = Vec::with_capacity(xs.len());
            for (a, b) in xs.iter().zip(ys.iter()) {
                out.push(bin_dispatch(prim, a, b, cx)?);
            }
            Ok(Value::list(out))
        }
        (Some(xs), None) => {
            if !scalar_operand(y) {
                return Err(operand_error(1, y, cx));
            }
            if as_reactive(y).is_some() {
                return reactive_bin(prim, x, y, cx);
            }
            let mut out = Vec::with_capacity(xs.len());
            for a in xs {
                out.push(bin_dispatch(prim, a, y, cx)?);
            }
            Ok(Value::list(out))
        }
        (None, Some(ys)) => {
            if !scalar_operand(x) {
                return Err(operand_error(0, x, cx));
            }
            if as_reactive(x).is_some() {
                return reactive_bin(prim, x, y, cx);
            }
            let mut out = Vec::with_capacity(ys.len());
            for b in ys {
                out.push(bin_dispatch(prim, x, b, cx)?);
            }
            Ok(Value::list(out))
        }
        (None, None) => {
            if as_reactive(x).is_some() || as_reactive(y).is_some() {
                return reactive_bin(prim, x, y, cx);
            }
            if !matches!(x, Value::Num(_)) {
                Err(operand_error(0, x, cx))
            } else {
                Err(operand_error(1, y, cx))
            }
        }
    }
}

fn scalar_operand(v: &Value) -> bool {
    matches!(v, Value::Num(_)) || as_reactive(v).is_some()
}

fn operand_error(index: usize, v: &Value, cx: &dyn Context) -> crate::error::Exception {
    let icx = AtIndex { index, parent: cx };
    icx.error(format!("{v}: domain error"))
}

fn reactive_bin(prim: BinaryPrim, x: &Value, y: &Value, cx: &dyn Context) -> Result<Value> {
    let num_ok = |v: &Value| {
        matches!(v, Value::Num(_))
            || as_reactive(v).is_some_and(|re| re.sc_type().is_num())
    };
    if num_ok(x) && num_ok(y)
        && let Some(syntax) = cx.syntax()
    {
        let expr = Rc::new(Operation::BinOp {
            syntax: Rc::clone(&syntax),
            prim,
            left: to_expr(x, &syntax),
            right: to_expr(y, &syntax),
        });
        return Ok(Value::Ref(Rc::new(RefValue::Reactive(Reactive::Expr(
            ReactiveExpr {
                ty: prim.reactive_type(),
                expr,
            },
        )))));
    }
    Err(cx.error(format!(
        "[{},{}]: domain error",
        crate::format::repr(x),
        crate::format::repr(y)
    )))
}

/// Apply a unary primitive with broadcasting.
pub fn unary_op(prim: UnaryPrim, x: Value, cx: &dyn Context) -> Result<Value> {
    match prim {
        UnaryPrim::Pos => unary_num_kernel("+", &x, &|n| n, cx),
        UnaryPrim::Neg => unary_num_kernel("-", &x, &|n| -n, cx),
        UnaryPrim::Not => not_op(&x, cx),
    }
}

fn not_op(x: &Value, cx: &dyn Context) -> Result<Value> {
    match x {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => {
            if let Some(xs) = as_list(x) {
                let mut out = Vec::with_capacity(xs.len());
                for a in xs {
                    out.push(not_op(a, cx)?);
                }
                return Ok(Value::list(out));
            }
            if let Some(re) = as_reactive(x)
                && re.sc_type().is_bool()
                && let Some(syntax) = cx.syntax()
            {
                let expr = Rc::new(Operation::Unary {
                    syntax: Rc::clone(&syntax),
                    prim: UnaryPrim::Not,
                    arg: to_expr(x, &syntax),
                });
                return Ok(Value::Ref(Rc::new(RefValue::Reactive(Reactive::Expr(
                    ReactiveExpr {
                        ty: ScType::bool(),
                        expr,
                    },
                )))));
            }
            Err(cx.error(format!("!{x}: domain error")))
        }
    }
}

/// Broadcast a named numeric kernel over a value: the engine behind both
/// the `+`/`-` operators and the numeric builtins (`sqrt`, `sin`, ...).
pub fn unary_num_kernel(
    name: &str,
    x: &Value,
    kernel: &dyn Fn(f64) -> f64,
    cx: &dyn Context,
) -> Result<Value> {
    if let Value::Num(a) = x {
        let r = kernel(*a);
        if !r.is_nan() {
            return Ok(Value::Num(r));
        }
        return Err(cx.error(format!("{name} {}: domain error", crate::format::repr(x))));
    }
    if let Some(xs) = as_list(x) {
        let mut out = Vec::with_capacity(xs.len());
        for a in xs {
            out.push(unary_num_kernel(name, a, kernel, cx)?);
        }
        return Ok(Value::list(out));
    }
    Err(cx.error(format!("{name} {}: domain error", crate::format::repr(x))))
}

/// Left-to-right reduction of a binary primitive over a list, starting
/// from the primitive's identity.
pub fn reduce(prim: BinaryPrim, zero: Value, arg: &Value, cx: &dyn Context) -> Result<Value> {
    let Some(view) = arg.list_view() else {
        return Err(cx.error(format!("{arg}: not a list")));
    };
    let mut acc = zero;
    let items: Vec<Value> = view.iter().collect();
    for item in items {
        acc = binary_op(prim, acc, item, cx)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AtSystem;

    #[test]
    fn broadcast_follows_the_pointwise_law() {
        let xs = Value::list(vec![Value::Num(1.0), Value::Num(2.0)]);
        let ys = Value::list(vec![Value::Num(10.0), Value::Num(20.0)]);
        let r = binary_op(BinaryPrim::Add, xs, ys, &AtSystem).expect("add");
        let Value::Ref(r) = &r else { panic!() };
        let RefValue::List(items) = &**r else { panic!() };
        assert!(matches!(items[0], Value::Num(n) if n == 11.0));
        assert!(matches!(items[1], Value::Num(n) if n == 22.0));
    }

    #[test]
    fn mismatched_sizes_raise() {
        let xs = Value::list(vec![Value::Num(1.0), Value::Num(2.0)]);
        let ys = Value::list(vec![Value::Num(10.0)]);
        let err = binary_op(BinaryPrim::Add, xs, ys, &AtSystem).expect_err("mismatch");
        assert!(err.message().contains("mismatched list sizes"));
    }

    #[test]
    fn nan_production_is_a_domain_error() {
        let err = binary_op(BinaryPrim::Div, Value::Num(0.0), Value::Num(0.0), &AtSystem)
            .expect_err("0/0");
        assert_eq!(err.message(), "0/0: domain error");
    }

    #[test]
    fn scalar_list_broadcast() {
        let xs = Value::list(vec![Value::Num(1.0), Value::Num(2.0), Value::Num(3.0)]);
        let r = binary_op(BinaryPrim::Add, xs, Value::Num(10.0), &AtSystem).expect("add");
        let Value::Ref(r) = &r else { panic!() };
        let RefValue::List(items) = &**r else { panic!() };
        assert!(matches!(items[2], Value::Num(n) if n == 13.0));
    }

    #[test]
    fn reactive_operands_build_reactive_expressions() {
        use crate::context::AtPhrase;
        use crate::parse::parse_program;
        use crate::scan::Scanner;
        use crate::source::Source;
        use crate::symbol::Symbol;
        use crate::types::reactive::UniformVariable;
        use crate::value::Ternary;

        let mut scanner = Scanner::new(Source::new("t", "u + 1"));
        let phrase = parse_program(&mut scanner).expect("parse");
        let cx = AtPhrase::analysing(phrase);
        let uniform = Value::Ref(Rc::new(RefValue::Reactive(Reactive::Uniform(
            UniformVariable {
                name: Symbol::new("u"),
                ty: ScType::num(),
            },
        ))));
        let r = binary_op(BinaryPrim::Add, uniform.clone(), Value::Num(1.0), &cx)
            .expect("reactive add");
        let Value::Ref(r) = &r else { panic!() };
        let RefValue::Reactive(Reactive::Expr(e)) = &**r else {
            panic!("expected a reactive expression")
        };
        assert!(e.ty.is_num());
        // Equality with a reactive operand cannot be decided here.
        assert_eq!(
            uniform.equal(&Value::Num(0.0), &cx).expect("equal"),
            Ternary::Unknown
        );
    }
}
