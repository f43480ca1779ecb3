//! Index values: the three kinds of tree address.

use crate::context::Context;
use crate::error::Result;
use crate::value::{RefValue, Ternary, Value};
use std::rc::Rc;

/// A first-class tree address.
///
/// `TId` addresses the tree itself. `TPath(i, j)` applies `i`, then `j` to
/// the result. `TSlice(i, j)` applies `i`, then maps `j` over each element
/// of the result.
#[derive(Debug, Clone)]
pub enum IndexValue {
    TId,
    TPath(Value, Value),
    TSlice(Value, Value),
}

impl IndexValue {
    pub fn equal(&self, other: &Self, cx: &dyn Context) -> Result<Ternary> {
        match (self, other) {
            (Self::TId, Self::TId) => Ok(Ternary::True),
            (Self::TPath(a1, a2), Self::TPath(b1, b2))
            | (Self::TSlice(a1, a2), Self::TSlice(b1, b2)) => {
                Ok(a1.equal(b1, cx)?.and(a2.equal(b2, cx)?))
            }
            _ => Ok(Ternary::False),
        }
    }
}

/// Build a right-nested `TPath` from a sequence of index values.
/// Zero indices is the identity; one index is itself.
pub fn make_tpath(indexes: &[Value]) -> Value {
    match indexes {
        [] => Value::Ref(Rc::new(RefValue::Index(IndexValue::TId))),
        [single] => single.clone(),
        [first, rest @ ..] => Value::Ref(Rc::new(RefValue::Index(IndexValue::TPath(
            first.clone(),
            make_tpath(rest),
        )))),
    }
}

/// Build a right-nested `TSlice` from a sequence of index values.
pub fn make_tslice(indexes: &[Value]) -> Value {
    match indexes {
        [] => Value::Ref(Rc::new(RefValue::Index(IndexValue::TId))),
        [single] => single.clone(),
        [first, rest @ ..] => Value::Ref(Rc::new(RefValue::Index(IndexValue::TSlice(
            first.clone(),
            make_tslice(rest),
        )))),
    }
}
