//! SubCurv types: a thin wrapper over type values with plex queries.

use std::fmt;
use std::rc::Rc;

use crate::types::ty::{GLSL_PLEX_TYPE_NAME, PlexType, Ty};
use crate::value::{RefValue, Value};

/// The type of a SubCurv value. Never null; the error type marks values
/// outside the SubCurv subset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScType(pub Rc<Ty>);

impl ScType {
    pub fn error() -> Self {
        Self(Rc::new(Ty::Error))
    }

    pub fn bool() -> Self {
        Self(Rc::new(Ty::Bool))
    }

    pub fn bool32() -> Self {
        Self(Rc::new(Ty::Bool32))
    }

    pub fn num() -> Self {
        Self(Rc::new(Ty::Num))
    }

    /// A numeric vector of count 2..4.
    pub fn vec(n: u32) -> Self {
        debug_assert!((2..=4).contains(&n));
        Self(Ty::array(n, Rc::new(Ty::Num)))
    }

    /// A square numeric matrix of count 2..4.
    pub fn mat(n: u32) -> Self {
        debug_assert!((2..=4).contains(&n));
        Self(Ty::array(n, Ty::array(n, Rc::new(Ty::Num))))
    }

    pub fn list(elem: &Self, n: u32) -> Self {
        Self(Ty::array(n, Rc::clone(&elem.0)))
    }

    pub fn is_error(&self) -> bool {
        matches!(&*self.0, Ty::Error)
    }

    pub fn is_bool(&self) -> bool {
        self.0.plex_type() == PlexType::Bool
    }

    pub fn is_bool_or_vec(&self) -> bool {
        (PlexType::Bool..=PlexType::Bool4).contains(&self.0.plex_type())
    }

    pub fn is_bool32(&self) -> bool {
        self.0.plex_type() == PlexType::Bool32
    }

    pub fn is_num(&self) -> bool {
        self.0.plex_type() == PlexType::Num
    }

    pub fn is_num_or_vec(&self) -> bool {
        (PlexType::Num..=PlexType::Vec4).contains(&self.0.plex_type())
    }

    /// A number, vector or matrix; the operand shapes of GLSL arithmetic.
    pub fn is_num_plex(&self) -> bool {
        (PlexType::Num..=PlexType::Mat4).contains(&self.0.plex_type())
    }

    pub fn is_num_vec(&self) -> bool {
        (PlexType::Vec2..=PlexType::Vec4).contains(&self.0.plex_type())
    }

    pub fn is_mat(&self) -> bool {
        (PlexType::Mat2..=PlexType::Mat4).contains(&self.0.plex_type())
    }

    pub fn is_plex(&self) -> bool {
        self.0.plex_type() != PlexType::Missing
    }

    pub fn is_list(&self) -> bool {
        matches!(&*self.0, Ty::Array { .. })
    }

    /// First dimension if a list, 1 otherwise.
    pub fn count(&self) -> u32 {
        self.0.count()
    }

    pub fn elem_type(&self) -> Self {
        Self(self.0.elem_type())
    }

    pub fn rank(&self) -> u32 {
        self.0.rank()
    }

    pub fn plex_array_rank(&self) -> u32 {
        self.0.plex_array_rank()
    }

    /// The GLSL name of a plex type; None for general arrays, which need
    /// C-style declaration syntax.
    pub fn glsl_name(&self) -> Option<&'static str> {
        match self.0.plex_type() {
            PlexType::Missing => None,
            plex => Some(GLSL_PLEX_TYPE_NAME[plex as usize]),
        }
    }
}

impl fmt::Display for ScType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.glsl_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// The SubCurv type of a value, or the error type if the value is outside
/// the SubCurv subset.
pub fn sc_type_of(value: &Value) -> ScType {
    match value {
        Value::Num(_) => ScType::num(),
        Value::Bool(_) => ScType::bool(),
        Value::Ref(r) => match &**r {
            RefValue::Reactive(re) => re.sc_type(),
            RefValue::List(items) => {
                if items.is_empty() {
                    return ScType::error();
                }
                let elem = sc_type_of(&items[0]);
                if elem.is_error() {
                    return ScType::error();
                }
                for item in &items[1..] {
                    if sc_type_of(item) != elem {
                        return ScType::error();
                    }
                }
                ScType::list(&elem, items.len() as u32)
            }
            RefValue::Type(ty) => ScType(Rc::new(ty.clone())),
            _ => ScType::error(),
        },
        _ => ScType::error(),
    }
}

/// Unify two tensor types for a broadcasting operation, promoting scalars
/// to the other operand's shape. Error type on failure.
pub fn sc_unify_tensor_types(a: &ScType, b: &ScType) -> ScType {
    if a == b {
        return a.clone();
    }
    if a.is_num() && b.is_num_plex() {
        return b.clone();
    }
    if b.is_num() && a.is_num_plex() {
        return a.clone();
    }
    if a.is_bool() && b.is_bool_or_vec() {
        return b.clone();
    }
    if b.is_bool() && a.is_bool_or_vec() {
        return a.clone();
    }
    if let (Ty::Array { count: ca, elem: ea }, Ty::Array { count: cb, elem: eb }) =
        (&*a.0, &*b.0)
        && ca == cb
    {
        let elem = sc_unify_tensor_types(&ScType(Rc::clone(ea)), &ScType(Rc::clone(eb)));
        if !elem.is_error() {
            return ScType::list(&elem, *ca);
        }
    }
    ScType::error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_of_numbers_are_vectors() {
        let v = Value::list(vec![Value::Num(1.0), Value::Num(2.0), Value::Num(3.0)]);
        let t = sc_type_of(&v);
        assert!(t.is_num_vec());
        assert_eq!(t.count(), 3);
        assert_eq!(t.glsl_name(), Some("vec3"));
    }

    #[test]
    fn nested_equal_vectors_are_matrices() {
        let row = Value::list(vec![Value::Num(0.0), Value::Num(1.0)]);
        let m = Value::list(vec![row.clone(), row]);
        let t = sc_type_of(&m);
        assert!(t.is_mat());
        assert_eq!(t.glsl_name(), Some("mat2"));
    }

    #[test]
    fn unification_promotes_scalars() {
        let unified = sc_unify_tensor_types(&ScType::num(), &ScType::vec(3));
        assert_eq!(unified, ScType::vec(3));
        assert!(sc_unify_tensor_types(&ScType::vec(2), &ScType::vec(3)).is_error());
    }
}
