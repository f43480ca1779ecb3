//! The boxed, dynamically typed value of the Curv runtime.
//!
//! A `Value` stores small values inline (numbers, booleans, characters, and
//! the `missing` pseudovalue) and heap values behind a shared pointer, a
//! tagged-enum stand-in for a NaN box with the same observable invariants:
//!
//! * numbers never contain NaN: arithmetic that would produce NaN yields
//!   the missing value instead,
//! * missing is never observable from user programs,
//! * copying a reference value shares it; the last drop frees it.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::context::Context;
use crate::error::{Exception, Fail, Result};
use crate::symbol::Symbol;
use crate::types::function::{Function, LambdaData};
use crate::types::index::IndexValue;
use crate::types::record::{DRecord, DirRecordData, ModuleData};
use crate::types::reactive::Reactive;
use crate::types::ty::Ty;

/// Three-valued truth, needed because equality of reactive values cannot be
/// decided until GPU runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    False,
    True,
    Unknown,
}

impl Ternary {
    pub fn from_bool(b: bool) -> Self {
        if b { Self::True } else { Self::False }
    }

    /// Three-valued conjunction, used when folding element comparisons.
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            _ => Self::True,
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// The coarse type of a heap value, readable without looking inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Symbol,
    List,
    Record,
    Function,
    Lambda,
    Reactive,
    Type,
    Index,
}

/// A heap value. Cloning is the copy-on-write step of tree amendment:
/// lists and records deep-copy one spine level, everything else is a cheap
/// shared-pointer bump.
#[derive(Debug, Clone)]
pub enum RefValue {
    Symbol(Symbol),
    /// The canonical representation of a list whose elements are all
    /// characters. Raw bytes, not guaranteed UTF-8.
    String(Box<[u8]>),
    List(Vec<Value>),
    Record(DRecord),
    Module(Rc<ModuleData>),
    DirRecord(Rc<DirRecordData>),
    Function(Function),
    Lambda(Rc<LambdaData>),
    Reactive(Reactive),
    Type(Ty),
    Index(IndexValue),
}

impl RefValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Symbol(_) => TypeTag::Symbol,
            Self::String(_) | Self::List(_) => TypeTag::List,
            Self::Record(_) | Self::Module(_) | Self::DirRecord(_) => TypeTag::Record,
            Self::Function(_) => TypeTag::Function,
            Self::Lambda(_) => TypeTag::Lambda,
            Self::Reactive(_) => TypeTag::Reactive,
            Self::Type(_) => TypeTag::Type,
            Self::Index(_) => TypeTag::Index,
        }
    }
}

/// A Curv runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absence of a value. Never observable from user programs; used by
    /// library interfaces the way a null pointer would be.
    #[default]
    Missing,
    /// Any IEEE double except NaN.
    Num(f64),
    Bool(bool),
    Char(u8),
    Ref(Rc<RefValue>),
}

impl Value {
    /// Construct a number value; NaN becomes the missing value.
    pub fn num(n: f64) -> Self {
        if n.is_nan() { Self::Missing } else { Self::Num(n) }
    }

    pub fn symbol(sym: Symbol) -> Self {
        Self::Ref(Rc::new(RefValue::Symbol(sym)))
    }

    pub fn string(bytes: impl Into<Box<[u8]>>) -> Self {
        Self::Ref(Rc::new(RefValue::String(bytes.into())))
    }

    pub fn list(items: Vec<Self>) -> Self {
        Self::Ref(Rc::new(RefValue::List(items)))
    }

    /// Symbols `#true` and `#false` are encoded as the boolean immediates.
    pub fn from_symbol_name(name: &str) -> Self {
        match name {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::symbol(Symbol::new(name)),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// The number contained in the value, or NaN. Mirrors the boxed
    /// representation's "any non-number reads as NaN" fast path, which the
    /// broadcast framework relies on.
    pub fn num_or_nan(&self) -> f64 {
        match self {
            Self::Num(n) => *n,
            _ => f64::NAN,
        }
    }

    pub fn as_ref_value(&self) -> Option<&Rc<RefValue>> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn to_num(&self, cx: &dyn Context) -> Result<f64> {
        match self {
            Self::Num(n) => Ok(*n),
            _ => Err(cx.error(format!("{self}: not a number"))),
        }
    }

    pub fn to_bool(&self, cx: &dyn Context) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(cx.error(format!("{self}: not a boolean"))),
        }
    }

    pub fn to_char(&self, cx: &dyn Context) -> Result<u8> {
        match self {
            Self::Char(c) => Ok(*c),
            _ => Err(cx.error(format!("{self}: not a character"))),
        }
    }

    /// Convert to an integer in `lo..=hi`.
    pub fn to_int(&self, lo: i64, hi: i64, cx: &dyn Context) -> Result<i64> {
        let n = self.to_num(cx)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(cx.error(format!("{self}: not an integer")));
        }
        let i = n as i64;
        if i < lo || i > hi {
            return Err(cx.error(format!("{self}: out of range [{lo}..{hi}]")));
        }
        Ok(i)
    }

    pub fn maybe_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Ref(r) => match &**r {
                RefValue::Symbol(sym) => Some(sym),
                _ => None,
            },
            _ => None,
        }
    }

    /// Deep structural equality; ternary because reactive values compare
    /// as unknown. Function values are equal only when they are the same
    /// reference.
    pub fn equal(&self, other: &Self, cx: &dyn Context) -> Result<Ternary> {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => Ok(Ternary::from_bool(a == b)),
            (Self::Bool(a), Self::Bool(b)) => Ok(Ternary::from_bool(a == b)),
            (Self::Char(a), Self::Char(b)) => Ok(Ternary::from_bool(a == b)),
            (Self::Missing, Self::Missing) => Ok(Ternary::True),
            (Self::Ref(a), Self::Ref(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(Ternary::True);
                }
                ref_equal(a, b, cx)
            }
            (Self::Ref(r), _) | (_, Self::Ref(r))
                if matches!(&**r, RefValue::Reactive(_)) =>
            {
                Ok(Ternary::Unknown)
            }
            _ => Ok(Ternary::False),
        }
    }

    /// Bit-level hashing used by the shape compiler's operation cache.
    /// Consistent with [`Self::hash_eq`], not with [`Self::equal`].
    pub fn hash_value<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Missing => 0u8.hash(state),
            Self::Num(n) => {
                1u8.hash(state);
                n.to_bits().hash(state);
            }
            Self::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            Self::Char(c) => {
                3u8.hash(state);
                c.hash(state);
            }
            Self::Ref(r) => {
                4u8.hash(state);
                hash_ref(r, state);
            }
        }
    }

    /// Hash-consistent equality: numbers compare bitwise, heap values
    /// structurally where cheap and by identity otherwise.
    pub fn hash_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Missing, Self::Missing) => true,
            (Self::Num(a), Self::Num(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                match (&**a, &**b) {
                    (RefValue::Symbol(x), RefValue::Symbol(y)) => x == y,
                    (RefValue::String(x), RefValue::String(y)) => x == y,
                    (RefValue::List(x), RefValue::List(y)) => {
                        x.len() == y.len()
                            && x.iter().zip(y.iter()).all(|(a, b)| a.hash_eq(b))
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// The failure-mode-aware conversion entry used by pattern matching and
    /// the primitive framework: hard failure raises, soft failure yields
    /// `None`.
    pub fn to_list_like<'a>(
        &'a self,
        fail: Fail,
        cx: &dyn Context,
    ) -> Result<Option<ListView<'a>>> {
        match self.list_view() {
            Some(view) => Ok(Some(view)),
            None => match fail {
                Fail::Soft => Ok(None),
                Fail::Hard => Err(cx.error(format!("{self}: not a list"))),
            },
        }
    }

    /// A uniform read-only view over the two sequence representations.
    pub fn list_view(&self) -> Option<ListView<'_>> {
        match self {
            Self::Ref(r) => match &**r {
                RefValue::List(items) => Some(ListView::List(items)),
                RefValue::String(bytes) => Some(ListView::String(bytes)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Read-only view of a sequence value: a List of values or a String of
/// characters.
#[derive(Debug, Clone, Copy)]
pub enum ListView<'a> {
    List(&'a [Value]),
    String(&'a [u8]),
}

impl ListView<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::String(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, i: usize) -> Value {
        match self {
            Self::List(items) => items[i].clone(),
            Self::String(bytes) => Value::Char(bytes[i]),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(|i| self.at(i))
    }
}

fn ref_equal(a: &Rc<RefValue>, b: &Rc<RefValue>, cx: &dyn Context) -> Result<Ternary> {
    use RefValue as R;
    match (&**a, &**b) {
        (R::Reactive(_), _) | (_, R::Reactive(_)) => Ok(Ternary::Unknown),
        (R::Symbol(x), R::Symbol(y)) => Ok(Ternary::from_bool(x == y)),
        (R::String(x), R::String(y)) => Ok(Ternary::from_bool(x == y)),
        // Sequences compare elementwise regardless of representation.
        (R::String(_) | R::List(_), R::String(_) | R::List(_)) => {
            let va = Value::Ref(Rc::clone(a));
            let vb = Value::Ref(Rc::clone(b));
            let (la, lb) = (va.list_view().unwrap(), vb.list_view().unwrap());
            if la.len() != lb.len() {
                return Ok(Ternary::False);
            }
            let mut acc = Ternary::True;
            for i in 0..la.len() {
                acc = acc.and(la.at(i).equal(&lb.at(i), cx)?);
                if acc == Ternary::False {
                    return Ok(acc);
                }
            }
            Ok(acc)
        }
        (R::DirRecord(x), R::DirRecord(y)) => {
            // Equality of directory records compares pathnames.
            Ok(Ternary::from_bool(x.path == y.path))
        }
        (
            R::Record(_) | R::Module(_) | R::DirRecord(_),
            R::Record(_) | R::Module(_) | R::DirRecord(_),
        ) => crate::types::record::records_equal(a, b, cx),
        // Two functions are equal only if they are the same reference,
        // which was ruled out above.
        (R::Function(_), R::Function(_)) | (R::Lambda(_), R::Lambda(_)) => Ok(Ternary::False),
        (R::Type(x), R::Type(y)) => Ok(Ternary::from_bool(x == y)),
        (R::Index(x), R::Index(y)) => x.equal(y, cx),
        _ => Ok(Ternary::False),
    }
}

fn hash_ref<H: Hasher>(r: &RefValue, state: &mut H) {
    match r {
        RefValue::Symbol(sym) => {
            0u8.hash(state);
            sym.hash(state);
        }
        RefValue::String(bytes) => {
            1u8.hash(state);
            bytes.hash(state);
        }
        RefValue::List(items) => {
            2u8.hash(state);
            items.len().hash(state);
            for item in items {
                item.hash_value(state);
            }
        }
        // Structural hashing of the remaining kinds is not needed by the
        // op cache; hash by coarse tag so equal hashes stay consistent
        // with hash_eq (which falls back to identity for them).
        other => {
            (10u8, other.type_tag() as u8).hash(state);
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::format::write_repr(f, self)
    }
}

/// Raise the standard "not a function" / "not a record" style conversion
/// error, with the value quoted.
pub fn conversion_error(value: &Value, wanted: &str, cx: &dyn Context) -> Exception {
    cx.error(format!("{value}: not a {wanted}"))
}
