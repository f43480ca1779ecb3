//! Type values, and the "plex" classification the shape compiler uses.
//!
//! A plex is a type with a direct GPU representation: a scalar, a small
//! vector (2..4), a small square matrix (2..4), or a 32-bit bool vector.
//! Everything else SubCurv supports is an array of plexes.

use std::fmt;
use std::rc::Rc;

/// A type value.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Error,
    Bool,
    /// A vector of 32 booleans, treated as a machine word on the GPU.
    Bool32,
    Num,
    Char,
    /// A fixed-count array.
    Array { count: u32, elem: Rc<Ty> },
}

/// The GPU shapes a type can directly lower to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlexType {
    Missing,
    Bool,
    Bool2,
    Bool3,
    Bool4,
    Bool32,
    Bool2x32,
    Bool3x32,
    Bool4x32,
    Num,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

pub const GLSL_PLEX_TYPE_NAME: [&str; 16] = [
    "<missing>",
    "bool",
    "bvec2",
    "bvec3",
    "bvec4",
    "uint",
    "uvec2",
    "uvec3",
    "uvec4",
    "float",
    "vec2",
    "vec3",
    "vec4",
    "mat2",
    "mat3",
    "mat4",
];

impl Ty {
    pub fn array(count: u32, elem: Rc<Self>) -> Rc<Self> {
        Rc::new(Self::Array { count, elem })
    }

    pub fn plex_type(&self) -> PlexType {
        match self {
            Self::Bool => PlexType::Bool,
            Self::Bool32 => PlexType::Bool32,
            Self::Num => PlexType::Num,
            Self::Array { count, elem } => match (&**elem, count) {
                (Self::Bool, 2) => PlexType::Bool2,
                (Self::Bool, 3) => PlexType::Bool3,
                (Self::Bool, 4) => PlexType::Bool4,
                (Self::Bool32, 2) => PlexType::Bool2x32,
                (Self::Bool32, 3) => PlexType::Bool3x32,
                (Self::Bool32, 4) => PlexType::Bool4x32,
                (Self::Num, 2) => PlexType::Vec2,
                (Self::Num, 3) => PlexType::Vec3,
                (Self::Num, 4) => PlexType::Vec4,
                (Self::Array { count: n, elem: e }, m)
                    if n == m && matches!(&**e, Self::Num) && (2..=4).contains(n) =>
                {
                    match n {
                        2 => PlexType::Mat2,
                        3 => PlexType::Mat3,
                        _ => PlexType::Mat4,
                    }
                }
                _ => PlexType::Missing,
            },
            Self::Error | Self::Char => PlexType::Missing,
        }
    }

    /// Number of array dimensions above the innermost scalar.
    pub fn rank(&self) -> u32 {
        match self {
            Self::Array { elem, .. } => 1 + elem.rank(),
            _ => 0,
        }
    }

    /// Number of array dimensions above the largest plex suffix.
    pub fn plex_array_rank(&self) -> u32 {
        if self.plex_type() != PlexType::Missing {
            0
        } else {
            match self {
                Self::Array { elem, .. } => 1 + elem.plex_array_rank(),
                _ => 0,
            }
        }
    }

    pub fn plex_array_base(&self) -> &Self {
        if self.plex_type() != PlexType::Missing {
            self
        } else {
            match self {
                Self::Array { elem, .. } => elem.plex_array_base(),
                other => other,
            }
        }
    }

    /// First dimension if this is an array, 1 otherwise.
    pub fn count(&self) -> u32 {
        match self {
            Self::Array { count, .. } => *count,
            _ => 1,
        }
    }

    /// Strip one array dimension.
    pub fn elem_type(&self) -> Rc<Self> {
        match self {
            Self::Array { elem, .. } => Rc::clone(elem),
            other => Rc::new(other.clone()),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "Error"),
            Self::Bool => write!(f, "Bool"),
            Self::Bool32 => write!(f, "Bool32"),
            Self::Num => write!(f, "Num"),
            Self::Char => write!(f, "Char"),
            Self::Array { count, elem } => write!(f, "Array[{count}]{elem}"),
        }
    }
}
