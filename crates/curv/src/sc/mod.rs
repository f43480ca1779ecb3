//! SubCurv: the statically typed subset of Curv lowered to GPU shader code.

pub mod compiler;
pub mod context;
pub mod ty;
