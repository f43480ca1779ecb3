//! The Curv language core.
//!
//! Curv is a pure, dynamically typed, array-oriented functional language
//! for constructing 2D/3D shapes as signed-distance functions. This crate
//! is the language pipeline: source text is scanned into tokens, parsed
//! into a loss-less phrase tree, analysed into an executable Meaning tree
//! with lexically scoped slots and SCC-ordered recursive definitions, and
//! evaluated by a tree walker with proper tail calls. The same Meaning
//! tree can instead be abstractly evaluated by the SubCurv shape compiler,
//! which lowers a statically typed subset of the language to GLSL-flavoured
//! SSA text for the GPU.
//!
//! ```
//! use curv::{System, eval_str, repr};
//!
//! let system = System::new();
//! let value = eval_str("[1,2,3] + 10", "[expr]", system).unwrap();
//! assert_eq!(repr(&value), "[11,12,13]");
//! ```

pub mod analyse;
pub mod builtins;
pub mod context;
pub mod error;
pub mod format;
pub mod frame;
pub mod meaning;
pub mod parse;
pub mod pattern;
pub mod phrase;
pub mod prim;
pub mod program;
pub mod scan;
pub mod scope;
pub mod sc;
pub mod source;
pub mod symbol;
pub mod system;
pub mod tree;
pub mod types;
pub mod value;

pub use crate::{
    error::{Exception, Fail, FuncLoc, Result},
    format::{NumStyle, format_num, num_repr, repr, to_json},
    program::{Program, eval_str},
    sc::{
        compiler::{ScCompiler, ScValue},
        ty::{ScType, sc_type_of},
    },
    source::Source,
    symbol::Symbol,
    system::{CollectConsole, Console, NoConsole, SourceState, StdConsole, System},
    value::{Ternary, Value},
};
