//! Printing: numbers in five styles, value repr and string conversion,
//! and the JSON printer used by the external API.

use std::fmt;

use crate::context::Context;
use crate::error::Result;
use crate::types::index::IndexValue;
use crate::types::reactive::Reactive;
use crate::types::record::module_fields;
use crate::value::{RefValue, Value};

/// The five numeral output styles. They differ only in how the infinities
/// are spelled; finite numbers always use the shortest representation that
/// round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStyle {
    /// `inf`, accepted by strtod.
    C,
    /// JSON has no infinity; an out-of-range literal parses as one.
    Json,
    /// XSD spelling: `INF`.
    Xml,
    /// A spelling that evaluates to infinity in most languages: `1/0`.
    Expr,
    /// Curv source syntax.
    Curv,
}

/// Format a finite or infinite number in the given style. The argument is
/// never NaN: number values cannot contain one.
pub fn format_num(n: f64, style: NumStyle) -> String {
    if n.is_infinite() {
        let pos = n > 0.0;
        return match style {
            NumStyle::C | NumStyle::Curv => {
                if pos { "inf" } else { "-inf" }.to_string()
            }
            NumStyle::Json => if pos { "1e9999" } else { "-1e9999" }.to_string(),
            NumStyle::Xml => if pos { "INF" } else { "-INF" }.to_string(),
            NumStyle::Expr => if pos { "1/0" } else { "-1/0" }.to_string(),
        };
    }
    // Integral values print without a fraction part; everything else gets
    // the shortest round-trip form.
    if n == n.trunc() && n.abs() < 1e15 {
        let i = n as i64;
        if i == 0 && n.is_sign_negative() {
            return "-0".to_string();
        }
        return format!("{i}");
    }
    let mut buf = ryu::Buffer::new();
    buf.format(n).to_string()
}

pub fn num_repr(n: f64) -> String {
    format_num(n, NumStyle::Curv)
}

/// Print a value like a Curv expression.
pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    let _ = write_repr(&mut out, value);
    out
}

pub fn write_repr(out: &mut impl fmt::Write, value: &Value) -> fmt::Result {
    match value {
        Value::Missing => write!(out, "<missing>"),
        Value::Num(n) => write!(out, "{}", num_repr(*n)),
        Value::Bool(b) => write!(out, "#{b}"),
        Value::Char(c) => write!(out, "char {c}"),
        Value::Ref(r) => match &**r {
            RefValue::Symbol(sym) => write!(out, "#{sym}"),
            RefValue::String(bytes) => write_string_literal(out, bytes),
            RefValue::List(items) => {
                write!(out, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(out, ",")?;
                    }
                    write_repr(out, item)?;
                }
                write!(out, "]")
            }
            RefValue::Record(fields) => {
                write!(out, "{{")?;
                for (i, (name, fval)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(out, ",")?;
                    }
                    write!(out, "{name}:")?;
                    write_repr(out, fval)?;
                }
                write!(out, "}}")
            }
            RefValue::Module(module) => {
                write!(out, "{{")?;
                for (i, (name, fval)) in module_fields(module).iter().enumerate() {
                    if i > 0 {
                        write!(out, ",")?;
                    }
                    write!(out, "{name}:")?;
                    write_repr(out, fval)?;
                }
                write!(out, "}}")
            }
            RefValue::DirRecord(dir) => {
                write!(out, "dir \"{}\"", dir.path.display())
            }
            RefValue::Function(f) => match f.name() {
                Some(name) => write!(out, "<function {name}>"),
                None => write!(out, "<function>"),
            },
            RefValue::Lambda(lambda) => match &lambda.name {
                Some(name) => write!(out, "<lambda {name}>"),
                None => write!(out, "<lambda>"),
            },
            RefValue::Reactive(re) => match re {
                Reactive::Uniform(u) => write!(out, "<uniform {}>", u.name),
                Reactive::Expr(_) => write!(out, "<reactive>"),
            },
            RefValue::Type(ty) => write!(out, "{ty}"),
            RefValue::Index(ix) => match ix {
                IndexValue::TId => write!(out, "tid"),
                IndexValue::TPath(a, b) => {
                    write!(out, "tpath [")?;
                    write_repr(out, a)?;
                    write!(out, ",")?;
                    write_repr(out, b)?;
                    write!(out, "]")
                }
                IndexValue::TSlice(a, b) => {
                    write!(out, "tslice [")?;
                    write_repr(out, a)?;
                    write!(out, ",")?;
                    write_repr(out, b)?;
                    write!(out, "]")
                }
            },
        },
    }
}

/// Print a string as a Curv string literal, re-escaping the bytes that
/// string syntax cannot contain raw.
fn write_string_literal(out: &mut impl fmt::Write, bytes: &[u8]) -> fmt::Result {
    write!(out, "\"")?;
    for &b in bytes {
        match b {
            b'$' => write!(out, "$.")?,
            b'"' => write!(out, "$=")?,
            0x20..=0x7E => write!(out, "{}", b as char)?,
            _ => write!(out, "$[{b}]")?,
        }
    }
    write!(out, "\"")
}

/// Print a value like a string: the conversion used by `${...}`
/// interpolation. Strings and characters contribute their raw bytes,
/// symbols their name; everything else falls back to repr.
pub fn write_string_bytes(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Char(c) => out.push(*c),
        Value::Ref(r) => match &**r {
            RefValue::String(bytes) => out.extend_from_slice(bytes),
            RefValue::Symbol(sym) => out.extend_from_slice(sym.as_str().as_bytes()),
            _ => out.extend_from_slice(repr(value).as_bytes()),
        },
        _ => out.extend_from_slice(repr(value).as_bytes()),
    }
}

/// The JSON rendition of a value, used by the external API. The symbol
/// `#null` maps to JSON null; functions and reactive values have no JSON
/// form and raise.
pub fn to_json(value: &Value, cx: &dyn Context) -> Result<serde_json::Value> {
    use serde_json::Value as J;
    match value {
        // Numbers use the JSON numeral style: infinities become the
        // out-of-range literal 1e9999, emitted as a raw number token.
        Value::Num(n) => {
            let literal = format_num(*n, NumStyle::Json);
            let num: serde_json::Number = literal
                .parse()
                .map_err(|_| cx.error(format!("{value}: not representable in JSON")))?;
            Ok(J::Number(num))
        }
        Value::Bool(b) => Ok(J::Bool(*b)),
        Value::Char(c) => Ok(J::String((*c as char).to_string())),
        Value::Ref(r) => match &**r {
            RefValue::Symbol(sym) if sym.as_str() == "null" => Ok(J::Null),
            RefValue::Symbol(sym) => Ok(J::String(sym.as_str().to_string())),
            RefValue::String(bytes) => {
                Ok(J::String(String::from_utf8_lossy(bytes).into_owned()))
            }
            RefValue::List(items) => {
                let mut arr = Vec::with_capacity(items.len());
                for item in items {
                    arr.push(to_json(item, cx)?);
                }
                Ok(J::Array(arr))
            }
            RefValue::Record(fields) => {
                let mut obj = serde_json::Map::new();
                for (name, fval) in fields {
                    obj.insert(name.as_str().to_string(), to_json(fval, cx)?);
                }
                Ok(J::Object(obj))
            }
            RefValue::Module(module) => {
                let mut obj = serde_json::Map::new();
                for (name, fval) in module_fields(module) {
                    obj.insert(name.as_str().to_string(), to_json(&fval, cx)?);
                }
                Ok(J::Object(obj))
            }
            _ => Err(cx.error(format!("{value}: not representable in JSON"))),
        },
        Value::Missing => Err(cx.error("missing value has no JSON form".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(num_repr(42.0), "42");
        assert_eq!(num_repr(42.7), "42.7");
        assert_eq!(num_repr(-0.0), "-0");
        assert_eq!(num_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn infinity_spelling_varies_by_style() {
        assert_eq!(format_num(f64::INFINITY, NumStyle::Json), "1e9999");
        assert_eq!(format_num(f64::NEG_INFINITY, NumStyle::Xml), "-INF");
        assert_eq!(format_num(f64::INFINITY, NumStyle::Expr), "1/0");
    }

    #[test]
    fn strings_reescape_on_print() {
        let v = Value::string(b"a$b\"c\n".to_vec());
        assert_eq!(repr(&v), "\"a$.b$=c$[10]\"");
    }

    #[test]
    fn json_numbers_use_the_json_style() {
        use crate::context::AtSystem;
        let j = to_json(&Value::Num(f64::INFINITY), &AtSystem).expect("json");
        assert_eq!(j.to_string(), "1e9999");
        let j = to_json(&Value::Num(f64::NEG_INFINITY), &AtSystem).expect("json");
        assert_eq!(j.to_string(), "-1e9999");
        let j = to_json(&Value::Num(42.7), &AtSystem).expect("json");
        assert_eq!(j.to_string(), "42.7");
    }
}
