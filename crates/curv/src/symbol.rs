//! Symbols: immutable short strings used as identifiers and field names.

use std::borrow::Borrow;
use std::fmt;
use std::rc::Rc;

/// An immutable identifier-like string with cheap clones and lexical order.
///
/// Symbols compare and hash by their text. `#true` and `#false` are not
/// represented as symbols at runtime; they are the boolean immediates
/// (see `Value::from_symbol_name`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the symbol can be written without quotes: an identifier that
    /// is not a reserved word.
    pub fn is_identifier(&self) -> bool {
        let mut chars = self.0.chars();
        let leading = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        leading && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !is_reserved(&self.0)
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "by" | "do"
            | "else"
            | "for"
            | "if"
            | "in"
            | "include"
            | "let"
            | "local"
            | "parametric"
            | "test"
            | "var"
            | "where"
            | "while"
    )
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Symbol {
    /// Print the bare symbol text, quoting it if it is not an identifier.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identifier() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "'")?;
            for c in self.0.chars() {
                if c == '\'' {
                    write!(f, "'_")?;
                } else {
                    write!(f, "{c}")?;
                }
            }
            write!(f, "'")
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{self}")
    }
}

/// Decode an identifier token's text into a symbol, resolving the
/// quoted-identifier escape syntax (`'quoted name'`, with `'_` for an
/// embedded quote).
pub fn symbol_from_token_text(text: &str) -> Symbol {
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Symbol::new(&inner.replace("'_", "'"))
    } else {
        Symbol::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_symbols_round_trip() {
        let sym = symbol_from_token_text("'hello world'");
        assert_eq!(sym.as_str(), "hello world");
        assert!(!sym.is_identifier());
        assert_eq!(sym.to_string(), "'hello world'");
        assert_eq!(Symbol::new("foo").to_string(), "foo");
        assert!(!Symbol::new("while").is_identifier());
    }
}
