//! Sequence building.
//!
//! The canonical representation of a sequence of characters is String; a
//! sequence containing anything else is List. The builder starts out
//! accumulating bytes and promotes itself to a value list the first time a
//! non-character is pushed.

use crate::context::Context;
use crate::error::Result;
use crate::value::Value;

#[derive(Debug)]
enum BuilderRep {
    Chars(Vec<u8>),
    Values(Vec<Value>),
}

#[derive(Debug)]
pub struct ListBuilder {
    rep: BuilderRep,
}

impl Default for ListBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ListBuilder {
    pub fn new() -> Self {
        Self {
            rep: BuilderRep::Chars(Vec::new()),
        }
    }

    pub fn push(&mut self, value: Value) {
        match (&mut self.rep, &value) {
            (BuilderRep::Chars(bytes), Value::Char(c)) => bytes.push(*c),
            (BuilderRep::Chars(bytes), _) => {
                let mut values: Vec<Value> =
                    bytes.iter().map(|&b| Value::Char(b)).collect();
                values.push(value);
                self.rep = BuilderRep::Values(values);
            }
            (BuilderRep::Values(values), _) => values.push(value),
        }
    }

    pub fn push_str(&mut self, text: &str) {
        for b in text.bytes() {
            self.push(Value::Char(b));
        }
    }

    /// Append every element of a list or string; the operand of `++`.
    pub fn concat(&mut self, value: &Value, cx: &dyn Context) -> Result<()> {
        let Some(view) = value.list_view() else {
            return Err(cx.error(format!("{value}: not a list")));
        };
        for item in view.iter() {
            self.push(item);
        }
        Ok(())
    }

    pub fn get_value(self) -> Value {
        match self.rep {
            // An empty sequence is the empty list.
            BuilderRep::Chars(bytes) if bytes.is_empty() => Value::list(Vec::new()),
            BuilderRep::Chars(bytes) => Value::string(bytes),
            BuilderRep::Values(values) => Value::list(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RefValue;

    #[test]
    fn all_characters_build_a_string() {
        let mut lb = ListBuilder::new();
        lb.push(Value::Char(b'h'));
        lb.push(Value::Char(b'i'));
        let v = lb.get_value();
        let Value::Ref(r) = &v else { panic!() };
        assert!(matches!(&**r, RefValue::String(b) if &**b == b"hi"));
    }

    #[test]
    fn a_non_character_promotes_to_a_list() {
        let mut lb = ListBuilder::new();
        lb.push(Value::Char(b'h'));
        lb.push(Value::Num(1.0));
        let v = lb.get_value();
        let Value::Ref(r) = &v else { panic!() };
        let RefValue::List(items) = &**r else { panic!() };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Value::Char(b'h')));
    }
}
