//! Parameter and definition patterns.

use indexmap::IndexMap;

use std::rc::Rc;

use crate::context::{AtField, AtIndex, Context};
use crate::error::Result;
use crate::phrase::Phrase;
use crate::symbol::Symbol;
use crate::types::record::{module_get, record_has_field};
use crate::value::{RefValue, Value};

/// A compiled pattern. `exec` decomposes a value into bindings, writing
/// each bound name into its slot; `try_exec` reports mismatch as `false`
/// instead of an error, which is how piecewise functions fall through.
#[derive(Debug)]
pub enum Pattern {
    /// `_` matches anything and binds nothing.
    Skip { syntax: Rc<Phrase> },
    Id {
        syntax: Rc<Phrase>,
        name: Symbol,
        slot: usize,
    },
    List {
        syntax: Rc<Phrase>,
        items: Vec<Rc<Pattern>>,
    },
    Record {
        syntax: Rc<Phrase>,
        fields: IndexMap<Symbol, Rc<Pattern>>,
    },
}

impl Pattern {
    pub fn syntax(&self) -> &Rc<Phrase> {
        match self {
            Self::Skip { syntax }
            | Self::Id { syntax, .. }
            | Self::List { syntax, .. }
            | Self::Record { syntax, .. } => syntax,
        }
    }

    pub fn exec(&self, slots: &mut [Value], value: &Value, cx: &dyn Context) -> Result<()> {
        match self {
            Self::Skip { .. } => Ok(()),
            Self::Id { slot, .. } => {
                slots[*slot] = value.clone();
                Ok(())
            }
            Self::List { items, .. } => {
                let Some(view) = value.list_view() else {
                    return Err(cx.error(format!("{value}: not a list")));
                };
                if view.len() != items.len() {
                    return Err(cx.error(format!(
                        "list pattern: expected {} items, got {}",
                        items.len(),
                        view.len()
                    )));
                }
                for (i, item) in items.iter().enumerate() {
                    let elem_cx = AtIndex {
                        index: i,
                        parent: cx,
                    };
                    item.exec(slots, &view.at(i), &elem_cx)?;
                }
                Ok(())
            }
            Self::Record { fields, .. } => {
                let Value::Ref(r) = value else {
                    return Err(cx.error(format!("{value}: not a record")));
                };
                for (name, pat) in fields {
                    let fval = pattern_field(r, name, cx)?;
                    let field_cx = AtField {
                        name: name.clone(),
                        parent: cx,
                    };
                    pat.exec(slots, &fval, &field_cx)?;
                }
                let size = crate::types::record::record_size(r);
                if size != fields.len() {
                    return Err(cx.error(
                        "record has extra fields not matched by pattern".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Trial match: mismatch is `false`, never an error.
    pub fn try_exec(&self, slots: &mut [Value], value: &Value, cx: &dyn Context) -> Result<bool> {
        match self {
            Self::Skip { .. } => Ok(true),
            Self::Id { slot, .. } => {
                slots[*slot] = value.clone();
                Ok(true)
            }
            Self::List { items, .. } => {
                let Some(view) = value.list_view() else {
                    return Ok(false);
                };
                if view.len() != items.len() {
                    return Ok(false);
                }
                for (i, item) in items.iter().enumerate() {
                    if !item.try_exec(slots, &view.at(i), cx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Record { fields, .. } => {
                let Value::Ref(r) = value else {
                    return Ok(false);
                };
                if !matches!(&**r, RefValue::Record(_) | RefValue::Module(_)) {
                    return Ok(false);
                }
                if crate::types::record::record_size(r) != fields.len() {
                    return Ok(false);
                }
                for (name, pat) in fields {
                    if !record_has_field(r, name) {
                        return Ok(false);
                    }
                    let fval = pattern_field(r, name, cx)?;
                    if !pat.try_exec(slots, &fval, cx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Field access for pattern matching. Directory records are not
/// destructurable: importing during a trial match could fail for reasons
/// unrelated to the match.
fn pattern_field(rec: &Rc<RefValue>, name: &Symbol, cx: &dyn Context) -> Result<Value> {
    match &**rec {
        RefValue::Record(fields) => match fields.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(cx.error(format!("record does not have a field named {name}"))),
        },
        RefValue::Module(module) => match module.dict.get(name) {
            Some(&slot) => Ok(module_get(module, slot)),
            None => Err(cx.error(format!("record does not have a field named {name}"))),
        },
        _ => Err(cx.error("this record cannot be matched by a pattern".to_string())),
    }
}

/// Compile a pattern phrase, calling `add_binding` once per bound name to
/// allocate its slot. Used for definition patterns and lambda parameters.
pub fn make_pattern(
    phrase: &Rc<Phrase>,
    add_binding: &mut dyn FnMut(Symbol, &Rc<Phrase>) -> Result<usize>,
) -> Result<Rc<Pattern>> {
    match &**phrase {
        Phrase::Ident { symbol, .. } => {
            if symbol.as_str() == "_" {
                return Ok(Rc::new(Pattern::Skip {
                    syntax: Rc::clone(phrase),
                }));
            }
            let slot = add_binding(symbol.clone(), phrase)?;
            Ok(Rc::new(Pattern::Id {
                syntax: Rc::clone(phrase),
                name: symbol.clone(),
                slot,
            }))
        }
        Phrase::Bracket { body, .. } => {
            let mut items = Vec::new();
            if let Some(body) = body {
                for item in body.items() {
                    items.push(make_pattern(&item, add_binding)?);
                }
            }
            Ok(Rc::new(Pattern::List {
                syntax: Rc::clone(phrase),
                items,
            }))
        }
        Phrase::Paren { body, .. } => match body {
            None => Ok(Rc::new(Pattern::List {
                syntax: Rc::clone(phrase),
                items: Vec::new(),
            })),
            Some(body) => match &**body {
                Phrase::Comma { items, .. } => {
                    let mut pats = Vec::new();
                    for item in items {
                        pats.push(make_pattern(item, add_binding)?);
                    }
                    Ok(Rc::new(Pattern::List {
                        syntax: Rc::clone(phrase),
                        items: pats,
                    }))
                }
                _ => make_pattern(body, add_binding),
            },
        },
        Phrase::Brace { body, .. } => {
            let mut fields = IndexMap::new();
            if let Some(body) = body {
                for item in body.items() {
                    match &*item {
                        Phrase::Ident { symbol, .. } => {
                            let pat = make_pattern(&item, add_binding)?;
                            fields.insert(symbol.clone(), pat);
                        }
                        Phrase::Binary { left, op, right }
                            if op.kind == crate::source::TokenKind::Colon =>
                        {
                            let Phrase::Ident { symbol, .. } = &*left.skip_parens() else {
                                return Err(crate::context::AtPhrase::analysing(
                                    Rc::clone(&item),
                                )
                                .error("not a field pattern".to_string()));
                            };
                            let pat = make_pattern(right, add_binding)?;
                            fields.insert(symbol.clone(), pat);
                        }
                        _ => {
                            return Err(crate::context::AtPhrase::analysing(Rc::clone(&item))
                                .error("not a field pattern".to_string()));
                        }
                    }
                }
            }
            Ok(Rc::new(Pattern::Record {
                syntax: Rc::clone(phrase),
                fields,
            }))
        }
        _ => Err(
            crate::context::AtPhrase::analysing(Rc::clone(phrase))
                .error("not a pattern".to_string()),
        ),
    }
}
