//! The parse tree.
//!
//! A phrase is loss-less over the source text: every node can reproduce its
//! exact source range, so errors at any later phase can re-quote the original
//! code. Phrases are immutable and shared; Meaning nodes retain the phrase
//! they were analysed from.

use std::rc::Rc;

use crate::source::{SrcLoc, Token, TokenKind};
use crate::symbol::Symbol;

/// One segment of a string literal.
#[derive(Debug)]
pub enum StringSeg {
    /// A run of unescaped characters.
    Text(Token),
    /// Newline plus indentation; contributes a single `\n`.
    Newline(Token),
    /// `$.` contributes `$`; `$=` contributes `"`.
    CharEscape(Token),
    /// `$identifier`: interpolate the named variable as a string.
    Ident(Token),
    /// `${expr}`: interpolate the value as a string.
    Brace(Rc<Phrase>),
    /// `$(expr)`: interpolate the value in expression notation.
    Paren(Rc<Phrase>),
    /// `$[c1,c2,...]`: characters given by numeric code.
    Bracket(Rc<Phrase>),
}

/// A node of the parse tree. The set of variants is closed.
#[derive(Debug)]
pub enum Phrase {
    Ident {
        loc: SrcLoc,
        symbol: Symbol,
    },
    Numeral {
        loc: SrcLoc,
    },
    HexNumeral {
        loc: SrcLoc,
    },
    SymbolLit {
        loc: SrcLoc,
        symbol: Symbol,
    },
    StringLit {
        loc: SrcLoc,
        segments: Vec<StringSeg>,
    },
    Unary {
        op: Token,
        loc: SrcLoc,
        arg: Rc<Phrase>,
    },
    Binary {
        left: Rc<Phrase>,
        op: Token,
        right: Rc<Phrase>,
    },
    /// `first .. last by step` or `first ..< last by step`
    Range {
        first: Rc<Phrase>,
        op: Token,
        last: Rc<Phrase>,
        step: Option<Rc<Phrase>>,
    },
    /// `pattern -> body`
    Lambda {
        pattern: Rc<Phrase>,
        arrow: Token,
        body: Rc<Phrase>,
    },
    /// function application by juxtaposition: `f x`
    Call {
        func: Rc<Phrase>,
        arg: Rc<Phrase>,
    },
    /// index application: `a@i`
    IndexApp {
        base: Rc<Phrase>,
        at: Token,
        index: Rc<Phrase>,
    },
    /// `record.name`
    Dot {
        base: Rc<Phrase>,
        dot: Token,
        member: Rc<Phrase>,
    },
    Paren {
        lparen: Token,
        body: Option<Rc<Phrase>>,
        rparen: Token,
        loc: SrcLoc,
    },
    Bracket {
        lbracket: Token,
        body: Option<Rc<Phrase>>,
        rbracket: Token,
        loc: SrcLoc,
    },
    Brace {
        lbrace: Token,
        body: Option<Rc<Phrase>>,
        rbrace: Token,
        loc: SrcLoc,
    },
    /// `a, b, c`
    Comma {
        items: Vec<Rc<Phrase>>,
        loc: SrcLoc,
    },
    /// `a; b; c`
    Semicolon {
        items: Vec<Rc<Phrase>>,
        loc: SrcLoc,
    },
    /// `if (cond) then_part` with optional `else else_part`
    IfElse {
        if_tok: Token,
        cond: Rc<Phrase>,
        then_part: Rc<Phrase>,
        else_part: Option<Rc<Phrase>>,
        loc: SrcLoc,
    },
    /// `let definitions in body`
    Let {
        let_tok: Token,
        defs: Rc<Phrase>,
        body: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `do actions in body`
    Do {
        do_tok: Token,
        actions: Rc<Phrase>,
        body: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `for pattern in sequence do body`
    ForLoop {
        for_tok: Token,
        pattern: Rc<Phrase>,
        sequence: Rc<Phrase>,
        body: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `while cond do body`
    WhileLoop {
        while_tok: Token,
        cond: Rc<Phrase>,
        body: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `local definition`
    Local {
        local_tok: Token,
        def: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `include expr`
    Include {
        include_tok: Token,
        arg: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `parametric definitions in body`
    Parametric {
        tok: Token,
        defs: Rc<Phrase>,
        body: Rc<Phrase>,
        loc: SrcLoc,
    },
    /// `test statement`
    Test {
        tok: Token,
        arg: Rc<Phrase>,
        loc: SrcLoc,
    },
}

impl Phrase {
    pub fn location(&self) -> SrcLoc {
        match self {
            Self::Ident { loc, .. }
            | Self::Numeral { loc }
            | Self::HexNumeral { loc }
            | Self::SymbolLit { loc, .. }
            | Self::StringLit { loc, .. }
            | Self::Paren { loc, .. }
            | Self::Bracket { loc, .. }
            | Self::Brace { loc, .. }
            | Self::Comma { loc, .. }
            | Self::Semicolon { loc, .. }
            | Self::IfElse { loc, .. }
            | Self::Let { loc, .. }
            | Self::Do { loc, .. }
            | Self::ForLoop { loc, .. }
            | Self::WhileLoop { loc, .. }
            | Self::Local { loc, .. }
            | Self::Include { loc, .. }
            | Self::Parametric { loc, .. }
            | Self::Test { loc, .. } => loc.clone(),
            Self::Unary { loc, .. } => loc.clone(),
            Self::Binary { left, right, .. } => left.location().ending_at(&right.location()),
            Self::Range { first, last, step, .. } => {
                let end = step.as_ref().map_or_else(|| last.location(), |s| s.location());
                first.location().ending_at(&end)
            }
            Self::Lambda { pattern, body, .. } => pattern.location().ending_at(&body.location()),
            Self::Call { func, arg } => func.location().ending_at(&arg.location()),
            Self::IndexApp { base, index, .. } => base.location().ending_at(&index.location()),
            Self::Dot { base, member, .. } => base.location().ending_at(&member.location()),
        }
    }

    /// Strip redundant parens, exposing the phrase a pair of parens wraps.
    /// Used when classifying definitions and patterns.
    pub fn skip_parens(self: &Rc<Self>) -> Rc<Self> {
        match &**self {
            Self::Paren {
                body: Some(body), ..
            } => body.skip_parens(),
            _ => Rc::clone(self),
        }
    }

    /// Quick syntactic test: is this phrase a definition (or a compound
    /// phrase containing one)? The parser does not commit to definition vs
    /// expression; the analyser asks this question when it matters.
    pub fn is_definition(&self) -> bool {
        match self {
            Self::Binary { op, .. } => op.kind == TokenKind::Equate,
            Self::Local { .. } | Self::Include { .. } | Self::Test { .. } => true,
            Self::Semicolon { items, .. } | Self::Comma { items, .. } => {
                items.iter().any(|item| item.is_definition())
            }
            Self::Paren {
                body: Some(body), ..
            } => body.is_definition(),
            _ => false,
        }
    }

    /// The items of a `,`- or `;`-separated sequence, or the phrase itself.
    pub fn items(self: &Rc<Self>) -> Vec<Rc<Self>> {
        match &**self {
            Self::Comma { items, .. } | Self::Semicolon { items, .. } => items.clone(),
            _ => vec![Rc::clone(self)],
        }
    }
}
