//! Recursive-descent parser.
//!
//! One unified grammar covers expressions, statements and definitions: the
//! parser never commits to "definition vs expression", it just builds
//! phrases, and the analyser asks `Phrase::is_definition` later. Operator
//! precedence, from loosest to tightest:
//!
//! ```text
//! ;   ,   -> = := :   << >>   ||   &&   == != < <= > >=   .. ..<
//! + - ++   * /   unary - + ! ...   ^   postfix (f x, a@i, r.id)   atom
//! ```
//!
//! There is no error recovery: the first syntax error aborts the parse.

use std::rc::Rc;

use crate::error::{Exception, FuncLoc, Result};
use crate::phrase::{Phrase, StringSeg};
use crate::scan::Scanner;
use crate::source::{SrcLoc, Token, TokenKind};
use crate::symbol::symbol_from_token_text;

/// Parse one complete program: a phrase terminated by end of source.
pub fn parse_program(scanner: &mut Scanner) -> Result<Rc<Phrase>> {
    let mut parser = Parser { scanner };
    let tok = parser.scanner.get_token()?;
    if tok.kind == TokenKind::End {
        return Err(parser.error(tok, "empty program"));
    }
    parser.scanner.push_token(tok);
    let phrase = parser.parse_semicolons()?;
    let tok = parser.scanner.get_token()?;
    if tok.kind != TokenKind::End {
        return Err(parser.error(tok, "unexpected token at end of program"));
    }
    Ok(phrase)
}

struct Parser<'a> {
    scanner: &'a mut Scanner,
}

impl Parser<'_> {
    fn error(&self, tok: Token, msg: impl Into<String>) -> Exception {
        Exception::new(
            msg,
            vec![FuncLoc::new(
                None,
                SrcLoc::new(Rc::clone(&self.scanner.source), tok),
            )],
        )
    }

    fn loc(&self, tok: Token) -> SrcLoc {
        SrcLoc::new(Rc::clone(&self.scanner.source), tok)
    }

    fn peek(&mut self) -> Result<Token> {
        let tok = self.scanner.get_token()?;
        self.scanner.push_token(tok);
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        let tok = self.scanner.get_token()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(self.error(tok, format!("expected {what}")))
        }
    }

    /// item (`;` item)*
    fn parse_semicolons(&mut self) -> Result<Rc<Phrase>> {
        let first = self.parse_commas()?;
        let tok = self.scanner.get_token()?;
        if tok.kind != TokenKind::Semicolon {
            self.scanner.push_token(tok);
            return Ok(first);
        }
        let mut items = vec![first];
        loop {
            if self.at_sequence_end()? {
                break;
            }
            items.push(self.parse_commas()?);
            let tok = self.scanner.get_token()?;
            if tok.kind != TokenKind::Semicolon {
                self.scanner.push_token(tok);
                break;
            }
        }
        let loc = items[0]
            .location()
            .ending_at(&items[items.len() - 1].location());
        Ok(Rc::new(Phrase::Semicolon { items, loc }))
    }

    /// ritem (`,` ritem)*
    fn parse_commas(&mut self) -> Result<Rc<Phrase>> {
        let first = self.parse_ritem()?;
        let tok = self.scanner.get_token()?;
        if tok.kind != TokenKind::Comma {
            self.scanner.push_token(tok);
            return Ok(first);
        }
        let mut items = vec![first];
        loop {
            if self.at_sequence_end()? {
                break;
            }
            items.push(self.parse_ritem()?);
            let tok = self.scanner.get_token()?;
            if tok.kind != TokenKind::Comma {
                self.scanner.push_token(tok);
                break;
            }
        }
        let loc = items[0]
            .location()
            .ending_at(&items[items.len() - 1].location());
        Ok(Rc::new(Phrase::Comma { items, loc }))
    }

    /// True if the next token terminates a `,`/`;` sequence, which allows
    /// trailing separators.
    fn at_sequence_end(&mut self) -> Result<bool> {
        Ok(matches!(
            self.peek()?.kind,
            TokenKind::End
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::In
                | TokenKind::Do
                | TokenKind::Else
        ))
    }

    /// The "recursive item" level: control structures and the right-
    /// associative binding operators.
    fn parse_ritem(&mut self) -> Result<Rc<Phrase>> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::If => {
                self.expect(TokenKind::LParen, "'(' after 'if'")?;
                let cond = self.parse_semicolons()?;
                self.expect(TokenKind::RParen, "')' after 'if' condition")?;
                let then_part = self.parse_ritem()?;
                let next = self.scanner.get_token()?;
                let (else_part, end_loc) = if next.kind == TokenKind::Else {
                    let e = self.parse_ritem()?;
                    let loc = e.location();
                    (Some(e), loc)
                } else {
                    self.scanner.push_token(next);
                    (None, then_part.location())
                };
                let loc = self.loc(tok).ending_at(&end_loc);
                Ok(Rc::new(Phrase::IfElse {
                    if_tok: tok,
                    cond,
                    then_part,
                    else_part,
                    loc,
                }))
            }
            TokenKind::Let => {
                let defs = self.parse_semicolons()?;
                self.expect(TokenKind::In, "'in' after 'let' definitions")?;
                let body = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&body.location());
                Ok(Rc::new(Phrase::Let {
                    let_tok: tok,
                    defs,
                    body,
                    loc,
                }))
            }
            TokenKind::Do => {
                let actions = self.parse_semicolons()?;
                self.expect(TokenKind::In, "'in' after 'do' actions")?;
                let body = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&body.location());
                Ok(Rc::new(Phrase::Do {
                    do_tok: tok,
                    actions,
                    body,
                    loc,
                }))
            }
            TokenKind::For => {
                let pattern = self.parse_pipeline()?;
                self.expect(TokenKind::In, "'in' after 'for' pattern")?;
                let sequence = self.parse_pipeline()?;
                self.expect(TokenKind::Do, "'do' after 'for' sequence")?;
                let body = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&body.location());
                Ok(Rc::new(Phrase::ForLoop {
                    for_tok: tok,
                    pattern,
                    sequence,
                    body,
                    loc,
                }))
            }
            TokenKind::While => {
                let cond = self.parse_pipeline()?;
                self.expect(TokenKind::Do, "'do' after 'while' condition")?;
                let body = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&body.location());
                Ok(Rc::new(Phrase::WhileLoop {
                    while_tok: tok,
                    cond,
                    body,
                    loc,
                }))
            }
            TokenKind::Local => {
                let def = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&def.location());
                Ok(Rc::new(Phrase::Local {
                    local_tok: tok,
                    def,
                    loc,
                }))
            }
            TokenKind::Include => {
                let arg = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&arg.location());
                Ok(Rc::new(Phrase::Include {
                    include_tok: tok,
                    arg,
                    loc,
                }))
            }
            TokenKind::Parametric => {
                let defs = self.parse_semicolons()?;
                self.expect(TokenKind::In, "'in' after 'parametric' parameters")?;
                let body = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&body.location());
                Ok(Rc::new(Phrase::Parametric {
                    tok,
                    defs,
                    body,
                    loc,
                }))
            }
            TokenKind::Test => {
                let arg = self.parse_ritem()?;
                let loc = self.loc(tok).ending_at(&arg.location());
                Ok(Rc::new(Phrase::Test { tok, arg, loc }))
            }
            TokenKind::Var => Err(self.error(tok, "'var' definitions are no longer supported")),
            _ => {
                self.scanner.push_token(tok);
                let left = self.parse_pipeline()?;
                let tok = self.scanner.get_token()?;
                match tok.kind {
                    TokenKind::RightArrow => {
                        let body = self.parse_ritem()?;
                        Ok(Rc::new(Phrase::Lambda {
                            pattern: left,
                            arrow: tok,
                            body,
                        }))
                    }
                    TokenKind::Equate | TokenKind::Assign | TokenKind::Colon => {
                        let right = self.parse_ritem()?;
                        Ok(Rc::new(Phrase::Binary {
                            left,
                            op: tok,
                            right,
                        }))
                    }
                    _ => {
                        self.scanner.push_token(tok);
                        Ok(left)
                    }
                }
            }
        }
    }

    /// `x >> f` and `f << x` are application, desugared while parsing.
    fn parse_pipeline(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_disjunction()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::RightCall => {
                    let func = self.parse_disjunction()?;
                    left = Rc::new(Phrase::Call { func, arg: left });
                }
                TokenKind::LeftCall => {
                    let arg = self.parse_disjunction()?;
                    left = Rc::new(Phrase::Call { func: left, arg });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    fn parse_disjunction(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_conjunction()?;
        loop {
            let tok = self.scanner.get_token()?;
            if tok.kind == TokenKind::Or {
                let right = self.parse_conjunction()?;
                left = Rc::new(Phrase::Binary {
                    left,
                    op: tok,
                    right,
                });
            } else {
                self.scanner.push_token(tok);
                return Ok(left);
            }
        }
    }

    fn parse_conjunction(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_relation()?;
        loop {
            let tok = self.scanner.get_token()?;
            if tok.kind == TokenKind::And {
                let right = self.parse_relation()?;
                left = Rc::new(Phrase::Binary {
                    left,
                    op: tok,
                    right,
                });
            } else {
                self.scanner.push_token(tok);
                return Ok(left);
            }
        }
    }

    fn parse_relation(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_range()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessOrEqual
                | TokenKind::Greater
                | TokenKind::GreaterOrEqual => {
                    let right = self.parse_range()?;
                    left = Rc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right,
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    fn parse_range(&mut self) -> Result<Rc<Phrase>> {
        let first = self.parse_sum()?;
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Range | TokenKind::OpenRange => {
                let last = self.parse_sum()?;
                let by = self.scanner.get_token()?;
                let step = if by.kind == TokenKind::By {
                    Some(self.parse_sum()?)
                } else {
                    self.scanner.push_token(by);
                    None
                };
                Ok(Rc::new(Phrase::Range {
                    first,
                    op: tok,
                    last,
                    step,
                }))
            }
            _ => {
                self.scanner.push_token(tok);
                Ok(first)
            }
        }
    }

    fn parse_sum(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_product()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Plus | TokenKind::Minus | TokenKind::PlusPlus => {
                    let right = self.parse_product()?;
                    left = Rc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right,
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    fn parse_product(&mut self) -> Result<Rc<Phrase>> {
        let mut left = self.parse_unary()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Times | TokenKind::Over => {
                    let right = self.parse_unary()?;
                    left = Rc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right,
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Rc<Phrase>> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not | TokenKind::Ellipsis => {
                let arg = self.parse_unary()?;
                let loc = arg.location().starting_at(tok);
                Ok(Rc::new(Phrase::Unary { op: tok, loc, arg }))
            }
            _ => {
                self.scanner.push_token(tok);
                self.parse_power()
            }
        }
    }

    /// `^` is right associative and binds tighter than unary minus on its
    /// left but looser on its right: `-2^-3` is `-(2^(-3))`.
    fn parse_power(&mut self) -> Result<Rc<Phrase>> {
        let base = self.parse_postfix()?;
        let tok = self.scanner.get_token()?;
        if tok.kind == TokenKind::Power {
            let exponent = self.parse_unary()?;
            Ok(Rc::new(Phrase::Binary {
                left: base,
                op: tok,
                right: exponent,
            }))
        } else {
            self.scanner.push_token(tok);
            Ok(base)
        }
    }

    fn parse_postfix(&mut self) -> Result<Rc<Phrase>> {
        let mut postfix = self.parse_primary()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Dot => {
                    let member = self.parse_primary()?;
                    postfix = Rc::new(Phrase::Dot {
                        base: postfix,
                        dot: tok,
                        member,
                    });
                }
                TokenKind::At => {
                    let index = self.parse_primary()?;
                    postfix = Rc::new(Phrase::IndexApp {
                        base: postfix,
                        at: tok,
                        index,
                    });
                }
                _ if starts_primary(tok.kind) => {
                    self.scanner.push_token(tok);
                    let arg = self.parse_primary()?;
                    postfix = Rc::new(Phrase::Call { func: postfix, arg });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(postfix);
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Rc<Phrase>> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Num => Ok(Rc::new(Phrase::Numeral { loc: self.loc(tok) })),
            TokenKind::HexNum => Ok(Rc::new(Phrase::HexNumeral { loc: self.loc(tok) })),
            TokenKind::Ident => {
                let loc = self.loc(tok);
                let symbol = symbol_from_token_text(loc.text());
                Ok(Rc::new(Phrase::Ident { loc, symbol }))
            }
            TokenKind::Symbol => {
                let loc = self.loc(tok);
                let symbol = symbol_from_token_text(&loc.text()[1..]);
                Ok(Rc::new(Phrase::SymbolLit { loc, symbol }))
            }
            TokenKind::Quote => self.parse_string(tok),
            TokenKind::LParen => {
                self.parse_delimited(tok, TokenKind::RParen, "')'", |lp, body, rp, loc| {
                    Phrase::Paren {
                        lparen: lp,
                        body,
                        rparen: rp,
                        loc,
                    }
                })
            }
            TokenKind::LBracket => {
                self.parse_delimited(tok, TokenKind::RBracket, "']'", |lb, body, rb, loc| {
                    Phrase::Bracket {
                        lbracket: lb,
                        body,
                        rbracket: rb,
                        loc,
                    }
                })
            }
            TokenKind::LBrace => {
                self.parse_delimited(tok, TokenKind::RBrace, "'}'", |lb, body, rb, loc| {
                    Phrase::Brace {
                        lbrace: lb,
                        body,
                        rbrace: rb,
                        loc,
                    }
                })
            }
            _ => Err(self.error(tok, "unexpected token: expected an expression")),
        }
    }

    fn parse_delimited(
        &mut self,
        open: Token,
        close: TokenKind,
        close_name: &str,
        build: impl FnOnce(Token, Option<Rc<Phrase>>, Token, SrcLoc) -> Phrase,
    ) -> Result<Rc<Phrase>> {
        let tok = self.scanner.get_token()?;
        if tok.kind == close {
            let loc = self.loc(open).ending_at(&self.loc(tok));
            return Ok(Rc::new(build(open, None, tok, loc)));
        }
        self.scanner.push_token(tok);
        let body = self.parse_semicolons()?;
        let tok = self.scanner.get_token()?;
        if tok.kind != close {
            return Err(self.error(tok, format!("expected {close_name}")));
        }
        let loc = self.loc(open).ending_at(&self.loc(tok));
        Ok(Rc::new(build(open, Some(body), tok, loc)))
    }

    /// Assemble a string literal, coroutining with the scanner's string mode.
    fn parse_string(&mut self, quote: Token) -> Result<Rc<Phrase>> {
        let mut segments = Vec::new();
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Quote => {
                    let loc = self.loc(quote).ending_at(&self.loc(tok));
                    return Ok(Rc::new(Phrase::StringLit { loc, segments }));
                }
                TokenKind::StringSegment => segments.push(StringSeg::Text(tok)),
                TokenKind::StringNewline => segments.push(StringSeg::Newline(tok)),
                TokenKind::CharEscape => segments.push(StringSeg::CharEscape(tok)),
                TokenKind::DollarIdent => segments.push(StringSeg::Ident(tok)),
                TokenKind::DollarBrace => {
                    let sub = self.parse_interpolation(TokenKind::RBrace, "'}'")?;
                    segments.push(StringSeg::Brace(sub));
                }
                TokenKind::DollarParen => {
                    let sub = self.parse_interpolation(TokenKind::RParen, "')'")?;
                    segments.push(StringSeg::Paren(sub));
                }
                TokenKind::DollarBracket => {
                    let sub = self.parse_interpolation(TokenKind::RBracket, "']'")?;
                    segments.push(StringSeg::Bracket(sub));
                }
                _ => return Err(self.error(tok, "unexpected token inside string literal")),
            }
        }
    }

    fn parse_interpolation(&mut self, close: TokenKind, close_name: &str) -> Result<Rc<Phrase>> {
        let saved = self.scanner.suspend_string_mode();
        let result = (|| {
            let sub = self.parse_semicolons()?;
            let tok = self.scanner.get_token()?;
            if tok.kind != close {
                return Err(self.error(tok, format!("expected {close_name}")));
            }
            Ok(sub)
        })();
        self.scanner.resume_string_mode(saved);
        result
    }
}

fn starts_primary(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Num
            | TokenKind::HexNum
            | TokenKind::Ident
            | TokenKind::Symbol
            | TokenKind::Quote
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn parse(text: &str) -> Rc<Phrase> {
        let mut scanner = Scanner::new(Source::new("test", text));
        parse_program(&mut scanner).expect("parse")
    }

    #[test]
    fn juxtaposition_is_left_associative() {
        let p = parse("f x y");
        let Phrase::Call { func, .. } = &*p else {
            panic!("expected call")
        };
        assert!(matches!(&**func, Phrase::Call { .. }));
    }

    #[test]
    fn power_is_right_associative_with_unary_exponent() {
        let p = parse("2^-3");
        let Phrase::Binary { op, right, .. } = &*p else {
            panic!("expected binary")
        };
        assert_eq!(op.kind, TokenKind::Power);
        assert!(matches!(&**right, Phrase::Unary { .. }));
    }

    #[test]
    fn pipeline_desugars_to_application() {
        let p = parse("x >> f");
        let Phrase::Call { func, arg } = &*p else {
            panic!("expected call")
        };
        assert!(matches!(&**func, Phrase::Ident { symbol, .. } if symbol.as_str() == "f"));
        assert!(matches!(&**arg, Phrase::Ident { symbol, .. } if symbol.as_str() == "x"));
    }

    #[test]
    fn definitions_are_detected_not_committed() {
        assert!(parse("a = 1").is_definition());
        assert!(parse("a = 1; f 2").is_definition());
        assert!(!parse("a == 1").is_definition());
    }

    #[test]
    fn parse_errors_report_the_failing_token() {
        let mut scanner = Scanner::new(Source::new("test", "1 + "));
        let err = parse_program(&mut scanner).expect_err("syntax error");
        assert!(err.message().contains("expected an expression"));
    }

    #[test]
    fn string_interpolation_holds_subphrases() {
        let p = parse("\"value: ${1+2}\"");
        let Phrase::StringLit { segments, .. } = &*p else {
            panic!("expected string")
        };
        assert_eq!(segments.len(), 2);
        assert!(matches!(segments[1], StringSeg::Brace(_)));
    }
}
