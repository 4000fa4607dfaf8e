//! Translation of guard expressions into Python conditions over the machine's context.
//!
//! Guards are Python expressions whose free names are attributes of the shared context:
//! `wasser > 0 and not gesperrt` becomes
//! `self.machine.context.wasser > 0 and not self.machine.context.gesperrt`.
//! Keywords, the builtins in [`names::BUILTINS`], attribute names after `.`
//! and keyword-argument names are left untouched.
//!
//! The expression is checked against a subset of the Python expression grammar
//! (operators, comparisons, boolean connectives, conditional expressions, calls,
//! attribute access, parenthesized tuples, number and string literals),
//! so that a guard that would not compile is rejected instead of emitted.

use crate::GeneratorError;
use crate::names;
use logos::Logos;
use std::ops::Range;

const CONTEXT: &str = "self.machine.context.";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
enum Lexeme {
    #[regex(r"[_\p{L}][_\p{L}\p{N}]*")]
    Name,

    #[regex(r"[0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r"'([^'\\\n]|\\.)*'")]
    Str,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("=")]
    Assign,

    #[token("+")]
    #[token("-")]
    #[token("~")]
    Sign,

    #[token("==")]
    #[token("!=")]
    #[token("<")]
    #[token(">")]
    #[token("<=")]
    #[token(">=")]
    #[token("*")]
    #[token("**")]
    #[token("/")]
    #[token("//")]
    #[token("%")]
    #[token("|")]
    #[token("&")]
    #[token("^")]
    #[token("<<")]
    #[token(">>")]
    Operator,
}

struct GuardParser<'g> {
    guard: &'g str,
    tokens: Vec<(Lexeme, Range<usize>)>,
    pos: usize,
    // Byte offsets of the names read from the context
    free: Vec<usize>,
}

type Parsed = Result<(), &'static str>;

impl<'g> GuardParser<'g> {
    fn new(guard: &'g str) -> Result<Self, &'static str> {
        let tokens = Lexeme::lexer(guard)
            .spanned()
            .map(|(lexeme, span)| lexeme.map(|lexeme| (lexeme, span)))
            .collect::<Result<Vec<_>, ()>>()
            .map_err(|()| "unexpected character")?;
        Ok(Self {
            guard,
            tokens,
            pos: 0,
            free: Vec::new(),
        })
    }

    fn peek_at(&self, offset: usize) -> Option<(Lexeme, &'g str)> {
        self.tokens
            .get(self.pos + offset)
            .map(|(lexeme, span)| (*lexeme, &self.guard[span.clone()]))
    }

    fn peek(&self) -> Option<(Lexeme, &'g str)> {
        self.peek_at(0)
    }

    fn at(&self, expected: Lexeme) -> bool {
        self.peek().is_some_and(|(lexeme, _)| lexeme == expected)
    }

    fn eat(&mut self, expected: Lexeme) -> bool {
        let found = self.at(expected);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek() == Some((Lexeme::Name, keyword));
        if found {
            self.pos += 1;
        }
        found
    }

    fn parse(mut self) -> Result<String, &'static str> {
        if self.tokens.is_empty() {
            return Err("empty expression");
        }
        self.expression()?;
        if self.pos < self.tokens.len() {
            return Err("unexpected token after the expression");
        }
        let capacity = self.guard.len() + CONTEXT.len() * self.free.len();
        let mut condition = String::with_capacity(capacity);
        let mut last = 0;
        for offset in self.free {
            condition.push_str(&self.guard[last..offset]);
            condition.push_str(CONTEXT);
            last = offset;
        }
        condition.push_str(&self.guard[last..]);
        Ok(condition)
    }

    // expression := operation ['if' operation 'else' expression]
    fn expression(&mut self) -> Parsed {
        self.operation()?;
        if self.eat_keyword("if") {
            self.operation()?;
            if !self.eat_keyword("else") {
                return Err("conditional expression without `else`");
            }
            self.expression()?;
        }
        Ok(())
    }

    // operation := unary (binary unary)*
    // `not` only starts the expression or follows `and`/`or`.
    fn operation(&mut self) -> Parsed {
        let mut boolean = true;
        loop {
            self.unary(boolean)?;
            match self.binary_operator() {
                Some(next) => boolean = next,
                None => return Ok(()),
            }
        }
    }

    // Whether the consumed operator is `and`/`or`.
    fn binary_operator(&mut self) -> Option<bool> {
        let (width, boolean) = match self.peek()? {
            (Lexeme::Operator | Lexeme::Sign, text) if text != "~" => (1, false),
            (Lexeme::Name, "and" | "or") => (1, true),
            (Lexeme::Name, "in") => (1, false),
            (Lexeme::Name, "is") if self.peek_at(1) == Some((Lexeme::Name, "not")) => (2, false),
            (Lexeme::Name, "is") => (1, false),
            (Lexeme::Name, "not") if self.peek_at(1) == Some((Lexeme::Name, "in")) => (2, false),
            _ => return None,
        };
        self.pos += width;
        Some(boolean)
    }

    fn unary(&mut self, boolean: bool) -> Parsed {
        if boolean {
            while self.eat_keyword("not") {}
        }
        while self.eat(Lexeme::Sign) {}
        self.primary()
    }

    fn primary(&mut self) -> Parsed {
        let Some((lexeme, span)) = self.tokens.get(self.pos).cloned() else {
            return Err("missing operand");
        };
        self.pos += 1;
        match lexeme {
            Lexeme::Name => {
                let name = &self.guard[span.clone()];
                if names::is_keyword(name) {
                    if !matches!(name, "True" | "False" | "None") {
                        return Err("unsupported keyword");
                    }
                } else if !names::BUILTINS.contains(&name) {
                    self.free.push(span.start);
                }
            }
            Lexeme::Number | Lexeme::Str => {}
            Lexeme::ParenOpen => self.sequence()?,
            _ => return Err("missing operand"),
        }
        loop {
            if self.eat(Lexeme::Dot) {
                match self.peek() {
                    Some((Lexeme::Name, name)) if !names::is_keyword(name) => self.pos += 1,
                    _ => return Err("missing attribute name after `.`"),
                }
            } else if self.eat(Lexeme::ParenOpen) {
                self.arguments()?;
            } else {
                return Ok(());
            }
        }
    }

    // Parenthesized expression or tuple, after `(`.
    fn sequence(&mut self) -> Parsed {
        while !self.eat(Lexeme::ParenClose) {
            self.expression()?;
            if !self.eat(Lexeme::Comma) && !self.at(Lexeme::ParenClose) {
                return Err("unbalanced parentheses");
            }
        }
        Ok(())
    }

    // Call arguments, after `(`; `name=` prefixes are keyword arguments.
    fn arguments(&mut self) -> Parsed {
        while !self.eat(Lexeme::ParenClose) {
            let keyword_argument = self.at(Lexeme::Name)
                && self.peek_at(1).map(|(lexeme, _)| lexeme) == Some(Lexeme::Assign);
            if keyword_argument {
                self.pos += 2;
            }
            self.expression()?;
            if !self.eat(Lexeme::Comma) && !self.at(Lexeme::ParenClose) {
                return Err("unbalanced parentheses");
            }
        }
        Ok(())
    }
}

/// Translates a guard into a parenthesized Python condition reading the machine's context.
pub fn condition(guard: &str) -> Result<String, GeneratorError> {
    GuardParser::new(guard)
        .and_then(GuardParser::parse)
        .map(|condition| format!("({condition})"))
        .map_err(|reason| GeneratorError::InvalidGuard {
            guard: guard.to_owned(),
            reason,
        })
}
