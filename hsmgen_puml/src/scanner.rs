//! Structural scanner: splits the input into numbered lines of typed tokens.
//!
//! Blank and comment lines are kept (without tokens) as position markers,
//! so that line numbers stay valid while blocks are recursively re-sliced.

use crate::parser::ParserError;
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
enum Lexeme {
    #[token("state")]
    State,

    #[token("-->")]
    #[token("->")]
    #[regex(r"-[a-zA-Z]+->")]
    Arrow,

    #[token("--")]
    #[token("||")]
    RegionSeparator,

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token(":")]
    Colon,

    #[regex(r"\[[^\]\n]*\]", |lex| {
        let slice = lex.slice();
        slice[1..slice.len() - 1].trim().to_owned()
    })]
    Bracket(String),

    #[regex(r"<<[^>\n]*>>")]
    Stereotype,

    #[regex(r"[^ \t\r\f\n:\[\]{}<>|-]+", |lex| lex.slice().to_owned())]
    Word(String),
}

/// A token of the statechart description language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// The `state` keyword.
    State,
    /// A transition arrow: `-->`, `->` or a directional arrow such as `-left->`.
    Arrow,
    /// A concurrent region separator, `--` or `||`.
    RegionSeparator,
    /// `{`
    BraceOpen,
    /// `}`
    BraceClose,
    /// `:`
    Colon,
    /// The trimmed content of a bracket group, e.g. `*` for `[*]` or a guard expression.
    Bracket(String),
    /// A stereotype such as `<<choice>>`.
    Stereotype,
    /// Any other run of characters: names, events, directives.
    Word(String),
    /// Characters that do not form any token.
    Junk(String),
}

impl From<Lexeme> for Token {
    fn from(value: Lexeme) -> Self {
        match value {
            Lexeme::State => Token::State,
            Lexeme::Arrow => Token::Arrow,
            Lexeme::RegionSeparator => Token::RegionSeparator,
            Lexeme::BraceOpen => Token::BraceOpen,
            Lexeme::BraceClose => Token::BraceClose,
            Lexeme::Colon => Token::Colon,
            Lexeme::Bracket(content) => Token::Bracket(content),
            Lexeme::Stereotype => Token::Stereotype,
            Lexeme::Word(word) => Token::Word(word),
        }
    }
}

/// A line of input with its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number.
    pub number: usize,
    /// Raw text of the line.
    pub text: String,
    /// Tokens, with their byte span in `text`.
    pub tokens: Vec<(Token, Range<usize>)>,
}

impl Line {
    fn tokenize(number: usize, text: &str) -> Self {
        let tokens = Lexeme::lexer(text)
            .spanned()
            .map(|(lexeme, span)| match lexeme {
                Ok(lexeme) => (Token::from(lexeme), span),
                Err(()) => (Token::Junk(text[span.clone()].to_owned()), span),
            })
            .collect();
        Line {
            number,
            text: text.to_owned(),
            tokens,
        }
    }

    fn marker(number: usize, text: &str) -> Self {
        Line {
            number,
            text: text.to_owned(),
            tokens: Vec::new(),
        }
    }

    /// Whether the line carries no tokens (blank or comment line).
    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterates over the tokens of the line.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().map(|(token, _)| token)
    }

    /// Net change in brace nesting depth caused by the line.
    pub fn depth_change(&self) -> isize {
        self.tokens().fold(0, |depth, token| match token {
            Token::BraceOpen => depth + 1,
            Token::BraceClose => depth - 1,
            _ => depth,
        })
    }

    /// Whether the line contains an opening brace.
    pub fn opens_block(&self) -> bool {
        self.tokens().any(|token| *token == Token::BraceOpen)
    }

    /// Whether the line consists of a lone `{`.
    pub fn is_lone_open(&self) -> bool {
        matches!(self.tokens.as_slice(), [(Token::BraceOpen, _)])
    }

    /// Raw text following the token at position `idx`, trimmed.
    pub fn text_after(&self, idx: usize) -> &str {
        self.tokens
            .get(idx)
            .map_or("", |(_, span)| self.text[span.end..].trim())
    }
}

/// Splits the input into lines of tokens, preserving line order and count.
///
/// Comment lines (`' ...`) and block comments (`/' ... '/`) produce lines without tokens.
/// A leading byte order mark is dropped.
pub fn scan(source: &str) -> Vec<Line> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut lines = Vec::new();
    let mut in_comment = false;
    for (idx, text) in source.lines().enumerate() {
        let number = idx + 1;
        let trimmed = text.trim_start();
        if in_comment {
            in_comment = !trimmed.contains("'/");
            lines.push(Line::marker(number, text));
        } else if let Some(rest) = trimmed.strip_prefix("/'") {
            in_comment = !rest.contains("'/");
            lines.push(Line::marker(number, text));
        } else if trimmed.starts_with('\'') {
            lines.push(Line::marker(number, text));
        } else {
            lines.push(Line::tokenize(number, text));
        }
    }
    lines
}

/// Finds the line closing the block opened at `open`,
/// by depth-balanced scan of the following lines.
///
/// Fails if the input ends before the block is closed,
/// naming the state (or directive) that opened it.
pub(crate) fn block_end(lines: &[Line], open: usize, owner: &str) -> Result<usize, ParserError> {
    let mut depth = 0;
    for (idx, line) in lines.iter().enumerate().skip(open) {
        depth += line.depth_change();
        if depth <= 0 {
            return Ok(idx);
        }
    }
    Err(ParserError::UnclosedBlock {
        state: owner.to_owned(),
        line: lines[open].number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        Line::tokenize(1, text).tokens().cloned().collect()
    }

    fn word(text: &str) -> Token {
        Token::Word(text.to_string())
    }

    #[test]
    fn transition() {
        assert_eq!(
            tokens("Zubereitung --> Ausgabe : fertig [wasser > 0]"),
            vec![
                word("Zubereitung"),
                Token::Arrow,
                word("Ausgabe"),
                Token::Colon,
                word("fertig"),
                Token::Bracket("wasser > 0".to_string()),
            ]
        );
    }

    #[test]
    fn pseudostates() {
        assert_eq!(
            tokens("[*] --> Aus"),
            vec![Token::Bracket("*".to_string()), Token::Arrow, word("Aus")]
        );
        assert_eq!(
            tokens("Pause --> An[H] : fortfahren"),
            vec![
                word("Pause"),
                Token::Arrow,
                word("An"),
                Token::Bracket("H".to_string()),
                Token::Colon,
                word("fortfahren"),
            ]
        );
    }

    #[test]
    fn without_spaces() {
        assert_eq!(
            tokens("Auf->Zu:schließen"),
            vec![
                word("Auf"),
                Token::Arrow,
                word("Zu"),
                Token::Colon,
                word("schließen"),
            ]
        );
        assert_eq!(
            tokens("A -left-> B"),
            vec![word("A"), Token::Arrow, word("B")]
        );
    }

    #[test]
    fn state_declaration() {
        assert_eq!(
            tokens("state An {"),
            vec![Token::State, word("An"), Token::BraceOpen]
        );
        assert_eq!(tokens("stateful"), vec![word("stateful")]);
        assert_eq!(
            tokens("state Choice <<choice>>"),
            vec![Token::State, word("Choice"), Token::Stereotype]
        );
    }

    #[test]
    fn junk() {
        assert_eq!(
            tokens("note > here"),
            vec![word("note"), Token::Junk(">".to_string()), word("here")]
        );
    }

    #[test]
    fn comments_keep_positions() {
        let lines = scan("' comment\n[*] --> A\n/' block\nstill comment '/\n\nA --> B");
        assert_eq!(lines.len(), 6);
        assert!(lines[0].is_blank());
        assert!(!lines[1].is_blank());
        assert!(lines[2].is_blank());
        assert!(lines[3].is_blank());
        assert!(lines[4].is_blank());
        assert_eq!(lines[5].number, 6);
        assert_eq!(lines[5].tokens().count(), 3);
    }

    #[test]
    fn byte_order_mark() {
        let lines = scan("\u{feff}[*] --> A\nA --> B");
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].tokens().cloned().collect::<Vec<_>>(),
            vec![Token::Bracket("*".to_string()), Token::Arrow, word("A")]
        );
        assert_eq!(lines[0].text, "[*] --> A");
    }

    #[test]
    fn text_after() {
        let line = Line::tokenize(1, "An: Entry: Wasser reinigen");
        assert_eq!(line.text_after(3), "Wasser reinigen");
        assert_eq!(line.text_after(10), "");
    }

    #[test]
    fn balanced_block() {
        let lines = scan("state A {\n  state B {\n  }\n}\nA --> C");
        assert_eq!(block_end(&lines, 0, "A"), Ok(3));
        assert_eq!(block_end(&lines, 1, "B"), Ok(2));
        let lines = scan("state A { }");
        assert_eq!(block_end(&lines, 0, "A"), Ok(0));
    }

    #[test]
    fn unclosed_block() {
        let lines = scan("[*] --> A\nstate A {\n  state B {\n  }\n");
        assert_eq!(
            block_end(&lines, 1, "A"),
            Err(ParserError::UnclosedBlock {
                state: "A".to_string(),
                line: 2
            })
        );
    }
}
