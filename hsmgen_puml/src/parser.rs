//! Line grammar of the statechart description language.
//!
//! Each scanned line is classified into at most one [`Stmt`],
//! which the AST builder then interprets within the scope the line belongs to.

use crate::scanner::{Line, Token};
use hsmgen_core::StatechartError;
use log::trace;
use std::fmt;
use thiserror::Error;

/// The error type for parsing a statechart description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserError {
    /// The input ended while the block opened by a state was still open.
    #[error("block of `{state}` opened at line {line} is never closed")]
    UnclosedBlock {
        /// The state (or directive) opening the block.
        state: String,
        /// Line opening the block.
        line: usize,
    },
    /// A closing brace without a matching opening brace.
    #[error("line {0}: unexpected `}}`")]
    UnexpectedClose(usize),
    /// A `state` keyword not followed by a name.
    #[error("line {0}: missing state name after `state`")]
    MissingStateName(usize),
    /// A line with an arrow that is not a well-formed transition.
    #[error("line {line}: malformed transition `{text}`")]
    MalformedTransition {
        /// Line of the transition.
        line: usize,
        /// The offending text.
        text: String,
    },
    /// An `Entry:`/`Exit:` binding without an action name.
    #[error("line {0}: missing action name")]
    MissingActionName(usize),
    /// A construct of the diagram language that is not supported.
    #[error("line {line}: {feature} are not supported")]
    Unsupported {
        /// Line of the construct.
        line: usize,
        /// Description of the construct.
        feature: &'static str,
    },
    /// A bare `[H]` target outside of any composite state.
    #[error("line {0}: history pseudostate `[H]` used outside of a composite state")]
    HistoryAtRoot(usize),
    /// The declaration is rejected by the statechart model.
    #[error("line {line}: invalid declaration")]
    Statechart {
        /// Line of the declaration.
        line: usize,
        /// The error from the statechart builder.
        #[source]
        err: StatechartError,
    },
}

/// Non-fatal anomalies found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A state's entry action is bound more than once; the last binding is kept.
    DuplicateEntry {
        /// Line of the overriding binding.
        line: usize,
        /// The state.
        state: String,
        /// The overridden action.
        previous: String,
    },
    /// A state's exit action is bound more than once; the last binding is kept.
    DuplicateExit {
        /// Line of the overriding binding.
        line: usize,
        /// The state.
        state: String,
        /// The overridden action.
        previous: String,
    },
    /// A transition with an empty guard `[]`, treated as unguarded.
    EmptyGuard(usize),
    /// A label on a `[*] -->` transition, which has no effect.
    InitialLabelIgnored(usize),
    /// A line that looks like a transition or an action binding but was not recognised.
    Ignored {
        /// Line number.
        line: usize,
        /// The ignored text.
        text: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DuplicateEntry {
                line,
                state,
                previous,
            } => write!(
                f,
                "line {line}: entry action of `{state}` redefined (was `{previous}`)"
            ),
            Warning::DuplicateExit {
                line,
                state,
                previous,
            } => write!(
                f,
                "line {line}: exit action of `{state}` redefined (was `{previous}`)"
            ),
            Warning::EmptyGuard(line) => write!(f, "line {line}: empty guard ignored"),
            Warning::InitialLabelIgnored(line) => {
                write!(f, "line {line}: label of initial transition ignored")
            }
            Warning::Ignored { line, text } => write!(f, "line {line}: ignored `{text}`"),
        }
    }
}

/// One end of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The initial pseudostate `[*]`.
    Initial,
    /// The bare history pseudostate `[H]` of the enclosing composite state.
    History,
    /// A named state, possibly entered through its history (`Name[H]`).
    State {
        /// Name of the state.
        name: String,
        /// Whether the history marker is present.
        history: bool,
    },
}

/// Whether an action runs on entry or on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// `Entry:`
    Entry,
    /// `Exit:`
    Exit,
}

/// The statement carried by a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Blank, comment, or unrecognised line.
    Nothing,
    /// `state Name`, possibly opening its body with `{`.
    State {
        /// Name of the state.
        name: String,
        /// Whether the line opens a body.
        opens: bool,
    },
    /// `Source --> Target : event [guard]`
    Transition {
        /// Source endpoint.
        source: Endpoint,
        /// Target endpoint.
        target: Endpoint,
        /// Event label.
        event: Option<String>,
        /// Guard expression.
        guard: Option<String>,
    },
    /// `State: Entry: action` or `State: Exit: action`.
    Action {
        /// Name of the state.
        state: String,
        /// Entry or exit.
        kind: ActionKind,
        /// Name of the action.
        action: String,
    },
    /// A lone `{`.
    Open,
    /// A line opening a block which is not a state body (e.g. `skinparam state {`).
    Block(String),
    /// A closing `}`.
    Close,
}

fn action_marker(token: &Token) -> Option<ActionKind> {
    match token {
        Token::Word(word) if word.eq_ignore_ascii_case("entry") => Some(ActionKind::Entry),
        Token::Word(word) if word.eq_ignore_ascii_case("exit") => Some(ActionKind::Exit),
        _ => None,
    }
}

/// Classifies a scanned line, pushing non-fatal anomalies into `warnings`.
pub fn parse_line(line: &Line, warnings: &mut Vec<Warning>) -> Result<Stmt, ParserError> {
    let tokens: Vec<&Token> = line.tokens().collect();
    let stmt = match tokens.as_slice() {
        [] => Stmt::Nothing,
        [Token::BraceOpen] => Stmt::Open,
        [Token::BraceClose, ..] => Stmt::Close,
        [Token::RegionSeparator, ..] => {
            return Err(ParserError::Unsupported {
                line: line.number,
                feature: "concurrent regions",
            });
        }
        [Token::State, rest @ ..] => parse_state(line, rest)?,
        _ if tokens.contains(&&Token::Arrow) => parse_transition(line, warnings)?,
        [Token::Word(state), Token::Colon, marker, Token::Colon, ..] => {
            if let Some(kind) = action_marker(marker) {
                parse_action(line, state, kind)?
            } else if line.opens_block() {
                Stmt::Block(state.to_owned())
            } else {
                Stmt::Nothing
            }
        }
        [Token::Word(word), ..] if line.opens_block() => Stmt::Block(word.to_owned()),
        _ if line.opens_block() => Stmt::Block(line.text.trim().to_owned()),
        _ => {
            if tokens.iter().any(|token| action_marker(token).is_some())
                && tokens.contains(&&Token::Colon)
            {
                warnings.push(Warning::Ignored {
                    line: line.number,
                    text: line.text.trim().to_owned(),
                });
            }
            Stmt::Nothing
        }
    };
    trace!(target: "parser", "line {}: {stmt:?}", line.number);
    Ok(stmt)
}

fn parse_state(line: &Line, rest: &[&Token]) -> Result<Stmt, ParserError> {
    match rest {
        [Token::Word(name), ..] => Ok(Stmt::State {
            name: name.to_owned(),
            opens: line.opens_block(),
        }),
        _ => Err(ParserError::MissingStateName(line.number)),
    }
}

fn malformed(line: &Line) -> ParserError {
    ParserError::MalformedTransition {
        line: line.number,
        text: line.text.trim().to_owned(),
    }
}

fn parse_source(line: &Line, tokens: &[&Token]) -> Result<Endpoint, ParserError> {
    match tokens {
        [Token::Bracket(content)] if content == "*" => Ok(Endpoint::Initial),
        [Token::Word(name)] => Ok(Endpoint::State {
            name: name.to_owned(),
            history: false,
        }),
        _ => Err(malformed(line)),
    }
}

fn pseudostate(line: &Line, content: &str) -> Result<bool, ParserError> {
    match content {
        "H" => Ok(true),
        "H*" => Err(ParserError::Unsupported {
            line: line.number,
            feature: "deep history pseudostates",
        }),
        "*" => Err(ParserError::Unsupported {
            line: line.number,
            feature: "final pseudostates",
        }),
        _ => Err(malformed(line)),
    }
}

fn parse_target(line: &Line, tokens: &[&Token]) -> Result<Endpoint, ParserError> {
    match tokens {
        [Token::Bracket(content)] => {
            pseudostate(line, content)?;
            Ok(Endpoint::History)
        }
        [Token::Word(name)] => Ok(Endpoint::State {
            name: name.to_owned(),
            history: false,
        }),
        [Token::Word(name), Token::Bracket(content)] => Ok(Endpoint::State {
            name: name.to_owned(),
            history: pseudostate(line, content)?,
        }),
        _ => Err(malformed(line)),
    }
}

/// Parses `Source --> Target [: label]`.
///
/// The label is the raw text after the colon:
/// a bracket group in it gives the guard, and the text before the bracket the event.
fn parse_transition(line: &Line, warnings: &mut Vec<Warning>) -> Result<Stmt, ParserError> {
    let tokens: Vec<&Token> = line.tokens().collect();
    let arrow = tokens
        .iter()
        .position(|token| **token == Token::Arrow)
        .ok_or_else(|| malformed(line))?;
    let colon = tokens
        .iter()
        .position(|token| **token == Token::Colon)
        .unwrap_or(tokens.len());
    if colon < arrow {
        return Err(malformed(line));
    }
    let source = parse_source(line, &tokens[..arrow])?;
    let target = parse_target(line, &tokens[arrow + 1..colon])?;

    let mut event = None;
    let mut guard = None;
    if colon < tokens.len() {
        let label_start = line.tokens[colon].1.end;
        let bracket = line.tokens[colon + 1..]
            .iter()
            .find(|(token, _)| matches!(token, Token::Bracket(_)));
        let event_end = match bracket {
            Some((Token::Bracket(content), span)) => {
                if content.is_empty() {
                    warnings.push(Warning::EmptyGuard(line.number));
                } else {
                    guard = Some(content.to_owned());
                }
                span.start
            }
            _ => line.text.len(),
        };
        let text = line.text[label_start..event_end].trim();
        if !text.is_empty() {
            event = Some(text.to_owned());
        }
    }

    if source == Endpoint::Initial && (event.is_some() || guard.is_some()) {
        warnings.push(Warning::InitialLabelIgnored(line.number));
        event = None;
        guard = None;
    }
    Ok(Stmt::Transition {
        source,
        target,
        event,
        guard,
    })
}

/// Parses `State: Entry: action words`, joining the action words with `_`.
fn parse_action(line: &Line, state: &str, kind: ActionKind) -> Result<Stmt, ParserError> {
    let words = line.text_after(3);
    let action = words.split_whitespace().collect::<Vec<_>>().join("_");
    let action = action.strip_suffix("()").unwrap_or(&action);
    if action.is_empty() {
        return Err(ParserError::MissingActionName(line.number));
    }
    Ok(Stmt::Action {
        state: state.to_owned(),
        kind,
        action: action.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn parse(text: &str) -> (Result<Stmt, ParserError>, Vec<Warning>) {
        let lines = scan(text);
        let mut warnings = Vec::new();
        let stmt = parse_line(&lines[0], &mut warnings);
        (stmt, warnings)
    }

    fn state(name: &str) -> Endpoint {
        Endpoint::State {
            name: name.to_string(),
            history: false,
        }
    }

    #[test]
    fn state_declarations() {
        assert_eq!(
            parse("state Verriegelt").0,
            Ok(Stmt::State {
                name: "Verriegelt".to_string(),
                opens: false
            })
        );
        assert_eq!(
            parse("state An{").0,
            Ok(Stmt::State {
                name: "An".to_string(),
                opens: true
            })
        );
        assert_eq!(parse("  state  ").0, Err(ParserError::MissingStateName(1)));
    }

    #[test]
    fn transitions() {
        assert_eq!(
            parse("Auf --> Zu : schließen").0,
            Ok(Stmt::Transition {
                source: state("Auf"),
                target: state("Zu"),
                event: Some("schließen".to_string()),
                guard: None,
            })
        );
        assert_eq!(
            parse("Zubereitung --> Ausgabe : fertig [wasser > 0 and tasse]").0,
            Ok(Stmt::Transition {
                source: state("Zubereitung"),
                target: state("Ausgabe"),
                event: Some("fertig".to_string()),
                guard: Some("wasser > 0 and tasse".to_string()),
            })
        );
        assert_eq!(
            parse("A -> B").0,
            Ok(Stmt::Transition {
                source: state("A"),
                target: state("B"),
                event: None,
                guard: None,
            })
        );
    }

    #[test]
    fn guard_only() {
        assert_eq!(
            parse("A --> B : [ready]").0,
            Ok(Stmt::Transition {
                source: state("A"),
                target: state("B"),
                event: None,
                guard: Some("ready".to_string()),
            })
        );
        let (stmt, warnings) = parse("A --> B : go []");
        assert_eq!(
            stmt,
            Ok(Stmt::Transition {
                source: state("A"),
                target: state("B"),
                event: Some("go".to_string()),
                guard: None,
            })
        );
        assert_eq!(warnings, vec![Warning::EmptyGuard(1)]);
    }

    #[test]
    fn history_targets() {
        assert_eq!(
            parse("Pause --> An[H] : fortfahren").0,
            Ok(Stmt::Transition {
                source: state("Pause"),
                target: Endpoint::State {
                    name: "An".to_string(),
                    history: true
                },
                event: Some("fortfahren".to_string()),
                guard: None,
            })
        );
        assert_eq!(
            parse("Ausgabe --> [H]").0,
            Ok(Stmt::Transition {
                source: state("Ausgabe"),
                target: Endpoint::History,
                event: None,
                guard: None,
            })
        );
    }

    #[test]
    fn initial_transition() {
        let (stmt, warnings) = parse("[*] --> Aus : start");
        assert_eq!(
            stmt,
            Ok(Stmt::Transition {
                source: Endpoint::Initial,
                target: state("Aus"),
                event: None,
                guard: None,
            })
        );
        assert_eq!(warnings, vec![Warning::InitialLabelIgnored(1)]);
    }

    #[test]
    fn unsupported() {
        assert!(matches!(
            parse("A --> B[H*]").0,
            Err(ParserError::Unsupported { line: 1, .. })
        ));
        assert!(matches!(
            parse("A --> [*]").0,
            Err(ParserError::Unsupported { line: 1, .. })
        ));
        assert!(matches!(
            parse("--").0,
            Err(ParserError::Unsupported { line: 1, .. })
        ));
        assert!(matches!(
            parse("||").0,
            Err(ParserError::Unsupported { line: 1, .. })
        ));
    }

    #[test]
    fn malformed_transitions() {
        for text in ["--> B", "A -->", "A B --> C", "A --> B C", "A --> B --> C", "A --> [X]"] {
            assert!(
                matches!(parse(text).0, Err(ParserError::MalformedTransition { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn actions() {
        assert_eq!(
            parse("An: Entry: Wasser reinigen").0,
            Ok(Stmt::Action {
                state: "An".to_string(),
                kind: ActionKind::Entry,
                action: "Wasser_reinigen".to_string(),
            })
        );
        assert_eq!(
            parse("Aus : exit : piepen()").0,
            Ok(Stmt::Action {
                state: "Aus".to_string(),
                kind: ActionKind::Exit,
                action: "piepen".to_string(),
            })
        );
        assert_eq!(
            parse("Aus: Exit:").0,
            Err(ParserError::MissingActionName(1))
        );
    }

    #[test]
    fn ignored_lines() {
        assert_eq!(parse("@startuml").0, Ok(Stmt::Nothing));
        assert_eq!(parse("hide empty description").0, Ok(Stmt::Nothing));
        assert_eq!(parse("Aus : ein Zustand").0, Ok(Stmt::Nothing));
        let (stmt, warnings) = parse("Entry: waschen");
        assert_eq!(stmt, Ok(Stmt::Nothing));
        assert_eq!(
            warnings,
            vec![Warning::Ignored {
                line: 1,
                text: "Entry: waschen".to_string()
            }]
        );
    }

    #[test]
    fn braces() {
        assert_eq!(parse("{").0, Ok(Stmt::Open));
        assert_eq!(parse("}").0, Ok(Stmt::Close));
        assert_eq!(
            parse("skinparam state {").0,
            Ok(Stmt::Block("skinparam".to_string()))
        );
    }
}
