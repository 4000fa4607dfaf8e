//! Builds the statechart AST from scanned lines.
//!
//! The input is first structured into nested bodies by matching braces.
//! Then each scope is processed in passes:
//! explicit `state` declarations, implicit creation of the states named by transitions
//! (outer scopes before inner ones, so that a name already visible from an enclosing scope
//! is not duplicated), then of the states named by action bindings, and finally
//! the recording of initial states, transitions and actions in textual order.

use crate::parser::{ActionKind, Endpoint, ParserError, Stmt, Warning, parse_line};
use crate::scanner::{Line, block_end};
use hsmgen_core::{Scope, StateId, StatechartBuilder, StatechartError, TransitionDecl};
use log::{debug, info};

enum Item {
    Stmt(usize, Stmt),
    Body(Body),
}

struct Body {
    scope: Scope,
    items: Vec<Item>,
}

/// The result of parsing a statechart description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumlModel {
    /// The statechart declarations, to be validated by [`StatechartBuilder::build`].
    pub statechart: StatechartBuilder,
    /// Non-fatal anomalies, in order of discovery.
    pub warnings: Vec<Warning>,
}

pub(crate) struct AstBuilder<'a> {
    lines: &'a [Line],
    statechart: StatechartBuilder,
    warnings: Vec<Warning>,
}

fn at(line: usize) -> impl Fn(StatechartError) -> ParserError {
    move |err| ParserError::Statechart { line, err }
}

impl<'a> AstBuilder<'a> {
    pub(crate) fn build(lines: &'a [Line], name: &str) -> Result<PumlModel, ParserError> {
        info!(target: "parser", "parsing statechart '{name}'");
        let mut builder = AstBuilder {
            lines,
            statechart: StatechartBuilder::new(name),
            warnings: Vec::new(),
        };
        let root = builder.declare(Scope::Root, 0, lines.len())?;
        builder.create_implicit(&root)?;
        builder.create_bound(&root)?;
        builder.record(&root)?;
        info!(
            target: "parser",
            "parsed statechart '{name}' with {} warnings",
            builder.warnings.len()
        );
        Ok(PumlModel {
            statechart: builder.statechart,
            warnings: builder.warnings,
        })
    }

    fn next_nonblank(&self, from: usize, end: usize) -> Option<usize> {
        (from..end).find(|&idx| !self.lines[idx].is_blank())
    }

    // Structures the lines in `start..end` into a body for `scope`,
    // declaring explicit states along the way.
    fn declare(&mut self, scope: Scope, start: usize, end: usize) -> Result<Body, ParserError> {
        let lines = self.lines;
        let mut items = Vec::new();
        let mut idx = start;
        while idx < end {
            let line = &lines[idx];
            let stmt = parse_line(line, &mut self.warnings)?;
            match stmt {
                Stmt::State { name, opens } => {
                    let id = match self.statechart.state_in(scope, &name) {
                        Some(id) => id,
                        None => self
                            .statechart
                            .new_state(scope, name.as_str())
                            .map_err(at(line.number))?,
                    };
                    let open = if opens {
                        Some(idx)
                    } else {
                        self.next_nonblank(idx + 1, end)
                            .filter(|&next| lines[next].is_lone_open())
                    };
                    if let Some(open) = open {
                        let close = block_end(&lines[..end], open, &name)?;
                        debug!(
                            target: "parser",
                            "body of '{name}' spans lines {}..={}",
                            lines[open].number,
                            lines[close].number
                        );
                        let body = self.declare(Scope::State(id), open + 1, close)?;
                        items.push(Item::Body(body));
                        idx = close + 1;
                    } else {
                        idx += 1;
                    }
                }
                Stmt::Block(directive) => {
                    idx = block_end(&lines[..end], idx, &directive)? + 1;
                }
                Stmt::Open => {
                    idx = block_end(&lines[..end], idx, "{")? + 1;
                }
                Stmt::Close => return Err(ParserError::UnexpectedClose(line.number)),
                Stmt::Nothing => idx += 1,
                stmt => {
                    items.push(Item::Stmt(idx, stmt));
                    idx += 1;
                }
            }
        }
        Ok(Body { scope, items })
    }

    // Initial states are direct children of their scope;
    // transition endpoints are created in the current scope only if not visible from it.
    fn create_implicit(&mut self, body: &Body) -> Result<(), ParserError> {
        let scope = body.scope;
        for item in &body.items {
            if let Item::Stmt(
                idx,
                Stmt::Transition {
                    source: Endpoint::Initial,
                    target: Endpoint::State { name, .. },
                    ..
                },
            ) = item
            {
                if self.statechart.state_in(scope, name).is_none() {
                    let line = self.lines[*idx].number;
                    self.statechart
                        .new_state(scope, name.as_str())
                        .map_err(at(line))?;
                }
            }
        }
        for item in &body.items {
            if let Item::Stmt(idx, Stmt::Transition { source, target, .. }) = item {
                let line = self.lines[*idx].number;
                for endpoint in [source, target] {
                    if let Endpoint::State { name, .. } = endpoint {
                        self.statechart
                            .ensure_state(scope, name)
                            .map_err(at(line))?;
                    }
                }
            }
        }
        for item in &body.items {
            if let Item::Body(inner) = item {
                self.create_implicit(inner)?;
            }
        }
        Ok(())
    }

    // Runs once every transition endpoint exists, so that a binding may name a nested state.
    fn create_bound(&mut self, body: &Body) -> Result<(), ParserError> {
        for item in &body.items {
            match item {
                Item::Stmt(idx, Stmt::Action { state, .. }) => {
                    if self.bound_state(body.scope, state).is_none() {
                        let line = self.lines[*idx].number;
                        self.statechart
                            .new_state(body.scope, state.as_str())
                            .map_err(at(line))?;
                    }
                }
                Item::Body(inner) => self.create_bound(inner)?,
                Item::Stmt(..) => {}
            }
        }
        Ok(())
    }

    // A visible state, or else the first state of that name nested in `scope`.
    fn bound_state(&self, scope: Scope, name: &str) -> Option<StateId> {
        self.statechart.lookup(scope, name).or_else(|| {
            let mut pending = self.statechart.children(scope).to_vec();
            pending.reverse();
            while let Some(id) = pending.pop() {
                if self.statechart.state(id).name() == name {
                    return Some(id);
                }
                pending.extend(self.statechart.state(id).substates().iter().rev());
            }
            None
        })
    }

    fn record(&mut self, body: &Body) -> Result<(), ParserError> {
        let scope = body.scope;
        for item in &body.items {
            match item {
                Item::Body(inner) => self.record(inner)?,
                Item::Stmt(idx, stmt) => {
                    let lines = self.lines;
                    self.record_stmt(scope, &lines[*idx], stmt)?;
                }
            }
        }
        Ok(())
    }

    fn record_stmt(&mut self, scope: Scope, line: &Line, stmt: &Stmt) -> Result<(), ParserError> {
        let malformed = || ParserError::MalformedTransition {
            line: line.number,
            text: line.text.trim().to_owned(),
        };
        let number = line.number;
        match stmt {
            Stmt::Transition {
                source: Endpoint::Initial,
                target,
                ..
            } => match target {
                Endpoint::State {
                    name,
                    history: false,
                } => self
                    .statechart
                    .set_initial(scope, name.as_str())
                    .map_err(at(number)),
                _ => Err(malformed()),
            },
            Stmt::Transition {
                source: Endpoint::State { name: source, .. },
                target,
                event,
                guard,
            } => {
                let (target, history) = match target {
                    Endpoint::State { name, history } => (name.as_str(), *history),
                    Endpoint::History => match scope {
                        Scope::Root => return Err(ParserError::HistoryAtRoot(number)),
                        Scope::State(id) => (self.statechart.state(id).name(), true),
                    },
                    Endpoint::Initial => return Err(malformed()),
                };
                let mut decl = TransitionDecl::new(source.as_str(), target);
                if let Some(event) = event {
                    decl = decl.with_event(event.as_str());
                }
                if let Some(guard) = guard {
                    decl = decl.with_guard(guard.as_str());
                }
                if history {
                    decl = decl.with_history();
                }
                self.statechart.add_transition(scope, decl);
                Ok(())
            }
            Stmt::Action {
                state,
                kind,
                action,
            } => {
                let id = self
                    .bound_state(scope, state)
                    .ok_or_else(|| ParserError::Statechart {
                        line: number,
                        err: StatechartError::UnknownState {
                            scope: self.statechart.scope_name(scope).to_owned(),
                            name: state.to_owned(),
                        },
                    })?;
                let previous = match kind {
                    ActionKind::Entry => self.statechart.set_entry(id, action.as_str()),
                    ActionKind::Exit => self.statechart.set_exit(id, action.as_str()),
                };
                if let Some(previous) = previous {
                    let state = state.to_owned();
                    self.warnings.push(match kind {
                        ActionKind::Entry => Warning::DuplicateEntry {
                            line: number,
                            state,
                            previous,
                        },
                        ActionKind::Exit => Warning::DuplicateExit {
                            line: number,
                            state,
                            previous,
                        },
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
