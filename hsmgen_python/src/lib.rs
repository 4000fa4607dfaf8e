//! Python backend: generates a class-based hierarchical state machine from a [`Statechart`].
//!
//! The generated module contains, in this order:
//!
//! - the runtime base classes `State`, `SimpleState`, `CompositeState`
//!   and `CompositeStateWithHistory`;
//! - one class per state, depth-first (a composite state before its substates);
//! - the `StateMachine` class, owning the top-level states and the shared `context`;
//! - one no-op stub per action, to be replaced by the actual implementation.
//!
//! Guards are Python expressions whose free names are attributes of the machine's context:
//! the guard `[wasser > 0]` becomes `(self.machine.context.wasser > 0)`.

mod guard;
mod names;

use std::collections::HashMap;
use std::fmt::Write;

use hsmgen_core::{Kind, StateId, Statechart};
use log::{debug, info, trace};
use thiserror::Error;

const RUNTIME: &str = include_str!("runtime.py");

/// The error type for generating Python code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// A state or action name cannot be used as a Python identifier.
    #[error("`{name}` cannot be used in Python code: {reason}")]
    InvalidIdentifier {
        /// The offending name.
        name: String,
        /// Why it cannot be used.
        reason: &'static str,
    },
    /// An action stub would shadow a generated class, a runtime name or a builtin,
    /// or would resolve to a local of the generated methods.
    #[error("action `{0}` conflicts with a generated class, runtime name or builtin")]
    ActionConflict(String),
    /// A guard is not a Python expression the generator can translate.
    #[error("guard `{guard}` cannot be translated to Python: {reason}")]
    InvalidGuard {
        /// The guard as written in the statechart.
        guard: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Two sibling states map to the same field name.
    #[error("states `{first}` and `{second}` in `{scope}` both map to field `{field}`")]
    FieldCollision {
        /// Name of the parent state (or of the statechart, for top-level states).
        scope: String,
        /// The first state.
        first: String,
        /// The second state.
        second: String,
        /// The shared field name.
        field: String,
    },
    /// Writing the code failed.
    #[error("formatting error")]
    Fmt(#[from] std::fmt::Error),
}

/// Generates the Python module implementing the statechart.
pub fn generate(chart: &Statechart) -> Result<String, GeneratorError> {
    PythonGenerator::new(chart)?.generate()
}

/// Code generator for a given [`Statechart`], with the Python names of its states.
#[derive(Debug, Clone)]
pub struct PythonGenerator<'a> {
    chart: &'a Statechart,
    order: Vec<StateId>,
    classes: Vec<String>,
    fields: Vec<String>,
}

impl<'a> PythonGenerator<'a> {
    /// Assigns class and field names to all states and validates action names.
    pub fn new(chart: &'a Statechart) -> Result<Self, GeneratorError> {
        let order = preorder(chart);
        let mut classes = vec![String::new(); chart.len()];
        let mut taken: Vec<String> = Vec::with_capacity(chart.len());
        for &id in &order {
            let state = chart.state(id);
            if !names::is_identifier(&state.name) {
                return Err(GeneratorError::InvalidIdentifier {
                    name: state.name.to_owned(),
                    reason: "state names must be identifiers",
                });
            }
            let mut class = names::class_name(&state.name);
            if taken.contains(&class) {
                if let Some(parent) = state.parent {
                    class = format!("{}{class}", classes[parent.index()]);
                }
            }
            let base = class.to_owned();
            let mut suffix = 2;
            while taken.contains(&class) {
                class = format!("{base}{suffix}");
                suffix += 1;
            }
            trace!(target: "codegen", "state '{}' generates class '{class}'", state.name);
            taken.push(class.to_owned());
            classes[id.index()] = class;
        }

        let mut fields = vec![String::new(); chart.len()];
        let scopes = std::iter::once((chart.name(), chart.top_states())).chain(
            chart
                .states()
                .map(|(_, state)| (state.name.as_str(), state.substates.as_slice())),
        );
        for (scope, siblings) in scopes {
            let mut seen: HashMap<String, StateId> = HashMap::new();
            for &id in siblings {
                let field = names::field_name(&chart.state(id).name);
                if let Some(&other) = seen.get(&field) {
                    return Err(GeneratorError::FieldCollision {
                        scope: scope.to_owned(),
                        first: chart.state(other).name.to_owned(),
                        second: chart.state(id).name.to_owned(),
                        field,
                    });
                }
                seen.insert(field.to_owned(), id);
                fields[id.index()] = field;
            }
        }

        for action in chart.actions() {
            if !names::is_identifier(action) {
                return Err(GeneratorError::InvalidIdentifier {
                    name: action.to_owned(),
                    reason: "action names must be identifiers",
                });
            }
            if names::is_keyword(action) {
                return Err(GeneratorError::InvalidIdentifier {
                    name: action.to_owned(),
                    reason: "action names cannot be keywords",
                });
            }
            let reserved = [names::SUPPORT_NAMES, names::BUILTINS, names::LOCAL_NAMES];
            if taken.contains(action) || reserved.iter().any(|set| set.contains(&action.as_str())) {
                return Err(GeneratorError::ActionConflict(action.to_owned()));
            }
        }

        Ok(Self {
            chart,
            order,
            classes,
            fields,
        })
    }

    /// Name of the class generated for the state.
    pub fn class_name(&self, id: StateId) -> &str {
        &self.classes[id.index()]
    }

    /// Name of the field holding the state in its parent (or in the `StateMachine`).
    pub fn field_name(&self, id: StateId) -> &str {
        &self.fields[id.index()]
    }

    /// Generates the Python module.
    pub fn generate(&self) -> Result<String, GeneratorError> {
        info!(target: "codegen", "generating Python code for '{}'", self.chart.name());
        let mut code = String::new();
        writeln!(
            code,
            "# State machine `{}`, generated by hsmgen. Do not edit.",
            self.chart.name()
        )?;
        writeln!(code)?;
        code.push_str(RUNTIME);
        for &id in &self.order {
            self.write_state(&mut code, id)?;
        }
        self.write_machine(&mut code)?;
        for action in self.chart.actions() {
            write!(code, "\n\ndef {action}():\n    pass\n")?;
        }
        debug!(
            target: "codegen",
            "generated {} classes and {} action stubs",
            self.order.len(),
            self.chart.actions().len()
        );
        Ok(code)
    }

    fn write_state(&self, code: &mut String, id: StateId) -> Result<(), GeneratorError> {
        let state = self.chart.state(id);
        let base = match state.kind {
            Kind::Simple => "SimpleState",
            Kind::Composite => "CompositeState",
            Kind::CompositeWithHistory => "CompositeStateWithHistory",
        };
        write!(code, "\n\nclass {}({base}):\n", self.class_name(id))?;

        if state.kind.is_composite() {
            writeln!(code, "    def __init__(self, parent, machine):")?;
            writeln!(code, "        super().__init__(parent, machine)")?;
            for &sub in &state.substates {
                writeln!(
                    code,
                    "        self.{} = {}(self, machine)",
                    self.field_name(sub),
                    self.class_name(sub)
                )?;
            }
            writeln!(code)?;
        }

        if state.entry.is_some() || state.kind.is_composite() {
            writeln!(code, "    def entry(self, use_history=False):")?;
            if let Some(action) = &state.entry {
                writeln!(code, "        {action}()")?;
            }
            if let Some(initial) = state.initial {
                let initial = self.field_name(initial);
                if state.kind == Kind::CompositeWithHistory {
                    writeln!(
                        code,
                        "        if use_history and self._history is not None:"
                    )?;
                    writeln!(code, "            self._state = self._history")?;
                    writeln!(code, "        else:")?;
                    writeln!(code, "            self._state = self.{initial}")?;
                } else {
                    writeln!(code, "        self._state = self.{initial}")?;
                }
                writeln!(code, "        self._state.entry()")?;
            }
            writeln!(code)?;
        }

        if let Some(action) = &state.exit {
            writeln!(code, "    def exit(self):")?;
            if state.kind.is_composite() {
                writeln!(code, "        super().exit()")?;
            }
            writeln!(code, "        {action}()")?;
            writeln!(code)?;
        }

        writeln!(code, "    def dispatch(self, event):")?;
        for transition in self.chart.transitions_from(id) {
            let mut conditions = Vec::new();
            if let Some(event) = &transition.event {
                conditions.push(format!("event == {}", names::string_literal(event)));
            }
            if let Some(guard) = &transition.guard {
                conditions.push(guard::condition(guard)?);
            }
            let condition = if conditions.is_empty() {
                "True".to_string()
            } else {
                conditions.join(" and ")
            };
            let owner = self.owner(id, transition.target);
            let history = if transition.history {
                ", use_history=True"
            } else {
                ""
            };
            writeln!(code, "        if {condition}:")?;
            writeln!(
                code,
                "            {owner}.transition({owner}.{}{history})",
                self.field_name(transition.target)
            )?;
            writeln!(code, "            return True")?;
        }
        if state.kind.is_composite() {
            writeln!(code, "        return super().dispatch(event)")?;
        } else {
            writeln!(code, "        return False")?;
        }
        Ok(())
    }

    // Path from the source's object to the object owning the target:
    // the target's parent state, or the `StateMachine` for top-level targets.
    fn owner(&self, source: StateId, target: StateId) -> String {
        let owner_depth = self
            .chart
            .state(target)
            .parent
            .map_or(0, |parent| self.chart.state(parent).depth);
        let hops = self.chart.state(source).depth.saturating_sub(owner_depth);
        let mut owner = String::from("self");
        for _ in 0..hops {
            owner.push_str(".parent");
        }
        owner
    }

    fn write_machine(&self, code: &mut String) -> Result<(), GeneratorError> {
        write!(code, "\n\nclass StateMachine:\n")?;
        writeln!(code, "    def __init__(self, context=None):")?;
        writeln!(
            code,
            "        self.context = context if context is not None else SimpleNamespace()"
        )?;
        writeln!(code, "        self.machine = self")?;
        for &id in self.chart.top_states() {
            writeln!(
                code,
                "        self.{} = {}(self, self)",
                self.field_name(id),
                self.class_name(id)
            )?;
        }
        writeln!(
            code,
            "        self._state = self.{}",
            self.field_name(self.chart.initial())
        )?;
        writeln!(code, "        self._state.entry()")?;
        writeln!(code)?;
        writeln!(code, "    @property")?;
        writeln!(code, "    def state(self):")?;
        writeln!(code, "        return self._state")?;
        writeln!(code)?;
        writeln!(code, "    def dispatch(self, event):")?;
        writeln!(code, "        return self._state.dispatch(event)")?;
        writeln!(code)?;
        writeln!(
            code,
            "    def transition(self, new_state, use_history=False):"
        )?;
        writeln!(code, "        self._state.exit()")?;
        writeln!(code, "        self._state = new_state")?;
        writeln!(code, "        self._state.entry(use_history)")?;
        Ok(())
    }
}

// States in depth-first order, each composite state before its substates.
fn preorder(chart: &Statechart) -> Vec<StateId> {
    let mut order = Vec::with_capacity(chart.len());
    let mut stack: Vec<StateId> = chart.top_states().iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        order.push(id);
        stack.extend(chart.state(id).substates.iter().rev());
    }
    order
}
