//! Implementation of the hierarchical statechart model.
//!
//! A _statechart_ is given by:
//!
//! - a tree of _states_, where a state with substates is _composite_;
//! - for the root and for each composite state, an _initial_ substate;
//! - optional _entry_ and _exit_ actions for each state;
//! - a list of _transitions_, each with a source state, a target state,
//!   an optional event label, an optional guard and a flag requesting (shallow) _history_ entry.
//!
//! A composite state entered with history resumes the substate that was active
//! when it was last exited, or its initial substate if it was never exited before.
//!
//! A statechart is defined through a [`StatechartBuilder`],
//! by adding, one at a time, states, initial designations, actions and transitions.
//! Transitions refer to states by name and are only resolved when the [`Statechart`] is built,
//! so that the definition order does not matter.
//!
//! ```
//! # use hsmgen_core::statechart::*;
//! // Create a new statechart builder
//! let mut builder = StatechartBuilder::new("door");
//!
//! // States are created in a scope, either the root or a composite state
//! let open = builder.new_state(Scope::Root, "Open").expect("new state");
//! let closed = builder.new_state(Scope::Root, "Closed").expect("new state");
//!
//! // Declare the initial state of the root scope
//! builder.set_initial(Scope::Root, "Open").expect("first initial designation");
//!
//! // Transitions refer to states by name
//! builder.add_transition(Scope::Root, TransitionDecl::new("Open", "Closed").with_event("close"));
//! builder.add_transition(Scope::Root, TransitionDecl::new("Closed", "Open").with_event("open"));
//!
//! // Building validates the statechart and resolves all names
//! let chart = builder.build().expect("well-formed statechart");
//! assert_eq!(chart.initial(), open);
//! assert_eq!(chart.transitions_from(open).next().map(|t| t.target), Some(closed));
//! ```

mod builder;

pub use builder::*;
use serde::Serialize;
use thiserror::Error;

/// An indexing object for states in a statechart.
///
/// These cannot be directly created or manipulated,
/// but have to be generated and/or provided by a [`StatechartBuilder`] or [`Statechart`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StateId(u16);

impl StateId {
    /// Position of the state in the statechart's state table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The scope states and transitions are declared in:
/// either the root of the statechart, or the body of a composite state.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
pub enum Scope {
    /// The top level of the statechart.
    Root,
    /// The body of the given (composite) state.
    State(StateId),
}

/// The kind of a state, as determined by its substates and incoming transitions.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
pub enum Kind {
    /// A state without substates.
    Simple,
    /// A state with substates.
    Composite,
    /// A state with substates which is the target of at least one history transition.
    CompositeWithHistory,
}

impl Kind {
    /// Whether the state has substates.
    pub fn is_composite(self) -> bool {
        !matches!(self, Kind::Simple)
    }
}

/// The error type for operations with [`StatechartBuilder`]s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatechartError {
    /// A state with the same name already exists in the scope.
    #[error("state `{0}` has already been declared in this scope")]
    AlreadyDeclared(String),
    /// A scope can have at most one initial state.
    #[error("`{0}` already has an initial state")]
    MultipleInitial(String),
    /// A name does not resolve to any state visible from the scope it was used in.
    #[error("unknown state `{name}` referenced in `{scope}`")]
    UnknownState {
        /// The scope the name was used in.
        scope: String,
        /// The unresolved name.
        name: String,
    },
    /// The root or a composite state has no initial state.
    #[error("`{0}` has no initial state (missing `[*] --> ...`)")]
    MissingInitial(String),
    /// The initial state of a scope must be one of its direct substates.
    #[error("initial state `{initial}` is not a direct substate of `{scope}`")]
    InitialNotChild {
        /// The scope declaring the initial state.
        scope: String,
        /// The name of the initial state.
        initial: String,
    },
    /// History can only be requested when entering a composite state.
    #[error("history transition into `{0}`, which has no substates")]
    HistoryOnSimpleState(String),
    /// Transitions can only target states whose parent is the source or one of its ancestors.
    #[error("transition `{from} --> {to}` enters a nested state directly")]
    UnsupportedTransition {
        /// Name of the source state.
        from: String,
        /// Name of the target state.
        to: String,
    },
    /// A statechart needs at least one state.
    #[error("the statechart declares no states")]
    Empty,
    /// State indexes are exhausted.
    #[error("too many states")]
    TooManyStates,
}

/// A state of a built [`Statechart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct State {
    /// Name of the state, unique within its parent scope.
    pub name: String,
    /// Enclosing composite state, if any.
    pub parent: Option<StateId>,
    /// Simple, composite, or composite with history.
    pub kind: Kind,
    /// Action run when the state is entered.
    pub entry: Option<String>,
    /// Action run when the state is exited.
    pub exit: Option<String>,
    /// Direct substates, in declaration order.
    pub substates: Vec<StateId>,
    /// Initial substate (always present for composite states).
    pub initial: Option<StateId>,
    /// Nesting depth: top-level states have depth 1.
    pub depth: usize,
}

/// A resolved transition of a built [`Statechart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// The state the transition leaves from.
    pub source: StateId,
    /// The state the transition enters.
    pub target: StateId,
    /// Triggering event; `None` matches any event.
    pub event: Option<String>,
    /// Guard expression, evaluated against the machine's context.
    pub guard: Option<String>,
    /// Whether the target is entered through its history.
    pub history: bool,
}

/// A validated statechart, given as a declarative table
/// of states and transitions indexed by [`StateId`].
///
/// Built by [`StatechartBuilder::build`], it can no longer be altered.
#[derive(Debug, Clone, Serialize)]
pub struct Statechart {
    name: String,
    states: Vec<State>,
    transitions: Vec<Transition>,
    // Indexes into `transitions`, grouped by source state
    #[serde(skip)]
    outgoing: Vec<Vec<usize>>,
    top: Vec<StateId>,
    initial: StateId,
    actions: Vec<String>,
}

impl Statechart {
    /// Name of the statechart.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a state of the statechart.
    ///
    /// Panics if the [`StateId`] was not produced by the builder of this statechart.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the statechart has no states (never true for a built statechart).
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterates over all states, in creation order.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (StateId(idx as u16), state))
    }

    /// The top-level states, in declaration order.
    pub fn top_states(&self) -> &[StateId] {
        &self.top
    }

    /// The top-level state the machine starts in.
    pub fn initial(&self) -> StateId {
        self.initial
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Transitions leaving the given state, in declaration order.
    pub fn transitions_from(&self, id: StateId) -> impl Iterator<Item = &Transition> {
        self.outgoing[id.index()]
            .iter()
            .map(|&idx| &self.transitions[idx])
    }

    /// Distinct action names, in order of first reference.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Finds the first state (in creation order) with the given name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.states()
            .find(|(_, state)| state.name == name)
            .map(|(id, _)| id)
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: StateId, id: StateId) -> bool {
        let mut parent = self.state(id).parent;
        while let Some(p) = parent {
            if p == ancestor {
                return true;
            }
            parent = self.state(p).parent;
        }
        false
    }
}
