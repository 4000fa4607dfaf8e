use super::{Kind, Scope, State, StateId, Statechart, StatechartError, Transition};
use log::{info, trace};

/// A state as declared in a [`StatechartBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNode {
    name: String,
    parent: Scope,
    substates: Vec<StateId>,
    initial: Option<String>,
    entry: Option<String>,
    exit: Option<String>,
}

impl StateNode {
    /// Name of the state.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope the state was declared in.
    pub fn parent(&self) -> Scope {
        self.parent
    }

    /// Direct substates, in declaration order.
    pub fn substates(&self) -> &[StateId] {
        &self.substates
    }

    /// Name of the initial substate, if designated.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// Bound entry action.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Bound exit action.
    pub fn exit(&self) -> Option<&str> {
        self.exit.as_deref()
    }
}

/// A transition as declared in a [`StatechartBuilder`]:
/// endpoints are names, resolved from the declaring scope only at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecl {
    /// Name of the source state.
    pub source: String,
    /// Name of the target state.
    pub target: String,
    /// Triggering event.
    pub event: Option<String>,
    /// Guard expression.
    pub guard: Option<String>,
    /// Whether the target is entered through its history.
    pub history: bool,
}

impl TransitionDecl {
    /// Creates an unlabeled transition between the named states.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            event: None,
            guard: None,
            history: false,
        }
    }

    /// Sets the triggering event.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the guard expression.
    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Requests the target to be entered through its history.
    pub fn with_history(mut self) -> Self {
        self.history = true;
        self
    }
}

/// Defines and builds a [`Statechart`].
///
/// The builder is the abstract syntax tree of a statechart:
/// an arena of [`StateNode`]s, addressed by [`StateId`]s assigned at insertion,
/// together with the transitions declared in each [`Scope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatechartBuilder {
    name: String,
    states: Vec<StateNode>,
    top: Vec<StateId>,
    initial: Option<String>,
    transitions: Vec<(Scope, TransitionDecl)>,
}

impl StatechartBuilder {
    /// Creates a new, empty [`StatechartBuilder`] for a statechart with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            top: Vec::new(),
            initial: None,
            transitions: Vec::new(),
        }
    }

    /// Name of the statechart.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a declared state.
    ///
    /// Panics if the [`StateId`] was not produced by this builder.
    pub fn state(&self, id: StateId) -> &StateNode {
        &self.states[id.index()]
    }

    /// Iterates over all declared states, in creation order.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &StateNode)> {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (StateId(idx as u16), state))
    }

    /// Declared transitions, with the scope they were declared in.
    pub fn transitions(&self) -> &[(Scope, TransitionDecl)] {
        &self.transitions
    }

    /// Name of the initial top-level state, if designated.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// Human-readable name of a scope: the statechart's name for the root.
    pub fn scope_name(&self, scope: Scope) -> &str {
        match scope {
            Scope::Root => &self.name,
            Scope::State(id) => &self.states[id.index()].name,
        }
    }

    /// The states declared directly in the given scope.
    pub fn children(&self, scope: Scope) -> &[StateId] {
        match scope {
            Scope::Root => &self.top,
            Scope::State(id) => &self.states[id.index()].substates,
        }
    }

    fn enclosing(&self, scope: Scope) -> Option<Scope> {
        match scope {
            Scope::Root => None,
            Scope::State(id) => Some(self.states[id.index()].parent),
        }
    }

    /// Finds a state declared directly in the given scope.
    pub fn state_in(&self, scope: Scope, name: &str) -> Option<StateId> {
        self.children(scope)
            .iter()
            .copied()
            .find(|id| self.states[id.index()].name == name)
    }

    /// Resolves a name from the given scope:
    /// first among its direct substates, then in each enclosing scope up to the root.
    pub fn lookup(&self, scope: Scope, name: &str) -> Option<StateId> {
        let mut scope = Some(scope);
        while let Some(current) = scope {
            if let Some(id) = self.state_in(current, name) {
                return Some(id);
            }
            scope = self.enclosing(current);
        }
        None
    }

    /// Adds a new state to the given scope.
    ///
    /// Fails if a state with the same name is already declared in that scope.
    pub fn new_state(
        &mut self,
        scope: Scope,
        name: impl Into<String>,
    ) -> Result<StateId, StatechartError> {
        let name = name.into();
        if self.state_in(scope, &name).is_some() {
            return Err(StatechartError::AlreadyDeclared(name));
        }
        let id = u16::try_from(self.states.len())
            .map(StateId)
            .map_err(|_| StatechartError::TooManyStates)?;
        trace!(target: "builder", "new state '{name}' in '{}'", self.scope_name(scope));
        self.states.push(StateNode {
            name,
            parent: scope,
            substates: Vec::new(),
            initial: None,
            entry: None,
            exit: None,
        });
        match scope {
            Scope::Root => self.top.push(id),
            Scope::State(parent) => self.states[parent.index()].substates.push(id),
        }
        Ok(id)
    }

    /// Resolves a name from the given scope (see [`StatechartBuilder::lookup`]),
    /// implicitly creating the state in that scope if it is not visible yet.
    pub fn ensure_state(&mut self, scope: Scope, name: &str) -> Result<StateId, StatechartError> {
        match self.lookup(scope, name) {
            Some(id) => Ok(id),
            None => self.new_state(scope, name),
        }
    }

    /// Designates the initial state of a scope.
    ///
    /// Fails if the scope already has one.
    pub fn set_initial(
        &mut self,
        scope: Scope,
        name: impl Into<String>,
    ) -> Result<(), StatechartError> {
        let scope_name = self.scope_name(scope).to_owned();
        let slot = match scope {
            Scope::Root => &mut self.initial,
            Scope::State(id) => &mut self.states[id.index()].initial,
        };
        if slot.is_some() {
            return Err(StatechartError::MultipleInitial(scope_name));
        }
        *slot = Some(name.into());
        Ok(())
    }

    /// Binds the entry action of a state, returning the previous binding.
    pub fn set_entry(&mut self, id: StateId, action: impl Into<String>) -> Option<String> {
        self.states[id.index()].entry.replace(action.into())
    }

    /// Binds the exit action of a state, returning the previous binding.
    pub fn set_exit(&mut self, id: StateId, action: impl Into<String>) -> Option<String> {
        self.states[id.index()].exit.replace(action.into())
    }

    /// Adds a transition declared in the given scope.
    /// Its endpoints are resolved from that scope when building.
    pub fn add_transition(&mut self, scope: Scope, transition: TransitionDecl) {
        trace!(
            target: "builder",
            "new transition '{} --> {}' in '{}'",
            transition.source,
            transition.target,
            self.scope_name(scope)
        );
        self.transitions.push((scope, transition));
    }

    fn resolve(&self, scope: Scope, name: &str) -> Result<StateId, StatechartError> {
        self.lookup(scope, name)
            .ok_or_else(|| StatechartError::UnknownState {
                scope: self.scope_name(scope).to_owned(),
                name: name.to_owned(),
            })
    }

    fn resolve_initial(&self, scope: Scope) -> Result<StateId, StatechartError> {
        let initial = match scope {
            Scope::Root => self.initial.as_deref(),
            Scope::State(id) => self.states[id.index()].initial.as_deref(),
        }
        .ok_or_else(|| StatechartError::MissingInitial(self.scope_name(scope).to_owned()))?;
        let id = self.resolve(scope, initial)?;
        if self.states[id.index()].parent == scope {
            Ok(id)
        } else {
            Err(StatechartError::InitialNotChild {
                scope: self.scope_name(scope).to_owned(),
                initial: initial.to_owned(),
            })
        }
    }

    // Whether `scope` is `id` itself or encloses it.
    fn encloses(&self, scope: Scope, id: StateId) -> bool {
        let mut current = Some(Scope::State(id));
        while let Some(s) = current {
            if s == scope {
                return true;
            }
            current = self.enclosing(s);
        }
        false
    }

    /// Validates the declarations and produces the [`Statechart`] table.
    ///
    /// Fails if a name cannot be resolved, if the root or a composite state lacks an initial state,
    /// if history is requested for a state without substates,
    /// or if a transition would enter a nested state directly.
    pub fn build(self) -> Result<Statechart, StatechartError> {
        info!(target: "builder", "building statechart '{}'", self.name);
        if self.states.is_empty() {
            return Err(StatechartError::Empty);
        }
        let initial = self.resolve_initial(Scope::Root)?;

        let mut history = vec![false; self.states.len()];
        let mut transitions = Vec::with_capacity(self.transitions.len());
        let mut outgoing = vec![Vec::new(); self.states.len()];
        for (scope, decl) in &self.transitions {
            let source = self.resolve(*scope, &decl.source)?;
            let target = self.resolve(*scope, &decl.target)?;
            let target_node = &self.states[target.index()];
            if decl.history {
                if target_node.substates.is_empty() {
                    return Err(StatechartError::HistoryOnSimpleState(
                        target_node.name.to_owned(),
                    ));
                }
                history[target.index()] = true;
            }
            if !self.encloses(target_node.parent, source) {
                return Err(StatechartError::UnsupportedTransition {
                    from: decl.source.to_owned(),
                    to: decl.target.to_owned(),
                });
            }
            outgoing[source.index()].push(transitions.len());
            transitions.push(Transition {
                source,
                target,
                event: decl.event.to_owned(),
                guard: decl.guard.to_owned(),
                history: decl.history,
            });
        }

        let mut actions: Vec<String> = Vec::new();
        let mut states = Vec::with_capacity(self.states.len());
        for (id, node) in self.states() {
            let kind = if node.substates.is_empty() {
                Kind::Simple
            } else if history[id.index()] {
                Kind::CompositeWithHistory
            } else {
                Kind::Composite
            };
            let initial = if kind.is_composite() {
                Some(self.resolve_initial(Scope::State(id))?)
            } else {
                None
            };
            for action in node.entry.iter().chain(node.exit.iter()) {
                if !actions.contains(action) {
                    actions.push(action.to_owned());
                }
            }
            let mut depth = 1;
            let mut parent = node.parent;
            while let Scope::State(p) = parent {
                depth += 1;
                parent = self.states[p.index()].parent;
            }
            states.push(State {
                name: node.name.to_owned(),
                parent: match node.parent {
                    Scope::Root => None,
                    Scope::State(p) => Some(p),
                },
                kind,
                entry: node.entry.to_owned(),
                exit: node.exit.to_owned(),
                substates: node.substates.to_owned(),
                initial,
                depth,
            });
        }

        info!(
            target: "builder",
            "statechart '{}' built with {} states and {} transitions",
            self.name,
            states.len(),
            transitions.len()
        );
        Ok(Statechart {
            name: self.name,
            states,
            transitions,
            outgoing,
            top: self.top,
            initial,
            actions,
        })
    }
}
