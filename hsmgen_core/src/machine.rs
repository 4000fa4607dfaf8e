//! Generic interpreter executing a [`Statechart`] table.
//!
//! A [`Machine`] has the same semantics as the code generated from the statechart:
//!
//! - events are dispatched to the active top-level state first;
//!   a state checks its own transitions in declaration order
//!   and, if none fires, delegates the event to its active substate;
//! - firing a transition exits the active substate of the target's parent (innermost first),
//!   then enters the target, recursively entering initial (or history) substates;
//! - a composite state with history records its active substate when exited.
//!
//! Guards and actions are delegated to a user-provided [`Context`].

use crate::statechart::{Kind, StateId, Statechart, Transition};
use log::{debug, info, trace};

/// Evaluates guards and runs actions on behalf of a [`Machine`].
pub trait Context {
    /// Evaluates the guard expression of a transition.
    fn guard(&mut self, expr: &str) -> bool;

    /// Runs an entry or exit action.
    fn action(&mut self, name: &str);
}

/// An executing instance of a [`Statechart`].
#[derive(Debug)]
pub struct Machine<'c, C> {
    chart: &'c Statechart,
    context: C,
    // Active top-level state
    active: StateId,
    // Active substate of each composite state, indexed by state
    current: Vec<Option<StateId>>,
    // Most recently exited substate of each composite state, indexed by state
    history: Vec<Option<StateId>>,
}

impl<'c, C: Context> Machine<'c, C> {
    /// Creates a machine and enters the initial state of the statechart,
    /// running the entry actions along the way.
    pub fn new(chart: &'c Statechart, context: C) -> Self {
        info!(target: "machine", "starting machine '{}'", chart.name());
        let mut machine = Self {
            chart,
            context,
            active: chart.initial(),
            current: vec![None; chart.len()],
            history: vec![None; chart.len()],
        };
        machine.enter(machine.active, false);
        machine
    }

    /// Dispatches an event to the active states.
    ///
    /// Returns whether a transition fired.
    pub fn dispatch(&mut self, event: &str) -> bool {
        debug!(target: "machine", "dispatching '{event}'");
        let handled = self.dispatch_to(self.active, event);
        if !handled {
            debug!(target: "machine", "event '{event}' not handled");
        }
        handled
    }

    fn dispatch_to(&mut self, state: StateId, event: &str) -> bool {
        let chart = self.chart;
        for transition in chart.transitions_from(state) {
            if transition.event.as_deref().is_some_and(|e| e != event) {
                continue;
            }
            if let Some(guard) = transition.guard.as_deref() {
                if !self.context.guard(guard) {
                    trace!(target: "machine", "guard '{guard}' not satisfied");
                    continue;
                }
            }
            self.fire(transition);
            return true;
        }
        match self.active_child(state) {
            Some(child) => self.dispatch_to(child, event),
            None => false,
        }
    }

    fn fire(&mut self, transition: &Transition) {
        let chart = self.chart;
        let target = transition.target;
        debug!(
            target: "machine",
            "transition '{}' --> '{}'",
            chart.state(transition.source).name,
            chart.state(target).name
        );
        let owner = chart.state(target).parent;
        let outgoing = match owner {
            None => Some(self.active),
            Some(parent) => self.current[parent.index()],
        };
        if let Some(outgoing) = outgoing {
            self.exit(outgoing);
        }
        match owner {
            None => self.active = target,
            Some(parent) => self.current[parent.index()] = Some(target),
        }
        self.enter(target, transition.history);
    }

    fn enter(&mut self, id: StateId, use_history: bool) {
        let chart = self.chart;
        let state = chart.state(id);
        trace!(target: "machine", "entering '{}'", state.name);
        if let Some(action) = state.entry.as_deref() {
            self.context.action(action);
        }
        if state.kind.is_composite() {
            let child = if use_history {
                self.history[id.index()].or(state.initial)
            } else {
                state.initial
            };
            if let Some(child) = child {
                self.current[id.index()] = Some(child);
                self.enter(child, false);
            }
        }
    }

    fn exit(&mut self, id: StateId) {
        let chart = self.chart;
        let state = chart.state(id);
        if let Some(child) = self.active_child(id) {
            if state.kind == Kind::CompositeWithHistory {
                self.history[id.index()] = Some(child);
            }
            self.exit(child);
        }
        trace!(target: "machine", "exiting '{}'", state.name);
        if let Some(action) = state.exit.as_deref() {
            self.context.action(action);
        }
    }

    fn active_child(&self, id: StateId) -> Option<StateId> {
        if self.chart.state(id).kind.is_composite() {
            self.current[id.index()]
        } else {
            None
        }
    }

    /// The statechart being executed.
    pub fn chart(&self) -> &'c Statechart {
        self.chart
    }

    /// The active top-level state.
    pub fn active_state(&self) -> StateId {
        self.active
    }

    /// The active states, from the top-level state down to the active leaf.
    pub fn active_configuration(&self) -> Vec<StateId> {
        let mut configuration = vec![self.active];
        let mut state = self.active;
        while let Some(child) = self.active_child(state) {
            configuration.push(child);
            state = child;
        }
        configuration
    }

    /// The innermost active state.
    pub fn active_leaf(&self) -> StateId {
        let mut state = self.active;
        while let Some(child) = self.active_child(state) {
            state = child;
        }
        state
    }

    /// Whether a state with the given name is currently active.
    pub fn is_active(&self, name: &str) -> bool {
        self.active_configuration()
            .into_iter()
            .any(|id| self.chart.state(id).name == name)
    }

    /// The substate a composite state would resume when entered with history.
    pub fn history(&self, id: StateId) -> Option<StateId> {
        self.history[id.index()]
    }

    /// The machine's context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// The machine's context, mutably (e.g., to change the values guards depend on).
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Consumes the machine, returning its context.
    pub fn into_context(self) -> C {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statechart::{Scope, StatechartBuilder, StatechartError, TransitionDecl};
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    struct Recorder {
        flags: HashSet<String>,
        log: Vec<String>,
    }

    impl Context for Recorder {
        fn guard(&mut self, expr: &str) -> bool {
            self.flags.contains(expr)
        }

        fn action(&mut self, name: &str) {
            self.log.push(name.to_string());
        }
    }

    fn door_lock() -> Result<Statechart, StatechartError> {
        let mut builder = StatechartBuilder::new("doorlock");
        builder.set_initial(Scope::Root, "Auf")?;
        for (source, target, event) in [
            ("Auf", "Zu", "schließen"),
            ("Zu", "Verriegelt", "verriegeln"),
            ("Verriegelt", "Zu", "entriegeln"),
            ("Zu", "Auf", "öffnen"),
        ] {
            builder.ensure_state(Scope::Root, source)?;
            builder.ensure_state(Scope::Root, target)?;
            builder.add_transition(
                Scope::Root,
                TransitionDecl::new(source, target).with_event(event),
            );
        }
        builder.build()
    }

    fn coffee_machine() -> Result<Statechart, StatechartError> {
        let mut builder = StatechartBuilder::new("coffeemachine");
        let aus = builder.new_state(Scope::Root, "Aus")?;
        let an = builder.new_state(Scope::Root, "An")?;
        builder.new_state(Scope::Root, "Pause")?;
        builder.set_initial(Scope::Root, "Aus")?;
        let inner = Scope::State(an);
        for name in ["Leerlauf", "Zubereitung", "Ausgabe"] {
            let id = builder.new_state(inner, name)?;
            builder.set_entry(id, format!("enter_{name}"));
            builder.set_exit(id, format!("exit_{name}"));
        }
        builder.set_initial(inner, "Leerlauf")?;
        builder.set_exit(aus, "piepen");
        builder.set_entry(an, "wasserReinigen");
        builder.set_exit(an, "abschalten");
        builder.add_transition(
            Scope::Root,
            TransitionDecl::new("Aus", "An").with_event("anschalten"),
        );
        builder.add_transition(
            Scope::Root,
            TransitionDecl::new("An", "Pause").with_event("stop"),
        );
        builder.add_transition(
            Scope::Root,
            TransitionDecl::new("Pause", "An")
                .with_event("fortfahren")
                .with_history(),
        );
        builder.add_transition(
            Scope::Root,
            TransitionDecl::new("Pause", "An").with_event("neustart"),
        );
        builder.add_transition(
            inner,
            TransitionDecl::new("Leerlauf", "Zubereitung").with_event("start"),
        );
        builder.add_transition(
            inner,
            TransitionDecl::new("Zubereitung", "Ausgabe")
                .with_event("fertig")
                .with_guard("wasser > 0"),
        );
        builder.add_transition(
            inner,
            TransitionDecl::new("Ausgabe", "Leerlauf").with_event("entnommen"),
        );
        builder.build()
    }

    #[test]
    fn door_lock_scenario() -> Result<(), StatechartError> {
        let chart = door_lock()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        assert!(machine.is_active("Auf"));
        assert!(machine.dispatch("schließen"));
        assert!(machine.dispatch("verriegeln"));
        // No transition for `öffnen` leaves `Verriegelt`
        assert!(!machine.dispatch("öffnen"));
        assert_eq!(chart.state(machine.active_leaf()).name, "Verriegelt");
        assert!(machine.dispatch("entriegeln"));
        assert_eq!(chart.state(machine.active_leaf()).name, "Zu");
        Ok(())
    }

    #[test]
    fn history_restores_substate() -> Result<(), StatechartError> {
        let chart = coffee_machine()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        machine.dispatch("anschalten");
        assert!(machine.is_active("Leerlauf"));
        machine.dispatch("start");
        assert!(machine.is_active("Zubereitung"));
        machine.dispatch("stop");
        assert!(machine.is_active("Pause"));
        let an = chart.find("An").expect("An");
        assert_eq!(machine.history(an), chart.find("Zubereitung"));
        machine.dispatch("fortfahren");
        let names: Vec<_> = machine
            .active_configuration()
            .into_iter()
            .map(|id| chart.state(id).name.as_str())
            .collect();
        assert_eq!(names, vec!["An", "Zubereitung"]);
        Ok(())
    }

    #[test]
    fn entry_without_history_uses_initial() -> Result<(), StatechartError> {
        let chart = coffee_machine()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        machine.dispatch("anschalten");
        machine.dispatch("start");
        machine.dispatch("stop");
        machine.dispatch("neustart");
        assert!(machine.is_active("Leerlauf"));
        Ok(())
    }

    #[test]
    fn empty_history_falls_back_to_initial() -> Result<(), StatechartError> {
        let mut builder = StatechartBuilder::new("fallback");
        builder.new_state(Scope::Root, "Off")?;
        let on = builder.new_state(Scope::Root, "On")?;
        builder.new_state(Scope::State(on), "Idle")?;
        builder.set_initial(Scope::State(on), "Idle")?;
        builder.set_initial(Scope::Root, "Off")?;
        builder.add_transition(Scope::Root, TransitionDecl::new("Off", "On").with_history());
        let chart = builder.build()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        assert!(machine.dispatch("anything"));
        assert!(machine.is_active("Idle"));
        Ok(())
    }

    #[test]
    fn exit_and_entry_order() -> Result<(), StatechartError> {
        let chart = coffee_machine()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        machine.dispatch("anschalten");
        machine.dispatch("start");
        machine.context_mut().log.clear();
        machine.dispatch("stop");
        machine.dispatch("fortfahren");
        assert_eq!(
            machine.context().log,
            vec![
                "exit_Zubereitung",
                "abschalten",
                "wasserReinigen",
                "enter_Zubereitung"
            ]
        );
        Ok(())
    }

    #[test]
    fn startup_runs_entry_actions() -> Result<(), StatechartError> {
        let chart = coffee_machine()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        assert!(machine.context().log.is_empty());
        machine.dispatch("anschalten");
        assert_eq!(
            machine.into_context().log,
            vec!["piepen", "wasserReinigen", "enter_Leerlauf"]
        );
        Ok(())
    }

    #[test]
    fn guard_gating() -> Result<(), StatechartError> {
        let chart = coffee_machine()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        machine.dispatch("anschalten");
        machine.dispatch("start");
        machine.context_mut().log.clear();
        assert!(!machine.dispatch("fertig"));
        assert!(machine.is_active("Zubereitung"));
        assert!(machine.context().log.is_empty());
        machine.context_mut().flags.insert("wasser > 0".to_string());
        assert!(machine.dispatch("fertig"));
        assert!(machine.is_active("Ausgabe"));
        Ok(())
    }

    #[test]
    fn outer_transitions_take_priority() -> Result<(), StatechartError> {
        let mut builder = StatechartBuilder::new("priority");
        let outer = builder.new_state(Scope::Root, "Outer")?;
        builder.new_state(Scope::Root, "Elsewhere")?;
        builder.set_initial(Scope::Root, "Outer")?;
        builder.new_state(Scope::State(outer), "Inner")?;
        builder.new_state(Scope::State(outer), "Sibling")?;
        builder.set_initial(Scope::State(outer), "Inner")?;
        builder.add_transition(
            Scope::State(outer),
            TransitionDecl::new("Inner", "Sibling").with_event("go"),
        );
        builder.add_transition(
            Scope::Root,
            TransitionDecl::new("Outer", "Elsewhere").with_event("go"),
        );
        let chart = builder.build()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        assert!(machine.dispatch("go"));
        assert!(machine.is_active("Elsewhere"));
        Ok(())
    }

    #[test]
    fn transition_to_ancestor_sibling() -> Result<(), StatechartError> {
        let mut builder = StatechartBuilder::new("escape");
        let outer = builder.new_state(Scope::Root, "Outer")?;
        builder.new_state(Scope::Root, "Done")?;
        builder.set_initial(Scope::Root, "Outer")?;
        let inner = builder.new_state(Scope::State(outer), "Inner")?;
        builder.set_initial(Scope::State(outer), "Inner")?;
        builder.set_exit(inner, "leave_inner");
        builder.set_exit(outer, "leave_outer");
        builder.add_transition(
            Scope::State(outer),
            TransitionDecl::new("Inner", "Done").with_event("finish"),
        );
        let chart = builder.build()?;
        let mut machine = Machine::new(&chart, Recorder::default());
        assert!(machine.dispatch("finish"));
        assert!(machine.is_active("Done"));
        assert_eq!(machine.context().log, vec!["leave_inner", "leave_outer"]);
        Ok(())
    }
}
