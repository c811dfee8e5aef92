//! Generic hierarchical state machine.
//!
//! A machine is parameterised by a state tag `S`, a trigger tag `T` and a
//! context type `C`. The context is the mutable data the machine operates
//! on (input buffers, pending events, outbound bytes); it is passed to every
//! predicate and action, which keeps the machine itself free of borrows into
//! its owner.
//!
//! Entry actions cannot call [`StateMachine::fire`] recursively. Instead an
//! entry action may return a follow-up trigger, and `fire` resolves
//! follow-ups in a loop until an entry action returns `None`. The concrete
//! machines in this crate only return follow-ups after consuming buffered
//! input or when moving to a state that waits, so the loop terminates.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::{Error, Result};

/// Guard evaluated during transition resolution.
pub type Predicate<C> = fn(&C) -> bool;

/// Action invoked after a state is entered. May request one follow-up
/// trigger by returning it.
pub type EntryAction<T, C> = fn(&mut C) -> Result<Option<T>>;

/// Action invoked before a state is exited.
pub type ExitAction<C> = fn(&mut C) -> Result<()>;

fn always<C>(_: &C) -> bool {
    true
}

struct Transition<S, T, C> {
    trigger: T,
    destination: S,
    predicate: Predicate<C>,
}

/// Transition table, parents and actions for a single state.
pub struct StateConfiguration<S, T, C> {
    transitions: Vec<Transition<S, T, C>>,
    parents: Vec<S>,
    entry: Option<EntryAction<T, C>>,
    exit: Option<ExitAction<C>>,
}

impl<S: Copy, T, C> Default for StateConfiguration<S, T, C> {
    fn default() -> Self {
        Self {
            transitions: Vec::new(),
            parents: Vec::new(),
            entry: None,
            exit: None,
        }
    }
}

impl<S: Copy, T, C> StateConfiguration<S, T, C> {
    /// Permits a transition to `destination` when `trigger` fires.
    pub fn permit(&mut self, trigger: T, destination: S) -> &mut Self {
        self.permit_if(trigger, destination, always)
    }

    /// Permits a transition to `destination` when `trigger` fires and the
    /// predicate holds.
    pub fn permit_if(&mut self, trigger: T, destination: S, predicate: Predicate<C>) -> &mut Self {
        self.transitions.push(Transition {
            trigger,
            destination,
            predicate,
        });
        self
    }

    /// Declares this state a substate of `parent`. When a trigger has no
    /// matching transition here, the parents are consulted in declaration
    /// order. Transitions declared on the state itself take priority.
    pub fn substate_of(&mut self, parent: S) -> &mut Self {
        self.parents.push(parent);
        self
    }

    /// Sets the action run after this state is entered.
    pub fn on_entry(&mut self, action: EntryAction<T, C>) -> &mut Self {
        self.entry = Some(action);
        self
    }

    /// Sets the action run before this state is exited.
    pub fn on_exit(&mut self, action: ExitAction<C>) -> &mut Self {
        self.exit = Some(action);
        self
    }
}

/// A hierarchical state machine with exactly one current state.
pub struct StateMachine<S, T, C> {
    state: S,
    configurations: HashMap<S, StateConfiguration<S, T, C>>,
}

impl<S, T, C> StateMachine<S, T, C>
where
    S: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Debug,
{
    /// Creates a machine resting in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            state: initial,
            configurations: HashMap::new(),
        }
    }

    /// The current state.
    pub fn state(&self) -> S {
        self.state
    }

    /// Begins (or resumes) configuring transitions for `state`.
    pub fn configure(&mut self, state: S) -> &mut StateConfiguration<S, T, C> {
        self.configurations.entry(state).or_default()
    }

    /// Whether firing `trigger` now would resolve to a transition.
    pub fn can_fire(&self, trigger: T, context: &C) -> bool {
        matches!(self.resolve(self.state, trigger, context), Ok(Some(_)))
    }

    /// Fires `trigger`: resolves the transition, runs the exit action of the
    /// current state, moves to the destination and runs its entry action.
    /// Follow-up triggers returned by entry actions are resolved in a loop.
    ///
    /// An error from an exit action leaves the machine in the source state;
    /// once the entry action runs, the state has already advanced.
    pub fn fire(&mut self, trigger: T, context: &mut C) -> Result<()> {
        let mut trigger = trigger;
        loop {
            let destination = self.resolve(self.state, trigger, context)?.ok_or_else(|| {
                Error::UndefinedTrigger {
                    state: format!("{:?}", self.state),
                    trigger: format!("{trigger:?}"),
                }
            })?;

            if let Some(exit) = self.configurations.get(&self.state).and_then(|c| c.exit) {
                exit(context)?;
            }
            self.state = destination;

            let entry = self.configurations.get(&destination).and_then(|c| c.entry);
            match entry {
                Some(entry) => match entry(context)? {
                    Some(next) => trigger = next,
                    None => return Ok(()),
                },
                None => return Ok(()),
            }
        }
    }

    fn resolve(&self, state: S, trigger: T, context: &C) -> Result<Option<S>> {
        let Some(configuration) = self.configurations.get(&state) else {
            return Ok(None);
        };

        let mut found = None;
        for transition in &configuration.transitions {
            if transition.trigger == trigger && (transition.predicate)(context) {
                if found.is_some() {
                    return Err(Error::AmbiguousTransition {
                        state: format!("{state:?}"),
                        trigger: format!("{trigger:?}"),
                    });
                }
                found = Some(transition.destination);
            }
        }

        if found.is_none() {
            for parent in &configuration.parents {
                if let Some(destination) = self.resolve(*parent, trigger, context)? {
                    if found.is_some() {
                        return Err(Error::AmbiguousTransition {
                            state: format!("{state:?}"),
                            trigger: format!("{trigger:?}"),
                        });
                    }
                    found = Some(destination);
                }
            }
        }

        Ok(found)
    }
}
