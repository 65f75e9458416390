//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Event;
use crate::handler::{EventCancellationPolicy, EventHandler};
use crate::log::{event_to_json, get_colored, log_undelivered_event};
use crate::state::SimulationState;

/// Represents a simulation, provides methods for its configuration and execution.
///
/// A simulation owns the clock, the pending event queue and the seeded random number generator. Every run
/// starts from a fresh instance, so two simulations created with the same seed and fed the same events
/// behave identically.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the identifier of component by its name.
    ///
    /// Panics if component with such name does not exist.
    pub fn lookup_id(&self, name: &str) -> Id {
        *self
            .name_to_id
            .get(name)
            .unwrap_or_else(|| panic!("component {} is not registered", name))
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such Id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    /// Creates a new simulation context with specified name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wfsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let engine_ctx = sim.create_context("engine");
    /// assert_eq!(engine_ctx.id(), 0); // component ids are assigned sequentially starting from 0
    /// assert_eq!(engine_ctx.name(), "engine");
    /// ```
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(
            self.register(name.as_ref()),
            name.as_ref(),
            self.sim_state.clone(),
            self.names.clone(),
        );
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Created context: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the event handler implementation for component with specified name, returns the component Id.
    ///
    /// If a context with this name was created before, its Id is reused.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Added handler: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Removes the event handler for component with specified name.
    ///
    /// Pending events related to the component are cancelled according to the passed policy. Events that are
    /// not cancelled and destined to the component will be logged as undelivered.
    pub fn remove_handler<S>(&mut self, name: S, cancel_policy: EventCancellationPolicy)
    where
        S: AsRef<str>,
    {
        let id = self.lookup_id(name.as_ref());
        self.handlers[id as usize] = None;
        match cancel_policy {
            EventCancellationPolicy::Incoming => self.cancel_events(|e| e.dst == id),
            EventCancellationPolicy::Outgoing => self.cancel_events(|e| e.src == id),
            EventCancellationPolicy::All => self.cancel_events(|e| e.src == id || e.dst == id),
            EventCancellationPolicy::None => {}
        }
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Removed handler: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Performs a single step through the simulation.
    ///
    /// Takes the next event from the queue, advances the simulation time to event time and passes it to
    /// [`EventHandler::on()`](crate::EventHandler::on()) of the destination component. Events destined to
    /// components without a handler are logged as undelivered and discarded.
    ///
    /// Returns `true` if some pending event was found and `false` otherwise.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use wfsim_core::Simulation;
    ///
    /// #[derive(Serialize)]
    /// pub struct Tick {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let mut ctx = sim.create_context("engine");
    /// ctx.emit_self(Tick {}, 1.2);
    /// assert!(sim.step());
    /// assert_eq!(sim.time(), 1.2);
    /// assert!(!sim.step());
    /// ```
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_event();
        let event = match next {
            Some(event) => event,
            None => return false,
        };
        if log_enabled!(Trace) {
            let dst_name = self.names.borrow().get(event.dst as usize).cloned().unwrap_or_default();
            trace!(
                target: &dst_name,
                "[{:.3} {} {}] {}",
                event.time,
                get_colored("EVENT", colored::Color::BrightBlack),
                dst_name,
                event_to_json(&event)
            );
        }
        match self.handlers.get(event.dst as usize) {
            Some(Some(handler)) => handler.borrow_mut().on(event),
            _ => log_undelivered_event(event),
        }
        true
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps through the simulation until the next event time is above `current_time + duration`
    /// or there are no pending events left.
    ///
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.time() + duration;
        loop {
            let next_time = self.sim_state.borrow_mut().peek_event().map(|e| e.time);
            match next_time {
                Some(time) if time > end_time => return true,
                Some(_) => {
                    self.step();
                }
                None => return false,
            }
        }
    }

    /// Returns `true` if there is at least one pending (not cancelled) event.
    pub fn has_pending_events(&self) -> bool {
        self.sim_state.borrow_mut().has_pending_events()
    }

    /// Returns a random float in the range _[0, 1)_ using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns the total number of created events, cancelled ones included.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Cancels pending events that satisfy the given predicate function.
    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.sim_state.borrow_mut().cancel_events(pred);
    }
}
