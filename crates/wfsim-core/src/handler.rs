//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes event.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use serde::Serialize;
    /// use wfsim_core::{cast, Event, EventHandler, Simulation, SimulationContext};
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct Ping {
    ///     seq: u32,
    /// }
    ///
    /// pub struct Counter {
    ///     last_seq: u32,
    ///     ctx: SimulationContext,
    /// }
    ///
    /// impl EventHandler for Counter {
    ///     fn on(&mut self, event: Event) {
    ///         cast!(match event.data {
    ///             Ping { seq } => {
    ///                 self.last_seq = seq;
    ///             }
    ///         })
    ///     }
    /// }
    ///
    /// let mut sim = Simulation::new(123);
    /// let mut client = sim.create_context("client");
    /// let counter = Rc::new(RefCell::new(Counter { last_seq: 0, ctx: sim.create_context("counter") }));
    /// let counter_id = sim.add_handler("counter", counter.clone());
    /// client.emit(Ping { seq: 7 }, counter_id, 0.5);
    /// sim.step();
    /// assert_eq!(counter.borrow().last_seq, 7);
    /// ```
    fn on(&mut self, event: Event);
}

/// Pattern matching over event payloads.
///
/// Each arm downcasts the payload to the named type and destructures it. Match arms need not be exhaustive:
/// a payload that matches none of them is logged as unhandled under `ERROR` level.
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}

/// Specifies which pending events are cancelled on event handler removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventCancellationPolicy {
    /// Cancel events destined to the component.
    Incoming,
    /// Cancel events produced by the component.
    Outgoing,
    /// Cancel all events related to the component.
    All,
    /// Do not cancel events.
    None,
}
