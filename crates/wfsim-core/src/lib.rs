//! Discrete-event simulation kernel.
//!
//! Components own a [`SimulationContext`] through which they read the clock, draw random numbers and emit
//! events. Events are delivered to registered [`EventHandler`]s in non-decreasing order of time; events
//! scheduled for the same time are delivered in the order they were created.

#![warn(missing_docs)]

pub mod component;
pub mod context;
pub mod event;
pub mod handler;
pub mod log;
pub mod simulation;
mod state;

pub use colored;
pub use component::Id;
pub use context::SimulationContext;
pub use event::{Event, EventData, EventId};
pub use handler::{EventCancellationPolicy, EventHandler};
pub use simulation::Simulation;
pub use state::EPSILON;
