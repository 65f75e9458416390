//! Logging facilities.
//!
//! Component messages are prefixed with `[time LEVEL component]` and routed through the `log` facade
//! with the component name as target, so they can be filtered with `RUST_LOG=datacenter=debug` and similar.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::error;
use serde_json::json;
use serde_type_name::type_name;

use crate::event::Event;

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with_ctx {
    ($level:ident, $label:expr, $color:ident, $ctx:expr, $msg:expr) => (
        log::$level!(
            target: $ctx.name(),
            "[{:.3} {} {}] {}",
            $ctx.time(), $crate::log::get_colored($label, $crate::colored::Color::$color), $ctx.name(), $msg
        )
    );
    ($level:ident, $label:expr, $color:ident, $ctx:expr, $format:expr, $($arg:tt)+) => (
        log::$level!(
            target: $ctx.name(),
            concat!("[{:.3} {} {}] ", $format),
            $ctx.time(), $crate::log::get_colored($label, $crate::colored::Color::$color), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the info level.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
/// use env_logger::Builder;
/// use wfsim_core::{log_info, Simulation, SimulationContext};
///
/// struct Broker {
///     ctx: SimulationContext,
/// }
///
/// impl Broker {
///     fn start(&self) {
///         log_info!(self.ctx, "started with {} vms", 4);
///     }
/// }
///
/// Builder::from_default_env()
///     .format(|buf, record| writeln!(buf, "{}", record.args()))
///     .init();
///
/// let mut sim = Simulation::new(123);
/// let broker = Broker { ctx: sim.create_context("broker") };
/// broker.start();
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(info, "INFO ", Green, $ctx, $($arg)+));
}

/// Logs a message at the debug level. See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(debug, "DEBUG", Blue, $ctx, $($arg)+));
}

/// Logs a message at the trace level. See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(trace, "TRACE", Cyan, $ctx, $($arg)+));
}

/// Logs a message at the warn level. See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(warn, "WARN ", Yellow, $ctx, $($arg)+));
}

/// Logs a message at the error level. See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(error, "ERROR", Red, $ctx, $($arg)+));
}

fn describe(event: &Event) -> serde_json::Value {
    json!({
        "type": type_name(&event.data).unwrap_or("unknown"),
        "data": event.data,
        "src": event.src,
        "dst": event.dst,
    })
}

fn log_simulation_error(event: &Event, what: &str) {
    error!(
        target: "simulation",
        "[{:.3} {} simulation] {}: {}",
        event.time,
        get_colored("ERROR", Color::Red),
        what,
        describe(event)
    );
}

/// Logs an unhandled event.
///
/// This method is used internally in [`cast!`](crate::cast!) macro.
pub fn log_unhandled_event(event: Event) {
    log_simulation_error(&event, "Unhandled event");
}

pub(crate) fn log_undelivered_event(event: Event) {
    log_simulation_error(&event, "Undelivered event");
}

pub(crate) fn log_incorrect_event(event: Event, msg: &str) {
    log_simulation_error(&event, &format!("Incorrect event ({})", msg));
}

pub(crate) fn event_to_json(event: &Event) -> serde_json::Value {
    describe(event)
}
