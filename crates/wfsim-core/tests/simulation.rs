use std::cell::RefCell;
use std::rc::Rc;

use rand_distr::Exp;
use serde::Serialize;

use wfsim_core::{cast, Event, EventCancellationPolicy, EventHandler, Id, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
struct Stamp {
    label: u32,
}

struct Recorder {
    received: Vec<(f64, u32)>,
    sources: Vec<Id>,
    ctx: SimulationContext,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        self.sources.push(event.src);
        cast!(match event.data {
            Stamp { label } => {
                self.received.push((self.ctx.time(), label));
            }
        })
    }
}

fn setup(seed: u64) -> (Simulation, Rc<RefCell<Recorder>>, SimulationContext) {
    let mut sim = Simulation::new(seed);
    let recorder = Rc::new(RefCell::new(Recorder {
        received: Vec::new(),
        sources: Vec::new(),
        ctx: sim.create_context("recorder"),
    }));
    sim.add_handler("recorder", recorder.clone());
    let client = sim.create_context("client");
    (sim, recorder, client)
}

#[test]
fn events_are_delivered_in_time_order() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    client.emit(Stamp { label: 3 }, dst, 3.0);
    client.emit(Stamp { label: 1 }, dst, 1.0);
    client.emit(Stamp { label: 2 }, dst, 2.0);
    sim.step_until_no_events();
    let labels: Vec<u32> = recorder.borrow().received.iter().map(|x| x.1).collect();
    assert_eq!(labels, vec![1, 2, 3]);
    assert_eq!(sim.time(), 3.0);
}

#[test]
fn simultaneous_events_keep_creation_order() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    for label in 0..10 {
        client.emit(Stamp { label }, dst, 5.0);
    }
    sim.step_until_no_events();
    let labels: Vec<u32> = recorder.borrow().received.iter().map(|x| x.1).collect();
    assert_eq!(labels, (0..10).collect::<Vec<_>>());
}

#[test]
fn cancelled_event_is_skipped() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    let first = client.emit(Stamp { label: 1 }, dst, 1.0);
    client.emit(Stamp { label: 2 }, dst, 2.0);
    client.cancel_event(first);
    assert!(sim.has_pending_events());
    sim.step_until_no_events();
    assert_eq!(recorder.borrow().received, vec![(2.0, 2)]);
    assert_eq!(sim.event_count(), 2);
}

#[test]
fn step_for_duration_stops_at_threshold() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    client.emit(Stamp { label: 1 }, dst, 1.0);
    client.emit(Stamp { label: 2 }, dst, 4.0);
    assert!(sim.step_for_duration(2.0));
    assert_eq!(recorder.borrow().received.len(), 1);
    assert!(!sim.step_for_duration(10.0));
    assert_eq!(sim.time(), 4.0);
}

#[test]
fn removed_handler_with_incoming_policy_drops_pending_events() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    client.emit(Stamp { label: 1 }, dst, 1.0);
    sim.remove_handler("recorder", EventCancellationPolicy::Incoming);
    assert!(!sim.has_pending_events());
    sim.add_handler("recorder", recorder.clone());
    assert_eq!(sim.lookup_id("recorder"), dst);
    assert!(recorder.borrow().received.is_empty());
}

#[test]
#[should_panic]
fn negative_delay_is_rejected() {
    let (sim, _recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    client.emit(Stamp { label: 1 }, dst, -1.0);
}

#[test]
fn same_seed_gives_same_random_sequence() {
    let mut a = Simulation::new(42);
    let mut b = Simulation::new(42);
    let xs: Vec<f64> = (0..5).map(|_| a.rand()).collect();
    let ys: Vec<f64> = (0..5).map(|_| b.rand()).collect();
    assert_eq!(xs, ys);
    let n: u32 = a.gen_range(1..=10);
    assert!((1..=10).contains(&n));
}

#[test]
fn emit_as_substitutes_event_source() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    let proxy = sim.create_context("proxy");
    client.emit(Stamp { label: 1 }, dst, 1.0);
    client.emit_as(Stamp { label: 2 }, proxy.id(), dst, 2.0);
    sim.step_until_no_events();
    assert_eq!(recorder.borrow().received, vec![(1.0, 1), (2.0, 2)]);
    assert_eq!(recorder.borrow().sources, vec![client.id(), proxy.id()]);
}

#[test]
fn cancel_events_by_predicate() {
    let (mut sim, recorder, mut client) = setup(1);
    let dst = sim.lookup_id("recorder");
    for label in 0..6 {
        client.emit(Stamp { label }, dst, label as f64);
    }
    sim.step();
    sim.cancel_events(|e| e.time >= 3.0);
    sim.step_until_no_events();
    let labels: Vec<u32> = recorder.borrow().received.iter().map(|x| x.1).collect();
    assert_eq!(labels, vec![0, 1, 2]);
}

#[test]
fn distribution_samples_follow_seed() {
    let dist = Exp::new(0.5).unwrap();
    let mut a = Simulation::new(7);
    let mut b = Simulation::new(7);
    let mut ctx = b.create_context("sampler");
    let xs: Vec<f64> = (0..5).map(|_| a.sample_from_distribution(&dist)).collect();
    let ys: Vec<f64> = (0..5).map(|_| ctx.sample_from_distribution(&dist)).collect();
    assert_eq!(xs, ys);
    assert!(xs.iter().all(|&x| x >= 0.));
}
