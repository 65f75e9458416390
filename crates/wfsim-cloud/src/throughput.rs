//! Fair sharing of VM throughput between concurrently running cloudlets.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

const TOTAL_WORK_MAX_VALUE: f64 = 1e12;

struct Activity<T> {
    id: u64,
    item: T,
    weight: f64,
    finish_work: f64,
}

impl<T> PartialOrd for Activity<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Activity<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .finish_work
            .total_cmp(&self.finish_work)
            .then(other.id.cmp(&self.id))
    }
}

impl<T> PartialEq for Activity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.finish_work == other.finish_work && self.id == other.id
    }
}

impl<T> Eq for Activity<T> {}

/// Every active item of weight `w` progresses at `throughput(W) * w / W`, where `W` is the total weight of
/// active items.
///
/// Progress is tracked as the amount of work done per unit of weight since the model creation, so insertion and
/// completion cost `O(log n)` and no per-item updates are needed when `W` changes.
pub struct FairSharingModel<T> {
    activities: BinaryHeap<Activity<T>>,
    throughput: Box<dyn Fn(f64) -> f64>,
    total_weight: f64,
    throughput_per_weight: f64,
    next_id: u64,
    total_work: f64,
    last_update: f64,
}

impl<T> FairSharingModel<T> {
    pub fn new(throughput: Box<dyn Fn(f64) -> f64>) -> Self {
        Self {
            activities: BinaryHeap::new(),
            throughput,
            total_weight: 0.,
            throughput_per_weight: 0.,
            next_id: 0,
            total_work: 0.,
            last_update: 0.,
        }
    }

    /// Model of a VM with `pes` PEs of `mips` each, where item weights are the PEs they request.
    ///
    /// While the requested PEs fit the VM every item runs at `mips` per requested PE, beyond that the VM
    /// capacity is split in proportion to the requested PEs.
    pub fn for_vm(mips: f64, pes: u32) -> Self {
        Self::new(Box::new(move |requested| mips * requested.min(pes as f64)))
    }

    fn increment_total_work(&mut self, delta: f64) {
        self.total_work += delta;
        if self.total_work > TOTAL_WORK_MAX_VALUE {
            let total_work = self.total_work;
            let activities = std::mem::take(&mut self.activities);
            self.activities = activities
                .into_iter()
                .map(|mut a| {
                    a.finish_work -= total_work;
                    a
                })
                .collect();
            self.total_work = 0.;
        }
    }

    fn update_throughput(&mut self) {
        if self.activities.is_empty() {
            self.total_weight = 0.;
            self.throughput_per_weight = 0.;
        } else {
            self.throughput_per_weight = (self.throughput)(self.total_weight) / self.total_weight;
        }
    }

    /// Starts a new item with the given amount of work and positive weight at time `time`.
    pub fn insert(&mut self, time: f64, volume: f64, weight: f64, item: T) {
        if !self.activities.is_empty() {
            self.increment_total_work((time - self.last_update) * self.throughput_per_weight);
        }
        self.activities.push(Activity {
            id: self.next_id,
            item,
            weight,
            finish_work: self.total_work + volume / weight,
        });
        self.total_weight += weight;
        self.next_id += 1;
        self.update_throughput();
        self.last_update = time;
    }

    /// Removes the item finishing first, returns it with its completion time.
    pub fn pop(&mut self) -> Option<(f64, T)> {
        let entry = self.activities.pop()?;
        let remaining_work = entry.finish_work - self.total_work;
        let finish_time = self.last_update + remaining_work / self.throughput_per_weight;
        self.increment_total_work(remaining_work);
        self.total_weight -= entry.weight;
        self.update_throughput();
        self.last_update = finish_time;
        Some((finish_time, entry.item))
    }

    /// Returns the item finishing first with its completion time.
    pub fn peek(&self) -> Option<(f64, &T)> {
        self.activities.peek().map(|entry| {
            (
                self.last_update + (entry.finish_work - self.total_work) / self.throughput_per_weight,
                &entry.item,
            )
        })
    }

    /// Removes all items.
    pub fn drain(&mut self) -> Vec<T> {
        let items = std::mem::take(&mut self.activities)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|a| a.item)
            .collect();
        self.update_throughput();
        items
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_float_eq(x: f64, y: f64, eps: f64) {
        assert!(x >= y - eps && x <= y + eps, "{} != {}", x, y);
    }

    #[test]
    fn single_pe_is_shared() {
        let mut model = FairSharingModel::for_vm(100., 1);
        model.insert(0., 100., 1., 1);
        model.insert(0., 200., 1., 2);
        let (t1, i1) = model.pop().unwrap();
        assert_eq!(i1, 1);
        assert_float_eq(t1, 2., 1e-9);
        let (t2, i2) = model.pop().unwrap();
        assert_eq!(i2, 2);
        assert_float_eq(t2, 3., 1e-9);
        assert!(model.pop().is_none());
    }

    #[test]
    fn items_up_to_pe_count_run_at_full_speed() {
        let mut model = FairSharingModel::for_vm(100., 2);
        model.insert(0., 100., 1., 'a');
        model.insert(0., 100., 1., 'b');
        model.insert(0.5, 100., 1., 'c');
        // a and b get 100 until 0.5, then 2/3 * 100 each
        let (t, _) = model.peek().unwrap();
        assert_float_eq(t, 0.5 + 50. / (200. / 3.), 1e-9);
        assert_eq!(model.drain().len(), 3);
        assert!(model.is_empty());
    }

    #[test]
    fn multi_pe_item_uses_requested_pes() {
        let mut model = FairSharingModel::for_vm(1000., 2);
        model.insert(0., 2000., 2., 0);
        let (t, _) = model.pop().unwrap();
        assert_float_eq(t, 1., 1e-9);
    }

    #[test]
    fn oversubscribed_capacity_is_split_by_weight() {
        let mut model = FairSharingModel::for_vm(100., 2);
        model.insert(0., 200., 2., 'a');
        model.insert(0., 50., 1., 'b');
        // 200 mips split 2:1 between a and b
        let (t1, i1) = model.pop().unwrap();
        assert_eq!(i1, 'b');
        assert_float_eq(t1, 0.75, 1e-9);
        // a did 400 / 3 * 0.75 = 100 and runs alone at 200 afterwards
        let (t2, i2) = model.pop().unwrap();
        assert_eq!(i2, 'a');
        assert_float_eq(t2, 1.25, 1e-9);
    }
}
