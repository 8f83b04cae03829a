//! Admission slots bounding the number of quote requests in flight.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Occupancy {
    in_flight: usize,
    peak: usize,
}

/// Counting gate with a fixed number of slots.
///
/// [`acquire`](Self::acquire) blocks while every slot is taken; the returned
/// [`Slot`] frees its slot when dropped, so release happens on every exit
/// path of the holder.
pub struct AdmissionGate {
    slots: usize,
    occupancy: Mutex<Occupancy>,
    freed: Condvar,
}

/// One held admission slot.
#[must_use = "the slot is released as soon as it is dropped"]
pub struct Slot<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    /// `slots` must be at least 1 or every acquire blocks forever.
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            occupancy: Mutex::new(Occupancy::default()),
            freed: Condvar::new(),
        }
    }

    pub fn acquire(&self) -> Slot<'_> {
        let mut occ = self.occupancy.lock().expect("admission gate poisoned");
        while occ.in_flight >= self.slots {
            occ = self.freed.wait(occ).expect("admission gate poisoned");
        }
        occ.in_flight += 1;
        occ.peak = occ.peak.max(occ.in_flight);
        Slot { gate: self }
    }

    pub fn in_flight(&self) -> usize {
        self.occupancy.lock().expect("admission gate poisoned").in_flight
    }

    /// Highest number of slots held at once since creation
    pub fn peak(&self) -> usize {
        self.occupancy.lock().expect("admission gate poisoned").peak
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let occ = self.occupancy.lock().expect("admission gate poisoned");
        f.debug_struct("AdmissionGate")
            .field("slots", &self.slots)
            .field("in_flight", &occ.in_flight)
            .field("peak", &occ.peak)
            .finish()
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut occ = self.gate.occupancy.lock().expect("admission gate poisoned");
        occ.in_flight -= 1;
        self.gate.freed.notify_one();
    }
}
