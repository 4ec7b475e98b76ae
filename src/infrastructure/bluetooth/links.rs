//! Link Bookkeeping
//!
//! Connects resolve on a background task, so a link can finish opening after
//! the supervisor has already released the device. Each connect is tracked
//! as a numbered attempt; a release cancels the pending attempt and the late
//! link is handed back to be closed instead of being kept.

use crate::domain::models::DeviceId;
use std::collections::HashMap;

/// Ticket for one connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    device: DeviceId,
    number: u64,
}

impl Attempt {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

#[derive(Debug)]
enum Slot<L> {
    Pending(u64),
    Open(L),
}

#[derive(Debug)]
pub struct LinkTable<L> {
    slots: HashMap<DeviceId, Slot<L>>,
    next_attempt: u64,
}

impl<L> Default for LinkTable<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> LinkTable<L> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_attempt: 0,
        }
    }

    /// Start a connect to `device`. Any earlier attempt is superseded; an
    /// open link it replaces is returned for closing.
    pub fn begin(&mut self, device: &DeviceId) -> (Attempt, Option<L>) {
        self.next_attempt += 1;
        let number = self.next_attempt;
        let previous = self.slots.insert(device.clone(), Slot::Pending(number));

        let stale = match previous {
            Some(Slot::Open(link)) => Some(link),
            _ => None,
        };
        (
            Attempt {
                device: device.clone(),
                number,
            },
            stale,
        )
    }

    /// Store the link opened by `attempt`. Returns the link back when the
    /// attempt was released or superseded meanwhile.
    pub fn complete(&mut self, attempt: &Attempt, link: L) -> Result<(), L> {
        match self.slots.get(&attempt.device) {
            Some(Slot::Pending(number)) if *number == attempt.number => {
                self.slots.insert(attempt.device.clone(), Slot::Open(link));
                Ok(())
            }
            _ => Err(link),
        }
    }

    /// Forget a failed attempt, unless a newer one took its place
    pub fn abandon(&mut self, attempt: &Attempt) {
        if matches!(
            self.slots.get(&attempt.device),
            Some(Slot::Pending(number)) if *number == attempt.number
        ) {
            self.slots.remove(&attempt.device);
        }
    }

    /// Cancel any pending attempt for `device` and hand back its open link
    pub fn release(&mut self, device: &DeviceId) -> Option<L> {
        match self.slots.remove(device)? {
            Slot::Open(link) => Some(link),
            Slot::Pending(_) => None,
        }
    }

    pub fn get(&self, device: &DeviceId) -> Option<&L> {
        match self.slots.get(device)? {
            Slot::Open(link) => Some(link),
            Slot::Pending(_) => None,
        }
    }

    pub fn is_pending(&self, device: &DeviceId) -> bool {
        matches!(self.slots.get(device), Some(Slot::Pending(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
