
use std::collections::BTreeMap;

use log::trace;

use crate::message::{Delivery, Message};
use crate::NodeId;

/// Single-tick broadcast medium
///
/// Holds at most one delivery per recipient per tick. The first write to a
/// recipient records the message; any subsequent write within the same tick
/// fuses the slot to CORRUPT. A transmission also occupies the sender's own
/// slot (its carrier), so overlapping transmissions corrupt the sender's
/// channel and the sender observes the collision itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mailbox {
    slots: BTreeMap<NodeId, Delivery>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// Record a transmission at a single recipient, fusing with any
    /// earlier arrival
    pub fn put(&mut self, to: NodeId, msg: Message) {
        match self.slots.remove(&to) {
            None => {
                self.slots.insert(to, Delivery::Message(msg));
            }
            Some(prior) => {
                trace!("Mailbox collision at node {}", to);
                self.slots.insert(to, prior.merge(msg));
            }
        }
    }

    /// Record a transmission at every neighbor of the sender, plus the
    /// sender's own carrier slot
    pub fn broadcast(&mut self, from: NodeId, neighbors: &[NodeId], msg: Message) {
        self.put(from, msg);
        for n in neighbors {
            self.put(*n, msg);
        }
    }

    /// Look at a recipient's slot without draining it
    pub fn get(&self, to: NodeId) -> Option<&Delivery> {
        self.slots.get(&to)
    }

    /// Drain this tick's deliveries in ascending recipient id
    pub fn take(&mut self) -> BTreeMap<NodeId, Delivery> {
        std::mem::take(&mut self.slots)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
