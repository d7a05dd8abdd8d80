
use std::collections::VecDeque;

use log::{debug, trace};
use rand_core::RngCore;
use strum::Display;

use crate::{NodeId, Ts};

/// Protocol states of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NodeState {
    /// Claim not yet announced, or withdrawn after a conflict
    #[strum(serialize = "NOTREADY")]
    NotReady,

    /// Beacon sent, waiting one full frame for objections
    #[strum(serialize = "WAITING")]
    Waiting,

    /// Slot considered stable, terminal
    #[strum(serialize = "READY")]
    Ready,
}

impl NodeState {
    pub fn is_ready(&self) -> bool {
        match self {
            NodeState::Ready => true,
            _ => false,
        }
    }
}

/// Marking vector: what a node believes each slot's owner to be
///
/// Fixed-size map from slot (1-indexed) to observed owner id. At most one
/// owner per slot; the self-entry for the node's own slot is maintained by
/// [`Node::reassign_slot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markings {
    owners: Vec<Option<NodeId>>,
}

impl Markings {
    pub fn new(lambda: u32) -> Self {
        Self {
            owners: vec![None; lambda as usize],
        }
    }

    fn index(&self, slot: u32) -> Option<usize> {
        if slot >= 1 && (slot as usize) <= self.owners.len() {
            Some(slot as usize - 1)
        } else {
            None
        }
    }

    pub fn owner(&self, slot: u32) -> Option<NodeId> {
        self.index(slot).and_then(|i| self.owners[i])
    }

    pub fn set(&mut self, slot: u32, owner: NodeId) {
        if let Some(i) = self.index(slot) {
            self.owners[i] = Some(owner);
        }
    }

    pub fn remove(&mut self, slot: u32) -> Option<NodeId> {
        self.index(slot).and_then(|i| self.owners[i].take())
    }

    /// Slot under which an owner is currently recorded, if any
    pub fn slot_of(&self, owner: NodeId) -> Option<u32> {
        self.owners
            .iter()
            .position(|o| *o == Some(owner))
            .map(|i| i as u32 + 1)
    }

    pub fn has_free(&self) -> bool {
        self.owners.iter().any(|o| o.is_none())
    }

    /// Recorded (slot, owner) pairs in ascending slot order
    pub fn iter(&self) -> impl Iterator<Item = (u32, NodeId)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.map(|id| (i as u32 + 1, id)))
    }
}

/// Per-node protocol state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,

    /// One-hop adjacency, in declaration order
    pub neighbors: Vec<NodeId>,

    pub state: NodeState,

    /// Currently claimed slot, in [1, lambda]
    pub slot: u32,

    /// Preferred slots, consumed head-first on each reassignment
    pub default_slots: VecDeque<u32>,

    /// Beacon pending for the next own-slot
    pub snd_hello: bool,

    /// Conflict report pending for the next own-slot
    pub snd_error: bool,

    pub markings: Markings,

    /// Tick at which a WAITING node promotes to READY if uninterrupted
    pub ready_time: Option<Ts>,
}

impl Node {
    /// Construct a node and draw its initial slot
    pub fn new<R: RngCore>(
        id: NodeId,
        neighbors: Vec<NodeId>,
        default_slots: Vec<u32>,
        lambda: u32,
        rng: &mut R,
    ) -> Self {
        let mut node = Self {
            id,
            neighbors,
            state: NodeState::NotReady,
            slot: 0,
            default_slots: default_slots.into(),
            snd_hello: true,
            snd_error: false,
            markings: Markings::new(lambda),
            ready_time: None,
        };

        node.reassign_slot(lambda, rng);

        node
    }

    /// Drop the current claim and pick a new slot
    ///
    /// Takes the head of the default-slot queue while it lasts, then draws
    /// uniformly among slots not present in the markings.
    pub fn reassign_slot<R: RngCore>(&mut self, lambda: u32, rng: &mut R) {
        self.markings.remove(self.slot);

        let next = match self.default_slots.pop_front() {
            Some(s) => s,
            None => self.random_slot(lambda, rng),
        };

        self.markings.set(next, self.id);

        trace!("Node {} slot {} -> {}", self.id, self.slot, next);
        self.slot = next;
    }

    fn random_slot<R: RngCore>(&self, lambda: u32, rng: &mut R) -> u32 {
        if !self.markings.has_free() {
            // Every slot is marked: move to any other slot and let the
            // collision machinery arbitrate. A single-slot frame leaves
            // nowhere to move to.
            debug!("Node {} markings saturated", self.id);

            if lambda == 1 {
                return self.slot;
            }
            loop {
                let candidate = rng.next_u32() % lambda + 1;
                if candidate != self.slot {
                    return candidate;
                }
            }
        }

        loop {
            let candidate = rng.next_u32() % lambda + 1;
            if self.markings.owner(candidate).is_none() {
                return candidate;
            }
        }
    }
}
