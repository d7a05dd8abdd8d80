//! LooseMAC per-node state machine.
//!
//! The dispatcher is the (state, event) table of the protocol: every pair
//! has a defined outcome, and the no-op rows are spelled out so the match
//! stays exhaustive over both axes.

use log::{debug, info, warn};
use rand_core::RngCore;

use crate::mailbox::Mailbox;
use crate::message::{Delivery, Message, MessageKind};
use crate::node::{Node, NodeState};
use crate::sim::SimStats;
use crate::{NodeId, Ts};

/// Protocol events dispatched against a node's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A pristine beacon arrived from a neighbor
    HeardBeacon { from: NodeId },

    /// The tick loop determined this node transmits now
    SentMsg { kind: MessageKind },

    /// A conflict report arrived from a neighbor
    HeardConflict { from: NodeId },

    /// The mailbox slot was corrupted by overlapping transmissions
    DetectedCollision,

    /// Periodic readiness check for a scheduled promotion
    WaitIsOver,
}

/// Shared per-tick context handed to the handlers
pub struct Ctx<'a, R> {
    /// Frame length
    pub lambda: u32,

    /// Current tick
    pub tick: Ts,

    /// Slot the current tick falls in
    pub slot: u32,

    pub mailbox: &'a mut Mailbox,
    pub rng: &'a mut R,
    pub stats: &'a mut SimStats,
    pub ready_count: &'a mut usize,
}

/// Drive one event through the dispatch table
pub fn dispatch<R: RngCore>(node: &mut Node, event: Event, ctx: &mut Ctx<R>) {
    use NodeState::*;

    match (node.state, event) {
        (NotReady, Event::HeardBeacon { from }) => heard_beacon(node, from, ctx),
        (NotReady, Event::SentMsg { kind }) => sent_msg(node, kind, ctx),
        (NotReady, Event::DetectedCollision) => collision_noreset(node, ctx),

        (Waiting, Event::HeardBeacon { from }) => heard_beacon(node, from, ctx),
        (Waiting, Event::HeardConflict { from }) => heard_conflict(node, from, ctx),
        (Waiting, Event::DetectedCollision) => collision_reset(node, ctx),
        (Waiting, Event::WaitIsOver) => make_ready(node, ctx),

        // No-op rows of the dispatch table
        (NotReady, Event::HeardConflict { .. })
        | (NotReady, Event::WaitIsOver)
        | (Waiting, Event::SentMsg { .. })
        | (Ready, _) => (),
    }
}

/// Translate a drained mailbox item into dispatches on the recipient
pub fn deliver<R: RngCore>(node: &mut Node, delivery: Delivery, ctx: &mut Ctx<R>) {
    match delivery {
        Delivery::Corrupt => {
            warn!("Node {} RX collision at tick {}", node.id, ctx.tick);
            ctx.stats.collisions_rx = ctx.stats.collisions_rx.saturating_add(1);

            dispatch(node, Event::DetectedCollision, ctx);
        }
        // A node does not receive its own transmission; a solitary pristine
        // carrier entry is dropped here
        Delivery::Message(m) if m.from == node.id => (),
        Delivery::Message(m) => {
            debug!(
                "Node {} RX {} from node {} at tick {}",
                node.id, m.kind, m.from, ctx.tick
            );

            match m.kind {
                MessageKind::Beacon => {
                    dispatch(node, Event::HeardBeacon { from: m.from }, ctx);
                }
                MessageKind::ConflictReport => {
                    dispatch(node, Event::HeardConflict { from: m.from }, ctx);
                }
                MessageKind::BeaconConflict => {
                    dispatch(node, Event::HeardBeacon { from: m.from }, ctx);
                    dispatch(node, Event::HeardConflict { from: m.from }, ctx);
                }
            }
        }
    }
}

/// Transmit a beacon (possibly combined with a conflict report) and start
/// the readiness wait
fn sent_msg<R: RngCore>(node: &mut Node, kind: MessageKind, ctx: &mut Ctx<R>) {
    let msg = Message {
        kind,
        from: node.id,
    };

    ctx.mailbox.broadcast(node.id, &node.neighbors, msg);

    node.snd_hello = false;
    if kind == MessageKind::BeaconConflict {
        node.snd_error = false;
    }

    node.ready_time = Some(ctx.tick + ctx.lambda as Ts);
    node.state = NodeState::Waiting;

    match kind {
        MessageKind::Beacon => {
            ctx.stats.beacons_tx = ctx.stats.beacons_tx.saturating_add(1);
        }
        _ => {
            ctx.stats.combined_tx = ctx.stats.combined_tx.saturating_add(1);
        }
    }

    debug!(
        "Node {} TX {} in slot {} at tick {} (ready check at {})",
        node.id,
        kind,
        node.slot,
        ctx.tick,
        ctx.tick + ctx.lambda as Ts
    );
}

/// Record a neighbor's claim, or flag a marking conflict
fn heard_beacon<R: RngCore>(node: &mut Node, from: NodeId, ctx: &mut Ctx<R>) {
    let slot = ctx.slot;

    match node.markings.owner(slot) {
        None => {
            // Senders move: drop a stale entry for this sender under
            // another slot before recording the new claim
            if let Some(stale) = node.markings.slot_of(from) {
                debug!(
                    "Node {} drops stale marking {} -> {}",
                    node.id, stale, from
                );
                node.markings.remove(stale);
            }

            node.markings.set(slot, from);
            debug!("Node {} marks slot {} for node {}", node.id, slot, from);
        }
        Some(owner) if owner == from => {
            // Re-announcement of a claim already on record
        }
        Some(owner) => {
            warn!(
                "Node {}: marking conflict in slot {} (recorded for node {}, beacon from node {})",
                node.id, slot, owner, from
            );
            ctx.stats.marking_conflicts = ctx.stats.marking_conflicts.saturating_add(1);

            node.snd_error = true;
        }
    }
}

/// A neighbor reported a conflict: withdraw the claim and start over
fn heard_conflict<R: RngCore>(node: &mut Node, from: NodeId, ctx: &mut Ctx<R>) {
    debug!(
        "Node {} resets after conflict report from node {} at tick {}",
        node.id, from, ctx.tick
    );

    reset(node, ctx);
}

/// Collision observed while NOTREADY: flag a pending report only
fn collision_noreset<R: RngCore>(node: &mut Node, _ctx: &mut Ctx<R>) {
    node.snd_error = true;
}

/// Collision observed mid-wait: flag a pending report and start over
fn collision_reset<R: RngCore>(node: &mut Node, ctx: &mut Ctx<R>) {
    collision_noreset(node, ctx);
    reset(node, ctx);
}

/// Promote to READY once the scheduled tick arrives
fn make_ready<R: RngCore>(node: &mut Node, ctx: &mut Ctx<R>) {
    if node.ready_time != Some(ctx.tick) {
        return;
    }

    node.state = NodeState::Ready;
    node.ready_time = None;

    *ctx.ready_count += 1;
    ctx.stats.promotions = ctx.stats.promotions.saturating_add(1);

    info!(
        "Node {} READY in slot {} at tick {} ({} ready)",
        node.id, node.slot, ctx.tick, *ctx.ready_count
    );
}

fn reset<R: RngCore>(node: &mut Node, ctx: &mut Ctx<R>) {
    node.ready_time = None;
    node.state = NodeState::NotReady;
    node.reassign_slot(ctx.lambda, ctx.rng);
    node.snd_hello = true;

    ctx.stats.slot_resets = ctx.stats.slot_resets.saturating_add(1);

    debug!(
        "Node {} falls back to NOTREADY, retries slot {}",
        node.id, node.slot
    );
}
