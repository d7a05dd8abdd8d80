//! LooseMAC tick loop
//
// https://github.com/rust-iot/rust-loosemac
// Copyright 2021 Ryan Kurte

use std::collections::BTreeMap;

use log::{debug, info, trace, warn};
use rand_core::RngCore;

use crate::config::Config;
use crate::error::Error;
use crate::fsm::{self, Ctx, Event};
use crate::graph::Graph;
use crate::mailbox::Mailbox;
use crate::message::{Message, MessageKind};
use crate::node::{Node, NodeState};
use crate::{NodeId, Ts};

/// Simulation counters
#[derive(Debug, Clone, PartialEq)]
pub struct SimStats {
    pub beacons_tx: u32,
    pub conflict_reports_tx: u32,
    pub combined_tx: u32,
    pub collisions_rx: u32,
    pub marking_conflicts: u32,
    pub slot_resets: u32,
    pub promotions: u32,
}

impl SimStats {
    pub fn new() -> Self {
        Self {
            beacons_tx: 0,
            conflict_reports_tx: 0,
            combined_tx: 0,
            collisions_rx: 0,
            marking_conflicts: 0,
            slot_resets: 0,
            promotions: 0,
        }
    }
}

/// The simulator: a node population driven in lockstep over a shared
/// single-hop medium
///
/// Each tick runs four phases in strict order, nodes visited in ascending
/// id: send, deliver, ready check, termination. All sends of a tick land in
/// the mailbox before the first delivery is dispatched, and all deliveries
/// land before the first promotion check, so a conflict report arriving on
/// a node's promotion tick still cancels the promotion.
#[derive(Debug)]
pub struct Sim<R> {
    config: Config,

    nodes: BTreeMap<NodeId, Node>,
    order: Vec<NodeId>,

    mailbox: Mailbox,
    tick: Ts,
    ready_count: usize,

    stats: SimStats,

    rng: R,
}

impl<R: RngCore> Sim<R> {
    /// Build a simulator from a topology, with the frame length the
    /// topology declares
    pub fn new(graph: &Graph, rng: R) -> Self {
        let config = Config::new(graph.lambda());
        Self::with_config(graph, config, rng)
    }

    pub fn with_config(graph: &Graph, config: Config, mut rng: R) -> Self {
        let mut nodes = BTreeMap::new();

        // Nodes draw their initial slots in declaration order. Slot
        // preferences are wrapped against the active frame length, which
        // may differ from the one the topology declared
        for spec in graph.nodes() {
            let default_slots = spec
                .default_slots
                .iter()
                .map(|s| config.wrap_slot(*s))
                .collect();

            let node = Node::new(
                spec.id,
                spec.neighbors.clone(),
                default_slots,
                config.lambda,
                &mut rng,
            );
            debug!("Node {} starts in slot {}", node.id, node.slot);
            nodes.insert(spec.id, node);
        }

        let order: Vec<NodeId> = nodes.keys().copied().collect();

        Self {
            config,
            nodes,
            order,
            mailbox: Mailbox::new(),
            tick: 0,
            ready_count: 0,
            stats: SimStats::new(),
            rng,
        }
    }

    /// Advance the simulation one tick
    pub fn step(&mut self) {
        self.tick += 1;
        self.mailbox.clear();

        let slot = self.config.slot_at(self.tick);
        trace!("Tick {} (slot {})", self.tick, slot);

        self.phase_send(slot);
        self.phase_deliver(slot);
        self.phase_ready(slot);
    }

    /// Run until every node is READY, or the configured tick bound is hit
    pub fn run(&mut self) -> Result<Ts, Error> {
        while !self.converged() {
            if self.tick >= self.config.max_ticks {
                warn!(
                    "No convergence after {} ticks ({}/{} nodes ready)",
                    self.tick,
                    self.ready_count,
                    self.nodes.len()
                );
                return Err(Error::NonConvergence { ticks: self.tick });
            }

            self.step();
        }

        info!(
            "All {} nodes READY after {} ticks",
            self.nodes.len(),
            self.tick
        );

        Ok(self.tick)
    }

    pub fn converged(&self) -> bool {
        self.ready_count == self.nodes.len()
    }

    /// Phase 1: every non-READY node whose slot has come transmits
    /// according to its pending flags
    fn phase_send(&mut self, slot: u32) {
        let Self {
            config,
            nodes,
            order,
            mailbox,
            tick,
            ready_count,
            stats,
            rng,
        } = self;

        let mut ctx = Ctx {
            lambda: config.lambda,
            tick: *tick,
            slot,
            mailbox,
            rng,
            stats,
            ready_count,
        };

        for id in order.iter() {
            let node = match nodes.get_mut(id) {
                Some(n) => n,
                None => continue,
            };

            if node.state == NodeState::Ready || node.slot != slot {
                continue;
            }

            match (node.snd_hello, node.snd_error) {
                // Pure conflict report: consumes the send slot without
                // touching the dispatcher, the wait schedule or the state
                (false, true) => {
                    let msg = Message {
                        kind: MessageKind::ConflictReport,
                        from: node.id,
                    };
                    ctx.mailbox.broadcast(node.id, &node.neighbors, msg);
                    node.snd_error = false;

                    ctx.stats.conflict_reports_tx =
                        ctx.stats.conflict_reports_tx.saturating_add(1);

                    debug!(
                        "Node {} TX CONFLICT_REPORT in slot {} at tick {}",
                        node.id, slot, ctx.tick
                    );
                }
                (true, false) => fsm::dispatch(
                    node,
                    Event::SentMsg {
                        kind: MessageKind::Beacon,
                    },
                    &mut ctx,
                ),
                (true, true) => fsm::dispatch(
                    node,
                    Event::SentMsg {
                        kind: MessageKind::BeaconConflict,
                    },
                    &mut ctx,
                ),
                (false, false) => (),
            }
        }
    }

    /// Phase 2: drain the mailbox in ascending recipient id
    fn phase_deliver(&mut self, slot: u32) {
        let Self {
            config,
            nodes,
            mailbox,
            tick,
            ready_count,
            stats,
            rng,
            ..
        } = self;

        let drained = mailbox.take();

        let mut ctx = Ctx {
            lambda: config.lambda,
            tick: *tick,
            slot,
            mailbox,
            rng,
            stats,
            ready_count,
        };

        for (id, delivery) in drained {
            if let Some(node) = nodes.get_mut(&id) {
                fsm::deliver(node, delivery, &mut ctx);
            }
        }
    }

    /// Phase 3: check scheduled promotions
    fn phase_ready(&mut self, slot: u32) {
        let Self {
            config,
            nodes,
            order,
            mailbox,
            tick,
            ready_count,
            stats,
            rng,
        } = self;

        let mut ctx = Ctx {
            lambda: config.lambda,
            tick: *tick,
            slot,
            mailbox,
            rng,
            stats,
            ready_count,
        };

        for id in order.iter() {
            let node = match nodes.get_mut(id) {
                Some(n) => n,
                None => continue,
            };

            if node.ready_time.is_some() {
                fsm::dispatch(node, Event::WaitIsOver, &mut ctx);
            }
        }
    }
}

impl<R> Sim<R> {
    pub fn tick(&self) -> Ts {
        self.tick
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::graph::Graph;

    fn sim(input: &str) -> Sim<StepRng> {
        let graph = Graph::parse(input).unwrap();
        Sim::new(&graph, StepRng::new(0, 1))
    }

    fn assert_invariants(s: &Sim<StepRng>) {
        let lambda = s.config().lambda;

        for node in s.nodes() {
            assert!(node.slot >= 1 && node.slot <= lambda);
            assert_eq!(node.markings.owner(node.slot), Some(node.id));
        }

        // Mailbox must be drained by the end of every tick
        assert!(s.mailbox.is_empty());
    }

    fn assert_neighbor_slots_distinct(s: &Sim<StepRng>) {
        for node in s.nodes() {
            for n in &node.neighbors {
                let other = s.node(*n).unwrap();
                if node.state == NodeState::Ready && other.state == NodeState::Ready {
                    assert_ne!(node.slot, other.slot, "nodes {} and {}", node.id, other.id);
                }
            }
        }
    }

    fn run_checked(s: &mut Sim<StepRng>) -> Ts {
        while !s.converged() {
            assert!(s.tick() < s.config().max_ticks, "no convergence");
            s.step();
            assert_invariants(s);
        }
        assert_neighbor_slots_distinct(s);
        s.tick()
    }

    #[test]
    fn two_isolated_nodes() {
        let _ = simplelog::SimpleLogger::init(
            log::LevelFilter::Debug,
            simplelog::Config::default(),
        );

        let mut s = sim("2\n1 (0)\n2 (0)\n");
        assert_eq!(s.config().lambda, 2);

        // StepRng hands slot 1 to node 1 and slot 2 to node 2
        assert_eq!(s.node(1).unwrap().slot, 1);
        assert_eq!(s.node(2).unwrap().slot, 2);

        s.step();
        assert_invariants(&s);
        assert_eq!(s.node(1).unwrap().state, NodeState::Waiting);
        assert_eq!(s.node(1).unwrap().ready_time, Some(3));

        s.step();
        assert_eq!(s.node(2).unwrap().state, NodeState::Waiting);
        assert_eq!(s.node(2).unwrap().ready_time, Some(4));

        s.step();
        assert_eq!(s.node(1).unwrap().state, NodeState::Ready);

        s.step();
        assert_eq!(s.node(2).unwrap().state, NodeState::Ready);
        assert!(s.converged());
        assert_eq!(s.tick(), 4);
        assert_eq!(s.stats().beacons_tx, 2);
        assert_eq!(s.stats().collisions_rx, 0);
    }

    #[test]
    fn two_adjacent_nodes_distinct_defaults() {
        let mut s = sim("2\n1 (1) 2 [1]\n2 (1) 1 [2]\n");

        let ticks = run_checked(&mut s);
        assert_eq!(ticks, 4);

        let n1 = s.node(1).unwrap();
        let n2 = s.node(2).unwrap();
        assert_eq!(n1.slot, 1);
        assert_eq!(n2.slot, 2);

        // Both ended up with the full picture of the frame
        assert_eq!(n1.markings.iter().collect::<Vec<_>>(), vec![(1, 1), (2, 2)]);
        assert_eq!(n2.markings.iter().collect::<Vec<_>>(), vec![(1, 1), (2, 2)]);
        assert_eq!(s.stats().collisions_rx, 0);
        assert_eq!(s.stats().marking_conflicts, 0);
    }

    #[test]
    fn two_adjacent_nodes_same_default_collide() {
        let mut s = sim("2\n1 (1) 2 [1]\n2 (1) 1 [1]\n");

        // Tick 1: both beacons overlap, every mailbox slot fuses to
        // CORRUPT and both nodes fall back with a report pending
        s.step();
        assert_invariants(&s);
        assert_eq!(s.stats().collisions_rx, 2);
        for node in s.nodes() {
            assert_eq!(node.state, NodeState::NotReady);
            assert!(node.snd_error);
            assert!(node.snd_hello);
            assert_eq!(node.ready_time, None);
        }

        let ticks = run_checked(&mut s);
        assert!(ticks <= 10);
        assert_ne!(s.node(1).unwrap().slot, s.node(2).unwrap().slot);
    }

    #[test]
    fn no_promotion_on_collision_tick_frame_later() {
        // Both nodes claim slot 1; after the tick-1 collision neither may
        // promote at tick 1 + lambda
        let mut s = sim("2\n1 (1) 2 [1]\n2 (1) 1 [1]\n");

        for _ in 0..3 {
            s.step();
        }

        assert_eq!(s.ready_count(), 0);
        for node in s.nodes() {
            assert_ne!(node.state, NodeState::Ready);
        }
    }

    #[test]
    fn triangle_with_distinct_defaults() {
        let mut s = sim(
            "3 [ 3 ]\n\
             1 (2) 2 3 [1]\n\
             2 (2) 1 3 [2]\n\
             3 (2) 1 2 [3]\n",
        );

        let ticks = run_checked(&mut s);
        assert_eq!(ticks, 6);

        for node in s.nodes() {
            assert_eq!(node.slot, node.id);
        }
        assert_eq!(s.stats().collisions_rx, 0);
        assert_eq!(s.stats().slot_resets, 0);
    }

    #[test]
    fn star_with_scheduled_defaults() {
        let mut s = sim(
            "4 [ 4 ]\n\
             1 (3) 2 3 4 [1]\n\
             2 (1) 1 [2]\n\
             3 (1) 1 [3]\n\
             4 (1) 1 [4]\n",
        );

        let ticks = run_checked(&mut s);

        // Center promotes at 1 + lambda, the last leaf at 4 + lambda
        assert_eq!(ticks, 8);
        assert_eq!(s.node(1).unwrap().slot, 1);
        assert_eq!(s.node(4).unwrap().slot, 4);
        assert_eq!(s.stats().collisions_rx, 0);

        // The center heard every leaf
        let center = s.node(1).unwrap();
        assert_eq!(
            center.markings.iter().collect::<Vec<_>>(),
            vec![(1, 1), (2, 2), (3, 3), (4, 4)]
        );
    }

    #[test]
    fn single_slot_frame_cannot_converge() {
        let graph = Graph::parse("2 [ 1 ]\n1 (1) 2\n2 (1) 1\n").unwrap();
        let mut config = Config::new(graph.lambda());
        config.max_ticks = 50;

        let mut s = Sim::with_config(&graph, config, StepRng::new(0, 1));

        assert_eq!(s.run(), Err(Error::NonConvergence { ticks: 50 }));
        assert_eq!(s.ready_count(), 0);
    }

    #[test]
    fn single_node_promotes_after_one_frame() {
        let mut s = sim("1 [ 3 ]\n1 (0)\n");

        let own_slot = s.node(1).unwrap().slot;
        let ticks = run_checked(&mut s);

        assert_eq!(ticks, own_slot as Ts + 3);
        assert_eq!(s.stats().beacons_tx, 1);
    }

    #[test]
    fn ready_nodes_stay_silent_and_frozen() {
        let mut s = sim("2\n1 (1) 2 [1]\n2 (1) 1 [2]\n");
        run_checked(&mut s);

        let before: Vec<Node> = s.nodes().cloned().collect();
        let beacons = s.stats().beacons_tx;

        for _ in 0..6 {
            s.step();
            assert_invariants(&s);
        }

        let after: Vec<Node> = s.nodes().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(s.stats().beacons_tx, beacons);
        assert_eq!(s.stats().conflict_reports_tx, 0);
    }

    #[test]
    fn exhausted_defaults_fall_back_to_random() {
        // Both nodes prefer slot 1; the retry after the collision must
        // come from the random draw, defaults being spent
        let mut s = sim("2 [ 4 ]\n1 (1) 2 [1]\n2 (1) 1 [1]\n");

        s.step();
        for node in s.nodes() {
            assert!(node.default_slots.is_empty());
            assert!(node.slot >= 1 && node.slot <= 4);
        }

        run_checked(&mut s);
        assert_ne!(s.node(1).unwrap().slot, s.node(2).unwrap().slot);
    }

    #[test]
    fn dense_frame_converges() {
        // Four mutually adjacent nodes contending for a four-slot frame
        // with no preferences at all
        let mut s = sim(
            "4\n\
             1 (3) 2 3 4\n\
             2 (3) 1 3 4\n\
             3 (3) 1 2 4\n\
             4 (3) 1 2 3\n",
        );

        run_checked(&mut s);

        let mut slots: Vec<u32> = s.nodes().map(|n| n.slot).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), 4);
    }
}
