//! LooseMAC protocol simulator.
//!
//! A serial, discrete-time simulation of LooseMAC, a distributed time-slot
//! allocation protocol for multi-hop wireless networks. Every node in a
//! static graph claims a transmission slot within a repeating frame of
//! length lambda, beaconing in its own slot and reporting conflicts it
//! observes, until each node holds a slot that is unique within its one-hop
//! neighborhood.

pub mod config;

pub mod error;

pub mod message;

pub mod mailbox;

pub mod node;

pub mod fsm;

pub mod graph;

pub mod sim;

pub mod report;

pub mod prelude;

/// Node identifier, stable for the lifetime of a run
pub type NodeId = u32;

/// Simulated time in ticks
pub type Ts = u64;
