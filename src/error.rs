
use core::fmt;

use crate::{NodeId, Ts};

/// Simulator errors
///
/// The protocol engine itself has no recoverable error surface; collisions
/// and conflicts are protocol events handled by the FSM. Errors are confined
/// to the topology loader and the run bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input line could not be parsed
    MalformedInput { line: usize },

    /// Node count below one
    InvalidNodeCount(u32),

    /// Frame length below one
    InvalidLambda(u32),

    /// Node id declared more than once
    DuplicateNode { node: NodeId },

    /// Adjacency references an undeclared node id
    UnknownNeighbor { node: NodeId, neighbor: NodeId },

    /// Declared slot preference below one
    InvalidDefaultSlot { node: NodeId, slot: u32 },

    /// Simulation did not converge within the tick bound
    NonConvergence { ticks: Ts },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedInput { line } => {
                write!(f, "malformed input at line {}", line)
            }
            Error::InvalidNodeCount(n) => {
                write!(f, "invalid node count: {}", n)
            }
            Error::InvalidLambda(l) => {
                write!(f, "invalid frame length: {}", l)
            }
            Error::DuplicateNode { node } => {
                write!(f, "duplicate node id {}", node)
            }
            Error::UnknownNeighbor { node, neighbor } => {
                write!(f, "node {} references undeclared neighbor {}", node, neighbor)
            }
            Error::InvalidDefaultSlot { node, slot } => {
                write!(f, "node {} declares invalid default slot {}", node, slot)
            }
            Error::NonConvergence { ticks } => {
                write!(f, "simulation did not converge within {} ticks", ticks)
            }
        }
    }
}

impl std::error::Error for Error {}
