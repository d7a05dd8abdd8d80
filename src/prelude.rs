

pub use crate::{NodeId, Ts};

pub use crate::config::Config;

pub use crate::error::Error;
pub use crate::graph::{Graph, NodeSpec};

pub use crate::mailbox::Mailbox;
pub use crate::message::{Delivery, Message, MessageKind};
pub use crate::node::{Markings, Node, NodeState};

pub use crate::fsm::Event;
pub use crate::sim::{Sim, SimStats};
