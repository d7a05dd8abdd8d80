
use strum::Display;

use crate::NodeId;

/// Message kinds carried by the medium
///
/// CORRUPT is not a kind: it is a delivery state produced by collision
/// fusion, see [`Delivery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MessageKind {
    /// Sender claims the current slot
    #[strum(serialize = "BEACON")]
    Beacon,

    /// Sender observed a marking conflict involving the recipient
    #[strum(serialize = "CONFLICT_REPORT")]
    ConflictReport,

    /// Combined beacon plus conflict report from a single sender
    #[strum(serialize = "BEACON_CONFLICT")]
    BeaconConflict,
}

/// A pristine transmission as it left the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub from: NodeId,
}

/// What a recipient finds in its mailbox slot at the end of a tick
///
/// Two-state absorbing value: the first write stores the message, any
/// further write fuses the slot to `Corrupt` regardless of the new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Message(Message),
    Corrupt,
}

impl Delivery {
    /// Fuse a second arrival into an occupied slot
    pub fn merge(self, _incoming: Message) -> Delivery {
        Delivery::Corrupt
    }
}
