use std::sync::atomic::{AtomicU8, Ordering};

/// Coarse node status surfaced to callers (`spec.md` §7: "a status is set
/// to one of {NotStarted, Bootstrapping, Ready, Degraded}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    NotStarted,
    Bootstrapping,
    Ready,
    Degraded,
}

impl NodeStatus {
    fn as_u8(self) -> u8 {
        match self {
            NodeStatus::NotStarted => 0,
            NodeStatus::Bootstrapping => 1,
            NodeStatus::Ready => 2,
            NodeStatus::Degraded => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeStatus::Bootstrapping,
            2 => NodeStatus::Ready,
            3 => NodeStatus::Degraded,
            _ => NodeStatus::NotStarted,
        }
    }
}

/// An `AtomicU8`-backed cell holding the current [`NodeStatus`], shared
/// freely across the tasks [`crate::context::NetworkContext`] spawns.
#[derive(Debug, Default)]
pub struct NodeStatusCell(AtomicU8);

impl NodeStatusCell {
    pub fn new(initial: NodeStatus) -> Self {
        NodeStatusCell(AtomicU8::new(initial.as_u8()))
    }

    pub fn get(&self) -> NodeStatus {
        NodeStatus::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, status: NodeStatus) {
        self.0.store(status.as_u8(), Ordering::Relaxed);
    }
}
