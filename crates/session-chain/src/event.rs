//! Chain Outcome Events

use jam_protocol::ControlMessage;

/// Outcomes reported by the control loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A rejected request was re-issued to the next session
    Forwarded {
        from: usize,
        to: usize,
        message: ControlMessage,
    },
    /// Every jammer has rejected the request; it is dropped
    ResourceUnavailable { ordinal: usize, message: ControlMessage },
    /// Writing the forwarded request failed; the target session was closed
    ForwardFailed {
        from: usize,
        to: usize,
        message: ControlMessage,
    },
    /// A record the controller does not act on was discarded
    Dropped { ordinal: usize, reason: String },
    /// The session's loop has exited
    SessionClosed { ordinal: usize },
}
