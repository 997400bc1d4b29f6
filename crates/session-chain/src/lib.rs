//! Jammer Session Chain
//!
//! One TCP control session per jammer node, each read by its own control
//! loop. Sessions form a fixed-priority chain: when a jammer answers an
//! ADD_FREQ with NACK_FREQ, the request moves to the next jammer in the
//! chain until one accepts it or the chain is exhausted.
//!
//! Ordinals count down from the primary session (`len()`) to 1. Ordinal
//! 0 is the sentinel head that owns no socket; reaching it means no
//! jammer is left to try.

mod chain;
mod connect;
mod control_loop;
mod error;
mod event;
mod session;

pub use chain::{Candidate, SessionChain, SENTINEL_ORDINAL};
pub use connect::{connect, connect_bts, connect_chain, parse_endpoints, Endpoint};
pub use error::SessionError;
pub use event::ChainEvent;
pub use session::{Session, SessionConfig, SessionState};
