//! Jammer Control Session

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use jam_protocol::{write_message, ControlMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Give up on a silent jammer after this long (None = wait forever)
    pub read_timeout: Option<Duration>,
    /// Disable send coalescing on every socket
    pub nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            nodelay: true,
        }
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Socket connected, loop not yet reading
    Connected = 0,
    /// Loop is reading records
    Running = 1,
    /// Socket closed; terminal
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connected,
            1 => SessionState::Running,
            _ => SessionState::Closed,
        }
    }
}

/// One TCP control connection to a jammer node.
///
/// The read half belongs to the session's control loop; the write half is
/// shared by the orchestrator and by other loops forwarding NACKs. Closing
/// drops the write half and stops the loop, which drops the read half.
pub struct Session {
    ordinal: usize,
    peer: SocketAddr,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: AtomicU8,
    closed: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(ordinal: usize, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            ordinal,
            peer,
            writer: Mutex::new(Some(writer)),
            state: AtomicU8::new(SessionState::Connected as u8),
            closed: watch::channel(false).0,
        }
    }

    /// Position in the chain (primary = highest)
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Jammer address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the loop is still reading
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub(crate) fn mark_running(&self) {
        // Never resurrect a closed session
        let _ = self.state.compare_exchange(
            SessionState::Connected as u8,
            SessionState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Send one record to the jammer.
    ///
    /// A failed or short write closes the session.
    pub async fn send(&self, message: &ControlMessage) -> Result<(), SessionError> {
        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(writer) if self.state() != SessionState::Closed => writer,
            _ => return Err(SessionError::Closed(self.ordinal)),
        };

        match write_message(writer, message).await {
            Ok(()) => {
                debug!("Session {} sent {:?}", self.ordinal, message.command);
                Ok(())
            }
            Err(e) => {
                warn!("Session {} ({}) write failed: {}", self.ordinal, self.peer, e);
                self.mark_closed();
                if let Some(mut writer) = guard.take() {
                    let _ = writer.shutdown().await;
                }
                Err(e.into())
            }
        }
    }

    /// Mark closed, stop the control loop and release the write side
    pub async fn close(&self) {
        if self.mark_closed() {
            info!("Closing session {} ({})", self.ordinal, self.peer);
        }
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this only ends on `true`
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Returns true on the first call
    fn mark_closed(&self) -> bool {
        let previous = self
            .state
            .swap(SessionState::Closed as u8, Ordering::AcqRel);
        self.closed.send_replace(true);
        previous != SessionState::Closed as u8
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ordinal", &self.ordinal)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
