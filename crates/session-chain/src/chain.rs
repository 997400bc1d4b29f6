//! Session Chain
//!
//! Membership is fixed once the chain is started, so control loops read
//! it without locking.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::control_loop;
use crate::error::SessionError;
use crate::event::ChainEvent;
use crate::session::{Session, SessionConfig};

/// Ordinal of the socketless chain head
pub const SENTINEL_ORDINAL: usize = 0;

/// Where a rejected request goes next
#[derive(Debug, Clone)]
pub enum Candidate {
    /// Try this session
    Session(Arc<Session>),
    /// No jammer left
    Exhausted,
}

pub(crate) fn lookup(sessions: &[Arc<Session>], ordinal: usize) -> Option<&Arc<Session>> {
    if ordinal == SENTINEL_ORDINAL || ordinal > sessions.len() {
        return None;
    }
    sessions.get(sessions.len() - ordinal)
}

pub(crate) fn candidate(sessions: &[Arc<Session>], ordinal: usize) -> Candidate {
    let next = ordinal.saturating_sub(1);
    match lookup(sessions, next) {
        Some(session) => Candidate::Session(Arc::clone(session)),
        None => Candidate::Exhausted,
    }
}

/// Ordered jammer sessions and their control loops
pub struct SessionChain {
    sessions: Arc<[Arc<Session>]>,
    loops: Vec<JoinHandle<()>>,
}

impl SessionChain {
    /// Wrap connected streams, in priority order, and spawn one control
    /// loop per session. Must be called inside a tokio runtime.
    ///
    /// The first stream becomes the primary session with the highest
    /// ordinal.
    pub fn start(
        streams: Vec<TcpStream>,
        config: &SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChainEvent>), SessionError> {
        let count = streams.len();
        let mut sessions = Vec::with_capacity(count);
        let mut readers = Vec::with_capacity(count);

        for (position, stream) in streams.into_iter().enumerate() {
            let peer = stream.peer_addr()?;
            if config.nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Could not disable Nagle on {}: {}", peer, e);
                }
            }
            let (reader, writer) = stream.into_split();
            sessions.push(Arc::new(Session::new(count - position, peer, writer)));
            readers.push(reader);
        }

        let sessions: Arc<[Arc<Session>]> = sessions.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let loops = sessions
            .iter()
            .zip(readers)
            .map(|(session, reader)| {
                session.mark_running();
                tokio::spawn(control_loop::run(
                    Arc::clone(session),
                    reader,
                    Arc::clone(&sessions),
                    events_tx.clone(),
                    config.read_timeout,
                ))
            })
            .collect();

        info!("Session chain started with {} sessions", count);
        Ok((Self { sessions, loops }, events_rx))
    }

    /// Number of jammer sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no jammer is connected
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session that receives new requests first
    pub fn primary(&self) -> Option<Arc<Session>> {
        self.sessions.first().cloned()
    }

    /// Session with the given ordinal
    pub fn get(&self, ordinal: usize) -> Option<Arc<Session>> {
        lookup(&self.sessions, ordinal).cloned()
    }

    /// Next session to try after `ordinal` rejects a request
    pub fn next_candidate(&self, ordinal: usize) -> Candidate {
        candidate(&self.sessions, ordinal)
    }

    /// Sessions in priority order
    pub fn sessions(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions.iter()
    }

    /// Number of sessions whose loop is still reading
    pub fn running(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_running()).count()
    }

    /// Close every session.
    ///
    /// Each loop stops reading and drops its socket without waiting
    /// for the jammer to hang up.
    pub async fn shutdown(&self) {
        for session in self.sessions.iter() {
            session.close().await;
        }
    }

    /// Wait for every control loop to exit
    pub async fn join(self) {
        for handle in self.loops {
            if let Err(e) = handle.await {
                warn!("Control loop ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use jam_protocol::{read_message, write_message, Command, ControlMessage};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Connected (controller side, jammer side) pairs over loopback
    async fn socket_pairs(n: usize) -> (Vec<TcpStream>, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut controllers = Vec::new();
        let mut jammers = Vec::new();
        for _ in 0..n {
            let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
            controllers.push(client.unwrap());
            jammers.push(accepted.unwrap().0);
        }
        (controllers, jammers)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChainEvent>) -> ChainEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_ordinals_count_down_from_primary() {
        let (controllers, _jammers) = socket_pairs(3).await;
        let (chain, _events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        let ordinals: Vec<usize> = chain.sessions().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![3, 2, 1]);
        assert_eq!(chain.primary().unwrap().ordinal(), 3);
        assert!(chain.get(SENTINEL_ORDINAL).is_none());
        assert!(chain.get(4).is_none());
        assert!(matches!(chain.next_candidate(1), Candidate::Exhausted));
        match chain.next_candidate(3) {
            Candidate::Session(s) => assert_eq!(s.ordinal(), 2),
            Candidate::Exhausted => panic!("expected session 2"),
        }
        assert_eq!(chain.running(), 3);
    }

    #[tokio::test]
    async fn test_nack_forwards_to_previous_ordinal() {
        let (controllers, mut jammers) = socket_pairs(3).await;
        let (chain, mut events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        let request = ControlMessage::add_freq(62, 180, 1, 20);
        write_message(&mut jammers[0], &ControlMessage::nack_freq(&request))
            .await
            .unwrap();

        let forwarded = timeout(WAIT, read_message(&mut jammers[1])).await.unwrap().unwrap();
        assert_eq!(forwarded, request);
        assert_eq!(
            next_event(&mut events).await,
            ChainEvent::Forwarded {
                from: 3,
                to: 2,
                message: request
            }
        );
        assert_eq!(chain.running(), 3);
    }

    #[tokio::test]
    async fn test_nack_at_last_jammer_is_unavailable() {
        let (controllers, mut jammers) = socket_pairs(2).await;
        let (_chain, mut events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        let request = ControlMessage::add_freq(100, 50, 2, 5);
        write_message(&mut jammers[1], &ControlMessage::nack_freq(&request))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            ChainEvent::ResourceUnavailable {
                ordinal: 1,
                message: request
            }
        );
        // Nothing reaches the primary
        assert!(timeout(Duration::from_millis(200), read_message(&mut jammers[0]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unrecognised_records_are_dropped() {
        use tokio::io::AsyncWriteExt;

        let (controllers, mut jammers) = socket_pairs(1).await;
        let (chain, mut events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        jammers[0].write_all(&[42, 0, 0, 0, 0, 0, 0]).await.unwrap();
        write_message(&mut jammers[0], &ControlMessage::clear_all())
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            ChainEvent::Dropped { ordinal: 1, .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ChainEvent::Dropped { ordinal: 1, .. }
        ));

        // Still reading after bad input
        let request = ControlMessage::add_freq(1, 1, 1, 1);
        write_message(&mut jammers[0], &ControlMessage::nack_freq(&request))
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            ChainEvent::ResourceUnavailable { ordinal: 1, .. }
        ));
        assert!(chain.get(1).unwrap().is_running());
    }

    #[tokio::test]
    async fn test_remote_close_stops_only_that_session() {
        let (controllers, mut jammers) = socket_pairs(2).await;
        let (chain, mut events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        drop(jammers.remove(1));

        assert_eq!(
            next_event(&mut events).await,
            ChainEvent::SessionClosed { ordinal: 1 }
        );
        assert_eq!(chain.get(1).unwrap().state(), SessionState::Closed);
        assert_eq!(chain.get(2).unwrap().state(), SessionState::Running);

        // Sending to the closed session fails without touching the socket
        assert!(matches!(
            chain.get(1).unwrap().send(&ControlMessage::clear_all()).await,
            Err(SessionError::Closed(1))
        ));

        // The primary keeps serving
        chain
            .primary()
            .unwrap()
            .send(&ControlMessage::clear_all())
            .await
            .unwrap();
        let got = timeout(WAIT, read_message(&mut jammers[0])).await.unwrap().unwrap();
        assert_eq!(got.command, Command::ClearAll);
    }

    #[tokio::test]
    async fn test_forward_to_closed_session_fails() {
        let (controllers, mut jammers) = socket_pairs(2).await;
        let (chain, mut events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        chain.get(1).unwrap().close().await;

        let request = ControlMessage::add_freq(7, 7, 7, 7);
        write_message(&mut jammers[0], &ControlMessage::nack_freq(&request))
            .await
            .unwrap();

        loop {
            match next_event(&mut events).await {
                ChainEvent::ForwardFailed { from, to, message } => {
                    assert_eq!((from, to), (2, 1));
                    assert_eq!(message, request);
                    break;
                }
                ChainEvent::SessionClosed { ordinal: 1 } => continue,
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_read_timeout_closes_silent_session() {
        let (controllers, _jammers) = socket_pairs(1).await;
        let config = SessionConfig {
            read_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (chain, mut events) = SessionChain::start(controllers, &config).unwrap();

        assert_eq!(
            next_event(&mut events).await,
            ChainEvent::SessionClosed { ordinal: 1 }
        );
        assert_eq!(chain.running(), 0);
    }

    #[tokio::test]
    async fn test_closed_session_ignores_late_nack() {
        let (controllers, mut jammers) = socket_pairs(2).await;
        let (chain, mut events) =
            SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        chain.get(2).unwrap().close().await;
        assert_eq!(
            next_event(&mut events).await,
            ChainEvent::SessionClosed { ordinal: 2 }
        );

        // The jammer sees both directions go away
        let eof = timeout(WAIT, read_message(&mut jammers[0])).await.unwrap();
        assert!(eof.is_err());

        let nack = ControlMessage::nack_freq(&ControlMessage::add_freq(20, 100, 0, 10));
        let _ = write_message(&mut jammers[0], &nack).await;

        let quiet = Duration::from_millis(200);
        assert!(timeout(quiet, events.recv()).await.is_err());
        assert!(timeout(quiet, read_message(&mut jammers[1])).await.is_err());
        assert_eq!(chain.get(1).unwrap().state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_shutdown_and_join() {
        let (controllers, mut jammers) = socket_pairs(2).await;
        let (chain, _events) = SessionChain::start(controllers, &SessionConfig::default()).unwrap();

        chain.shutdown().await;
        assert_eq!(chain.running(), 0);

        // Loops stop without waiting for the jammers to hang up
        timeout(WAIT, chain.join()).await.unwrap();
        for jammer in &mut jammers {
            assert!(read_message(jammer).await.is_err());
        }
    }
}
