//! Per-session control loop
//!
//! Reads records from one jammer until it hangs up or the session is
//! closed. A NACK is rewritten as ADD_FREQ and handed to the next session
//! down the chain.

use std::sync::Arc;
use std::time::Duration;

use jam_protocol::{read_message, Command, ControlMessage, ProtocolError};
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::chain::{self, Candidate};
use crate::event::ChainEvent;
use crate::session::Session;

pub(crate) async fn run(
    session: Arc<Session>,
    mut reader: OwnedReadHalf,
    sessions: Arc<[Arc<Session>]>,
    events: UnboundedSender<ChainEvent>,
    read_timeout: Option<Duration>,
) {
    let ordinal = session.ordinal();
    session.mark_running();
    debug!("Control loop {} reading from {}", ordinal, session.peer());

    loop {
        let next = tokio::select! {
            biased;
            _ = session.closed() => {
                debug!("Control loop {} stopped", ordinal);
                break;
            }
            next = read_next(&mut reader, read_timeout) => next,
        };

        let next = match next {
            Some(next) => next,
            None => {
                warn!(
                    "Session {} silent for {:?}, giving up",
                    ordinal,
                    read_timeout.unwrap_or_default()
                );
                break;
            }
        };

        // Closed while the record was in flight
        if !session.is_running() {
            debug!("Session {} closed, discarding last record", ordinal);
            break;
        }

        match next {
            Ok(message) if message.command == Command::NackFreq => {
                handle_nack(&session, message, &sessions, &events).await;
            }
            Ok(message) => {
                warn!(
                    "Session {} sent unexpected {:?}, dropping",
                    ordinal, message.command
                );
                let _ = events.send(ChainEvent::Dropped {
                    ordinal,
                    reason: format!("unexpected {:?}", message.command),
                });
            }
            Err(e) if e.is_recoverable() => {
                warn!("Session {}: {}, dropping record", ordinal, e);
                let _ = events.send(ChainEvent::Dropped {
                    ordinal,
                    reason: e.to_string(),
                });
            }
            Err(ProtocolError::ConnectionClosed { received: 0, .. }) => {
                info!("Session {} closed by jammer", ordinal);
                break;
            }
            Err(e) => {
                warn!("Session {} read failed: {}", ordinal, e);
                break;
            }
        }
    }

    session.close().await;
    let _ = events.send(ChainEvent::SessionClosed { ordinal });
}

/// None when the read timed out
async fn read_next<R>(
    reader: &mut R,
    read_timeout: Option<Duration>,
) -> Option<Result<ControlMessage, ProtocolError>>
where
    R: AsyncRead + Unpin,
{
    match read_timeout {
        Some(limit) => time::timeout(limit, read_message(reader)).await.ok(),
        None => Some(read_message(reader).await),
    }
}

async fn handle_nack(
    session: &Session,
    nack: ControlMessage,
    sessions: &[Arc<Session>],
    events: &UnboundedSender<ChainEvent>,
) {
    let from = session.ordinal();
    let request = nack.as_add_freq();

    let event = match chain::candidate(sessions, from) {
        Candidate::Exhausted => {
            error!(
                "Resource unavailable: channel {} rejected by every jammer",
                request.channel
            );
            ChainEvent::ResourceUnavailable {
                ordinal: from,
                message: request,
            }
        }
        Candidate::Session(target) => {
            let to = target.ordinal();
            match target.send(&request).await {
                Ok(()) => {
                    info!(
                        "Channel {} rejected by session {}, forwarded to session {}",
                        request.channel, from, to
                    );
                    ChainEvent::Forwarded {
                        from,
                        to,
                        message: request,
                    }
                }
                Err(e) => {
                    error!(
                        "Forwarding channel {} from session {} to {} failed: {}",
                        request.channel, from, to, e
                    );
                    ChainEvent::ForwardFailed {
                        from,
                        to,
                        message: request,
                    }
                }
            }
        }
    };

    let _ = events.send(event);
}
