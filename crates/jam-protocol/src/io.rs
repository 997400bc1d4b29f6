//! Async Record Transfer
//!
//! Reads and writes whole control records over any tokio byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::ProtocolError;
use crate::message::{ControlMessage, MESSAGE_SIZE};

/// Read exactly one record.
///
/// A stream that ends part-way (or before the first byte) yields
/// `ConnectionClosed`. A complete record with a bad command byte yields
/// `UnknownCommand`; the stream stays aligned on the next record.
pub async fn read_message<R>(reader: &mut R) -> Result<ControlMessage, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MESSAGE_SIZE];
    let mut filled = 0;

    while filled < MESSAGE_SIZE {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(ProtocolError::ConnectionClosed {
                    received: filled,
                    expected: MESSAGE_SIZE,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    trace!("Received record {:02X?}", buf);
    ControlMessage::from_bytes(&buf)
}

/// Write one record as a single unit
pub async fn write_message<W>(writer: &mut W, message: &ControlMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.to_bytes();
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!("Sent record {:02X?}", bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command;

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let msg = ControlMessage::add_freq(62, 100, 1, 10);

        write_message(&mut client, &msg).await.unwrap();
        let got = read_message(&mut server).await.unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn test_partial_record_is_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[6, 1, 2]).await.unwrap();
        drop(client);

        match read_message(&mut server).await {
            Err(ProtocolError::ConnectionClosed { received: 3, expected: 7 }) => {}
            other => panic!("unexpected read result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_alignment() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[9, 0, 0, 0, 0, 0, 0]).await.unwrap();
        write_message(&mut client, &ControlMessage::clear_all()).await.unwrap();

        let err = read_message(&mut server).await.unwrap_err();
        assert!(err.is_recoverable());

        let next = read_message(&mut server).await.unwrap();
        assert_eq!(next.command, Command::ClearAll);
    }
}
