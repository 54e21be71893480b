//! Message framing over an async byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::Message;
use super::wire::{WireError, OFPT_HELLO, OFP_HEADER_LEN, OFP_VERSION};

/// Read one framed message, returning its transaction id.
///
/// HELLO is accepted at any version so the peer can negotiate down to 1.0;
/// every other message must be OpenFlow 1.0.
pub async fn read_message<R>(reader: &mut R, max_len: usize) -> Result<(u32, Message), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; OFP_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WireError::Closed),
        Err(e) => return Err(WireError::Io(e)),
    }

    let version = header[0];
    let msg_type = header[1];
    let length = u16::from_be_bytes([header[2], header[3]]);
    let xid = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if (length as usize) < OFP_HEADER_LEN {
        return Err(WireError::BadLength(length));
    }
    if length as usize > max_len {
        return Err(WireError::TooLarge(length as usize));
    }

    let mut body = vec![0u8; length as usize - OFP_HEADER_LEN];
    reader.read_exact(&mut body).await?;

    if version != OFP_VERSION && msg_type != OFPT_HELLO {
        return Err(WireError::BadVersion(version));
    }

    let message = Message::decode(msg_type, &body)?;
    Ok((xid, message))
}

/// Encode and write one message.
pub async fn write_message<W>(writer: &mut W, xid: u32, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode(xid)).await?;
    Ok(())
}
