//! WebSocket frames as specified in [RFC 6455 Section 5](https://datatracker.ietf.org/doc/html/rfc6455#section-5).

use crate::courier_error::{CourierResult, ProtocolError};
use crate::stream::ConnectionStream;
use std::convert::TryFrom;

/// One frame of WebSocket data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub(crate) fin: bool,
  pub(crate) opcode: Opcode,
  pub(crate) payload: Vec<u8>,
}

/// The type of a WebSocket frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Opcode {
  Continuation = 0x0,
  Text = 0x1,
  Binary = 0x2,
  Close = 0x8,
  Ping = 0x9,
  Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
  type Error = ProtocolError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x0 => Ok(Self::Continuation),
      0x1 => Ok(Self::Text),
      0x2 => Ok(Self::Binary),
      0x8 => Ok(Self::Close),
      0x9 => Ok(Self::Ping),
      0xA => Ok(Self::Pong),
      other => Err(ProtocolError::InvalidWebSocketOpcode(other)),
    }
  }
}

impl Frame {
  /// A final, unmasked frame, the only kind the server sends.
  pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
    Self { fin: true, opcode, payload }
  }

  /// Reads one frame, blocking until it is complete. Masked payloads are
  /// unmasked on the way in.
  pub fn from_stream(stream: &dyn ConnectionStream) -> CourierResult<Self> {
    let mut header: [u8; 2] = [0; 2];
    stream.read_exact(&mut header)?;

    let fin = header[0] & 0x80 != 0;
    let opcode = Opcode::try_from(header[0] & 0xF)?;
    let mask = header[1] & 0x80 != 0;

    let mut length: u64 = (header[1] & 0x7F) as u64;
    if length == 126 {
      stream.read_exact(&mut header)?;
      length = u16::from_be_bytes(header) as u64;
    } else if length == 127 {
      let mut buf: [u8; 8] = [0; 8];
      stream.read_exact(&mut buf)?;
      length = u64::from_be_bytes(buf);
    }

    let masking_key = {
      let mut buf: [u8; 4] = [0; 4];
      if mask {
        stream.read_exact(&mut buf)?;
      }
      buf
    };

    let mut payload: Vec<u8> = vec![0; length as usize];
    stream.read_exact(payload.as_mut_slice())?;
    payload.iter_mut().enumerate().for_each(|(i, byte)| *byte ^= masking_key[i % 4]);

    Ok(Self { fin, opcode, payload })
  }

  /// The network bytes of this frame, without masking.
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::with_capacity(self.payload.len() + 10);
    buf.push((self.fin as u8) << 7 | self.opcode as u8);

    let length = self.payload.len() as u64;
    if length < 126 {
      buf.push(length as u8);
    } else if length < 65536 {
      buf.push(126);
      buf.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
      buf.push(127);
      buf.extend_from_slice(&length.to_be_bytes());
    }

    buf.extend_from_slice(self.payload.as_slice());
    buf
  }

  /// Writes the frame to the stream in one buffered flush.
  pub fn write_to(&self, stream: &dyn ConnectionStream) -> CourierResult<()> {
    stream.write_all(self.to_bytes().as_slice())?;
    stream.flush()?;
    Ok(())
  }
}
