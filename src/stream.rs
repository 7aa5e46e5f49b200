//! Wrapper around raw client connections.
//!
//! One instance represents one client connection. Reads and writes are
//! independently serialized so that a subscription publisher on another
//! thread can write while the connection thread blocks in a read.

use std::fmt::Debug;
use std::io;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A reference counted, internally buffered duplex stream. `new_ref` hands out
/// another handle to the same connection.
pub trait ConnectionStream: Send + Sync + Debug {
  /// Reads some bytes, blocking until at least one is available or EOF.
  fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

  /// Fills the whole buffer or fails.
  fn read_exact(&self, buf: &mut [u8]) -> io::Result<()>;

  /// Reads up to and including `end`, at most `limit` bytes.
  fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize>;

  /// Blocks until at least one byte can be read. False on EOF.
  fn ensure_readable(&self) -> io::Result<bool>;

  /// Bytes that can be read without blocking.
  fn available(&self) -> usize;

  /// Writes the whole buffer.
  fn write_all(&self, buf: &[u8]) -> io::Result<()>;

  /// Flushes buffered writes to the peer.
  fn flush(&self) -> io::Result<()>;

  /// Sets the read timeout for subsequent reads where the transport supports it.
  fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

  /// Sets the write timeout where the transport supports it.
  fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()>;

  /// Address of the peer, transport dependent.
  fn peer_addr(&self) -> io::Result<String>;

  /// Another handle to the same connection.
  fn new_ref(&self) -> Box<dyn ConnectionStream>;
}

/// Conversion of an owned transport connection into a [ConnectionStream].
pub trait IntoConnectionStream {
  /// Performs the conversion.
  fn into_connection_stream(self) -> Box<dyn ConnectionStream>;
}

impl IntoConnectionStream for TcpStream {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    tcp::new(self)
  }
}

impl IntoConnectionStream for Box<dyn ConnectionStream> {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    self
  }
}

impl IntoConnectionStream for (Box<dyn Read + Send>, Box<dyn Write + Send>) {
  fn into_connection_stream(self) -> Box<dyn ConnectionStream> {
    boxed::new(self.0, self.1)
  }
}

mod tcp {
  use crate::stream::ConnectionStream;
  use crate::util::unwrap_poison;
  use std::io;
  use std::net::TcpStream;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;
  use unowned_buf::{UnownedReadBuffer, UnownedWriteBuffer};

  pub fn new(stream: TcpStream) -> Box<dyn ConnectionStream> {
    Box::new(TcpConnection(Arc::new(Inner {
      read_mutex: Mutex::new(UnownedReadBuffer::new()),
      write_mutex: Mutex::new(UnownedWriteBuffer::new()),
      stream,
    })))
  }

  #[derive(Debug, Clone)]
  struct TcpConnection(Arc<Inner>);

  #[derive(Debug)]
  struct Inner {
    read_mutex: Mutex<UnownedReadBuffer<0x4000>>,
    write_mutex: Mutex<UnownedWriteBuffer<0x4000>>,
    stream: TcpStream,
  }

  impl ConnectionStream for TcpConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
      unwrap_poison(self.0.read_mutex.lock())?.read(&mut &self.0.stream, buf)
    }

    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
      unwrap_poison(self.0.read_mutex.lock())?.read_exact(&mut &self.0.stream, buf)
    }

    fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
      unwrap_poison(self.0.read_mutex.lock())?.read_until_limit(&mut &self.0.stream, end, limit, buf)
    }

    fn ensure_readable(&self) -> io::Result<bool> {
      unwrap_poison(self.0.read_mutex.lock())?.ensure_readable(&mut &self.0.stream)
    }

    fn available(&self) -> usize {
      unwrap_poison(self.0.read_mutex.lock()).map(|g| g.available()).unwrap_or_default()
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.write_all(&mut &self.0.stream, buf)
    }

    fn flush(&self) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.flush(&mut &self.0.stream)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
      self.0.stream.set_read_timeout(dur)
    }

    fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
      self.0.stream.set_write_timeout(dur)
    }

    fn peer_addr(&self) -> io::Result<String> {
      Ok(format!("{}", self.0.stream.peer_addr()?))
    }

    fn new_ref(&self) -> Box<dyn ConnectionStream> {
      Box::new(self.clone())
    }
  }
}

mod boxed {
  use crate::stream::ConnectionStream;
  use crate::util::unwrap_poison;
  use std::fmt::{Debug, Formatter};
  use std::io;
  use std::io::{BufWriter, Read, Write};
  use std::ops::DerefMut;
  use std::sync::{Arc, Mutex};
  use std::time::Duration;
  use unowned_buf::UnownedReadBuffer;

  pub fn new(read: Box<dyn Read + Send>, write: Box<dyn Write + Send>) -> Box<dyn ConnectionStream> {
    Box::new(BoxedConnection(Arc::new(Inner {
      read_mutex: Mutex::new((UnownedReadBuffer::default(), read)),
      write_mutex: Mutex::new(BufWriter::new(write)),
    })))
  }

  #[derive(Debug, Clone)]
  struct BoxedConnection(Arc<Inner>);

  struct Inner {
    read_mutex: Mutex<(UnownedReadBuffer<0x4000>, Box<dyn Read + Send>)>,
    write_mutex: Mutex<BufWriter<Box<dyn Write + Send>>>,
  }

  impl Debug for Inner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
      f.write_str("BoxedConnection")
    }
  }

  impl ConnectionStream for BoxedConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read(stream, buf)
    }

    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read_exact(stream, buf)
    }

    fn read_until(&self, end: u8, limit: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.read_until_limit(stream, end, limit, buf)
    }

    fn ensure_readable(&self) -> io::Result<bool> {
      let mut guard = unwrap_poison(self.0.read_mutex.lock())?;
      let (buffer, stream) = guard.deref_mut();
      buffer.ensure_readable(stream)
    }

    fn available(&self) -> usize {
      unwrap_poison(self.0.read_mutex.lock()).map(|g| g.0.available()).unwrap_or_default()
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
      unwrap_poison(self.0.write_mutex.lock())?.flush()
    }

    fn set_read_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
      Ok(())
    }

    fn set_write_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
      Ok(())
    }

    fn peer_addr(&self) -> io::Result<String> {
      Ok("boxed".to_string())
    }

    fn new_ref(&self) -> Box<dyn ConnectionStream> {
      Box::new(self.clone())
    }
  }
}
