use super::conn::BoxedRead;
use super::Session;
use futures_util::stream::Fuse;
use std::fmt::Display;
use tokio::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

pub type ReadStream = Fuse<LinesStream<BufReader<BoxedRead>>>;

pub(super) fn lines(reader: BoxedRead) -> ReadStream {
  futures_util::StreamExt::fuse(LinesStream::new(BufReader::new(reader).lines()))
}

impl Session {
  /// Read the next line from the connection, without its line ending.
  pub async fn recv(&mut self) -> Result<String, RecvError> {
    match self.reader.next().await {
      Some(line) => Ok(line?),
      None => Err(RecvError::StreamClosed),
    }
  }
}

/// Failed to receive a line.
#[derive(Debug)]
pub enum RecvError {
  /// The underlying I/O operation failed.
  Io(io::Error),

  /// The stream was closed.
  StreamClosed,
}

impl RecvError {
  /// Returns `true` if this `recv` failed due to a disconnect of some kind.
  pub fn is_disconnect(&self) -> bool {
    match self {
      RecvError::StreamClosed => true,
      RecvError::Io(e) => matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
          | io::ErrorKind::ConnectionAborted
          | io::ErrorKind::ConnectionReset
          | io::ErrorKind::TimedOut
      ),
    }
  }
}

impl From<io::Error> for RecvError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl Display for RecvError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RecvError::Io(e) => write!(f, "failed to read message: {e}"),
      RecvError::StreamClosed => write!(f, "failed to read message: stream closed"),
    }
  }
}

impl std::error::Error for RecvError {}
