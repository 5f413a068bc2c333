use super::Session;
use std::borrow::Cow;
use std::fmt::Display;
use tokio::io;

impl Session {
  /// Send a chat message to the joined room.
  ///
  /// Line breaks in `text` are replaced with spaces.
  pub async fn send(&mut self, text: &str) -> Result<(), SendError> {
    let channel = self.joined()?;
    let text = single_line(text);
    write_line!(self, "PRIVMSG #{channel} :{text}")?;
    Ok(())
  }

  /// Send a chat message to the joined room, as a reply to the message with id `parent_id`.
  pub async fn reply(&mut self, parent_id: &str, text: &str) -> Result<(), SendError> {
    let channel = self.joined()?;
    let text = single_line(text);
    write_line!(
      self,
      "@reply-parent-msg-id={parent_id} PRIVMSG #{channel} :{text}"
    )?;
    Ok(())
  }

  /// Answer a `PING`. `arg` is echoed back as-is.
  pub async fn pong(&mut self, arg: &str) -> Result<(), SendError> {
    self.ensure_connected()?;
    write_line!(self, "PONG {arg}")?;
    Ok(())
  }

  /// Write a raw protocol line. The line ending is added.
  pub async fn send_raw(&mut self, line: &str) -> Result<(), SendError> {
    self.ensure_connected()?;
    write_line!(self, "{line}")?;
    Ok(())
  }

  fn joined(&self) -> Result<String, SendError> {
    self.ensure_connected()?;
    self
      .channel
      .clone()
      .ok_or(SendError::NotJoined)
  }
}

fn single_line(text: &str) -> Cow<'_, str> {
  match text.contains(['\r', '\n']) {
    true => Cow::Owned(text.replace(['\r', '\n'], " ")),
    false => Cow::Borrowed(text),
  }
}

/// Failed to send a line.
#[derive(Debug)]
pub enum SendError {
  /// The underlying I/O operation failed.
  Io(io::Error),

  /// The session is disconnected.
  Disconnected,

  /// The session has not joined a room yet.
  NotJoined,
}

impl From<io::Error> for SendError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl Display for SendError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SendError::Io(e) => write!(f, "failed to write message: {e}"),
      SendError::Disconnected => write!(f, "failed to write message: disconnected"),
      SendError::NotJoined => write!(f, "failed to write message: no room joined"),
    }
  }
}

impl std::error::Error for SendError {}
