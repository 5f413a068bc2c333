//! ## Chat session
//!
//! The entrypoint to this module is the [`Session`], which owns the single
//! connection to the chat server and tracks where it is in its lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Joining -> Listening -> Disconnected
//!                     ^                                          |
//!                     '-------------- ChangingRoom <-------------'
//! ```
//!
//! [`Session::connect`] opens the connection and authenticates,
//! [`Session::join`] enters a room, after which lines can be read
//! using [`Session::recv`] and chat messages sent using [`Session::send`].
//!
//! Generating an oauth2 token is out of scope for this library.
//! Head over to the [official documentation](https://dev.twitch.tv/docs/irc/authenticate-bot/#getting-an-access-token)
//! to see how you can generate one.
//!
//! ⚠ Note: the session does not rate limit anything.

#[macro_use]
mod macros;

pub mod conn;
pub mod read;
pub mod util;
pub mod write;

use self::conn::{BoxedRead, BoxedWrite, Endpoint, OpenStreamError, TlsConfig, TlsConfigError};
use self::read::{ReadStream, RecvError};
use self::write::SendError;
use crate::irc::Line;
use crate::log::LogConfig;
use rand::{thread_rng, Rng};
use std::fmt::Display;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub use self::util::{Backoff, DEFAULT_BACKOFF};
use self::util::Timeout;

/// Credentials used to authenticate to Twitch IRC.
///
/// The [`Default`] impl uses [`Credentials::anon`].
#[derive(Clone)]
pub struct Credentials {
  /// The _login_ of the user.
  pub nick: String,

  /// The oauth2 token, in the form `oauth:<token>`.
  pub pass: String,
}

impl Credentials {
  const ANON_RANGE: std::ops::Range<u32> = 10000..99999;

  pub fn new(nick: impl ToString, pass: impl ToString) -> Self {
    Self {
      nick: nick.to_string(),
      pass: pass.to_string(),
    }
  }

  /// An anonymous login.
  ///
  /// Twitch allows logging in using any username in the form `justinfan?????`
  /// where `?` is any digit. Anonymous users can read chat, but not send messages.
  pub fn anon() -> Self {
    Self {
      pass: "SCHMOOPIIE".into(),
      nick: format!("justinfan{}", thread_rng().gen_range(Self::ANON_RANGE)),
    }
  }

  pub fn is_anon(&self) -> bool {
    let Some(digits) = self.nick.strip_prefix("justinfan") else {
      return false;
    };
    let Ok(digits) = digits.parse::<u32>() else {
      return false;
    };
    Self::ANON_RANGE.contains(&digits)
  }
}

impl Default for Credentials {
  fn default() -> Self {
    Self::anon()
  }
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("nick", &self.nick)
      .finish_non_exhaustive()
  }
}

/// The default timeout used when connecting.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to start a bot.
#[derive(Clone, Debug)]
pub struct Config {
  /// Credentials to use when logging in.
  pub credentials: Credentials,

  /// The room to join, without the leading `#`.
  pub channel: String,

  pub endpoint: Endpoint,

  /// Bound on opening the connection and authenticating.
  pub timeout: Duration,

  /// Used when the server asks us to reconnect.
  pub backoff: Backoff,

  /// Look up whether each sender follows the broadcaster before dispatching their message.
  ///
  /// Requires a Helix client on the bot.
  pub lookup_followers: bool,

  pub log: LogConfig,
}

impl Config {
  /// Log in with `credentials` and join `channel`, using the defaults for everything else.
  pub fn new(credentials: Credentials, channel: impl Into<String>) -> Self {
    Self {
      credentials,
      channel: normalize_channel(&channel.into()),
      endpoint: Endpoint::default(),
      timeout: DEFAULT_TIMEOUT,
      backoff: DEFAULT_BACKOFF,
      lookup_followers: false,
      log: LogConfig::default(),
    }
  }

  pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
    self.endpoint = endpoint;
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn backoff(mut self, backoff: Backoff) -> Self {
    self.backoff = backoff;
    self
  }

  pub fn lookup_followers(mut self, enabled: bool) -> Self {
    self.lookup_followers = enabled;
    self
  }

  pub fn log(mut self, log: LogConfig) -> Self {
    self.log = log;
    self
  }
}

/// `#Forsen` -> `forsen`
fn normalize_channel(channel: &str) -> String {
  channel.trim().trim_start_matches('#').to_ascii_lowercase()
}

/// Where a [`Session`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
  Disconnected,

  /// Opening the transport.
  Connecting,

  /// Waiting for the server to accept the credentials.
  Authenticating,

  /// Authenticated, but not in a room yet.
  Joining,

  /// In a room, reading lines.
  Listening,

  /// Leaving the current room for another one.
  ChangingRoom,
}

/// The connection to one chat room.
pub struct Session {
  reader: ReadStream,
  writer: BoxedWrite,

  scratch: String,
  tls: Option<TlsConfig>,
  config: Config,
  channel: Option<String>,
  state: State,
}

impl Session {
  /// Open a connection to the configured endpoint and authenticate.
  ///
  /// The whole attempt is bounded by the configured timeout.
  pub async fn connect(config: Config) -> Result<Session, ConnectError> {
    let timeout = config.timeout;
    async move {
      trace!(endpoint = %config.endpoint, "connecting");
      let tls = load_tls(&config.endpoint)?;
      let (reader, writer) = conn::open(&config.endpoint, tls.as_ref()).await?;
      let mut session = Session::new(config, tls, reader, writer);
      session.handshake().await?;
      Ok::<_, ConnectError>(session)
    }
    .timeout(timeout)
    .await?
  }

  /// Authenticate over an already open `stream`.
  ///
  /// Reconnects and room changes still go through the configured endpoint.
  pub async fn connect_over<S>(config: Config, stream: S) -> Result<Session, ConnectError>
  where
    S: AsyncRead + AsyncWrite + Send + 'static,
  {
    let timeout = config.timeout;
    let (reader, writer) = conn::split(stream);
    let mut session = Session::new(config, None, reader, writer);
    session.handshake().timeout(timeout).await??;
    Ok(session)
  }

  fn new(config: Config, tls: Option<TlsConfig>, reader: BoxedRead, writer: BoxedWrite) -> Self {
    Session {
      reader: read::lines(reader),
      writer,
      scratch: String::with_capacity(1024),
      tls,
      config,
      channel: None,
      state: State::Connecting,
    }
  }

  async fn handshake(&mut self) -> Result<(), ConnectError> {
    self.state = State::Authenticating;
    let Credentials { nick, pass } = self.config.credentials.clone();

    const CAP: &str = "twitch.tv/tags twitch.tv/commands twitch.tv/membership";
    trace!("CAP REQ {CAP:?}; PASS ***; NICK {nick:?}");
    write_line!(self, "CAP REQ :{CAP}")?;
    write_line!(self, "PASS {pass}")?;
    write_line!(self, "NICK {nick}")?;

    for _ in 0..2 {
      let line = self.recv().await?;
      match Line::classify(&line) {
        Line::Notice(text) if text.contains("Improperly formatted auth") => {
          trace!("malformed token");
          return Err(ConnectError::BadAuthFormat);
        }
        Line::Notice(text) if text.contains("Login authentication failed") => {
          trace!("invalid credentials");
          return Err(ConnectError::InvalidAuth);
        }
        Line::Notice(text) => warn!(notice = text, "unexpected notice during handshake"),
        _ => trace!(line = %line, "handshake response"),
      }
    }

    trace!("authenticated");
    self.state = State::Joining;
    Ok(())
  }

  /// Join `room`.
  ///
  /// The server never acknowledges a join, so this only fails if the write does.
  pub async fn join(&mut self, room: &str) -> Result<(), SendError> {
    self.ensure_connected()?;
    self.state = State::Joining;
    let room = normalize_channel(room);
    trace!(%room, "joining");
    write_line!(self, "JOIN #{room}")?;
    self.channel = Some(room);
    self.state = State::Listening;
    Ok(())
  }

  /// Leave the current room for `room`.
  ///
  /// The connection is closed and reopened against the configured endpoint.
  pub async fn change_room(&mut self, room: &str) -> Result<(), ConnectError> {
    trace!(from = ?self.channel, to = room, "changing room");
    self.state = State::ChangingRoom;
    self.close().await;
    self.reopen().await?;
    self.join(room).await?;
    Ok(())
  }

  /// Reconnect with backoff, then rejoin the current room.
  pub async fn reconnect(&mut self) -> Result<(), ReconnectError> {
    trace!("reconnecting");
    self.close().await;

    let mut cause = ConnectError::Timeout;
    for delay in self.config.backoff.delays() {
      tokio::time::sleep(delay).await;

      if let Err(e) = self.reopen().await {
        if e.should_retry() {
          debug!(error = %e, "reconnect attempt failed");
          cause = e;
          continue;
        }
        self.state = State::Disconnected;
        return Err(e.into());
      }

      if let Some(room) = self.channel.clone() {
        self.join(&room).await?;
      }
      return Ok(());
    }

    self.state = State::Disconnected;
    Err(ReconnectError { cause })
  }

  async fn reopen(&mut self) -> Result<(), ConnectError> {
    self.state = State::Connecting;
    let timeout = self.config.timeout;
    async {
      if self.tls.is_none() {
        self.tls = load_tls(&self.config.endpoint)?;
      }
      let (reader, writer) = conn::open(&self.config.endpoint, self.tls.as_ref()).await?;
      self.reader = read::lines(reader);
      self.writer = writer;
      self.handshake().await
    }
    .timeout(timeout)
    .await?
  }

  /// Shut the connection down. Does nothing if already disconnected.
  pub async fn disconnect(&mut self) {
    if self.state == State::Disconnected {
      return;
    }
    trace!("disconnecting");
    self.close().await;
    self.state = State::Disconnected;
  }

  async fn close(&mut self) {
    if let Err(e) = self.writer.shutdown().await {
      trace!(error = %e, "failed to shut down writer");
    }
    self.reader = read::lines(Box::new(tokio::io::empty()));
    self.writer = Box::new(tokio::io::sink());
  }

  fn ensure_connected(&self) -> Result<(), SendError> {
    match self.state {
      State::Disconnected => Err(SendError::Disconnected),
      _ => Ok(()),
    }
  }
}

impl Session {
  #[inline]
  pub fn state(&self) -> State {
    self.state
  }

  /// The joined room, if any.
  #[inline]
  pub fn channel(&self) -> Option<&str> {
    self.channel.as_deref()
  }

  #[inline]
  pub fn config(&self) -> &Config {
    &self.config
  }

  #[inline]
  pub fn credentials(&self) -> &Credentials {
    &self.config.credentials
  }
}

fn load_tls(endpoint: &Endpoint) -> Result<Option<TlsConfig>, TlsConfigError> {
  match endpoint.tls {
    true => TlsConfig::load(&endpoint.host).map(Some),
    false => Ok(None),
  }
}

/// An error which occurred while attempting to reconnect.
#[derive(Debug)]
pub struct ReconnectError {
  /// The last encountered error.
  pub cause: ConnectError,
}

impl Display for ReconnectError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "all reconnect attempts failed. last error was: {}",
      self.cause
    )
  }
}

impl std::error::Error for ReconnectError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.cause)
  }
}

impl<T: Into<ConnectError>> From<T> for ReconnectError {
  fn from(cause: T) -> Self {
    Self {
      cause: cause.into(),
    }
  }
}

/// An error which occurred while attempting to connect.
#[derive(Debug)]
pub enum ConnectError {
  /// Failed to read from the stream.
  Read(RecvError),

  /// Failed to write to the stream.
  Write(SendError),

  /// Failed to perform an IO operation on the stream.
  Io(io::Error),

  /// Failed to set up TLS.
  Tls(TlsConfigError),

  /// Failed to open a connection.
  Open(OpenStreamError),

  /// Connection timed out.
  Timeout,

  /// The server rejected the shape of the token, e.g. a missing `oauth:` prefix.
  BadAuthFormat,

  /// The server rejected the credentials.
  InvalidAuth,
}

impl ConnectError {
  fn should_retry(&self) -> bool {
    matches!(
      self,
      Self::Open(OpenStreamError::Io(_))
        | Self::Io(_)
        | Self::Timeout
        | Self::Read(RecvError::Io(_) | RecvError::StreamClosed)
        | Self::Write(SendError::Io(_))
    )
  }
}

impl From<RecvError> for ConnectError {
  fn from(value: RecvError) -> Self {
    Self::Read(value)
  }
}

impl From<SendError> for ConnectError {
  fn from(value: SendError) -> Self {
    Self::Write(value)
  }
}

impl From<io::Error> for ConnectError {
  fn from(value: io::Error) -> Self {
    Self::Io(value)
  }
}

impl From<TlsConfigError> for ConnectError {
  fn from(value: TlsConfigError) -> Self {
    Self::Tls(value)
  }
}

impl From<OpenStreamError> for ConnectError {
  fn from(value: OpenStreamError) -> Self {
    Self::Open(value)
  }
}

impl From<tokio::time::error::Elapsed> for ConnectError {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::Timeout
  }
}

impl Display for ConnectError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConnectError::Read(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Write(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Io(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Tls(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Open(e) => write!(f, "failed to connect: {e}"),
      ConnectError::Timeout => write!(f, "failed to connect: connection timed out"),
      ConnectError::BadAuthFormat => write!(f, "failed to connect: improperly formatted auth"),
      ConnectError::InvalidAuth => write!(f, "failed to connect: invalid credentials"),
    }
  }
}

impl std::error::Error for ConnectError {}

static_assert_send!(Session);
