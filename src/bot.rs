//! ## Bot
//!
//! The [`Bot`] ties everything together: it connects a [`Session`], parses
//! every chat line into a [`Message`], offers it to each registered
//! [cog][crate::cog], and reports what happened to an [`EventHandler`].
//!
//! ```rust,no_run
//! use cogbot::cog::{Cog, Command};
//! use cogbot::{Bot, BotError, Config, Context, Credentials, Message};
//! use std::sync::Arc;
//!
//! async fn ping(_: Arc<()>, ctx: Context, msg: Message) -> Result<(), BotError> {
//!   ctx.reply(&msg, "pong");
//!   Ok(())
//! }
//!
//! # async fn run() -> Result<(), BotError> {
//! let config = Config::new(Credentials::new("bot", "oauth:token"), "pajlada");
//! Bot::builder(config)
//!   .cog(Cog::builder("!", ()).command(Command::new("ping", ping)).build())
//!   .build()
//!   .run()
//!   .await
//! # }
//! ```
//!
//! Lines are handled one at a time, in the order they arrive. Command handlers
//! and event hooks are awaited inline, so a slow handler delays the lines after it.
//! Work which should run alongside the bot can be registered as a [task][BotBuilder::task].
//!
//! Pressing Ctrl-C stops a running bot gracefully, as if [`Context::shutdown`] was called.

use crate::client::read::RecvError;
use crate::client::write::SendError;
use crate::client::{Config, ConnectError, ReconnectError, Session};
use crate::cog::{CommandGroup, Outcome};
use crate::events::EventHandler;
use crate::irc::Line;
use crate::log::{LogCategory, LogLevel, Logger};
use crate::msg::{Message, ParseError};
use futures_util::future::{try_join_all, BoxFuture};
use std::future::Future;
use tokio::sync::mpsc;

#[cfg(feature = "helix")]
use crate::helix::{Helix, HelixError};
#[cfg(feature = "helix")]
use std::sync::Arc;

/// Requests queued by a [`Context`], executed by the bot's loop in order.
#[derive(Debug)]
pub(crate) enum Request {
  Privmsg {
    text: String,
    reply_to: Option<String>,
  },
  ChangeRoom {
    room: String,
  },
  Exit,
}

/// A handle to the running bot.
///
/// Every command handler and event hook receives one. It is cheap to clone.
#[derive(Clone)]
pub struct Context {
  inner: mpsc::UnboundedSender<Request>,
  is_anon: bool,
  #[cfg(feature = "helix")]
  helix: Option<Arc<Helix>>,
}

static_assert_send!(Context);
static_assert_sync!(Context);

impl Context {
  fn request(&self, request: Request) {
    if self.inner.send(request).is_err() {
      trace!("bot is gone, dropping request");
    }
  }

  /// Whether the bot is logged in anonymously. Anonymous bots can't send messages.
  pub fn is_anon(&self) -> bool {
    self.is_anon
  }

  /// Send a chat message to the current room.
  ///
  /// If the bot is anonymous, this will do nothing.
  pub fn send(&self, text: impl Into<String>) {
    if self.is_anon {
      return;
    }
    self.request(Request::Privmsg {
      text: text.into(),
      reply_to: None,
    });
  }

  /// Reply to `msg` in the current room.
  ///
  /// Falls back to a plain message if `msg` has no id.
  pub fn reply(&self, msg: &Message, text: impl Into<String>) {
    if self.is_anon {
      return;
    }
    self.request(Request::Privmsg {
      text: text.into(),
      reply_to: msg.id().map(String::from),
    });
  }

  /// Leave the current room and join `room` instead.
  pub fn change_room(&self, room: impl Into<String>) {
    self.request(Request::ChangeRoom { room: room.into() });
  }

  /// Stop the bot gracefully once the current line is handled.
  pub fn shutdown(&self) {
    self.request(Request::Exit);
  }

  /// The bot's Helix client, if one was configured.
  #[cfg(feature = "helix")]
  pub fn helix(&self) -> Option<&Helix> {
    self.helix.as_deref()
  }

  /// A context whose requests go to the returned receiver.
  #[cfg(test)]
  pub(crate) fn detached() -> (Context, mpsc::UnboundedReceiver<Request>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let ctx = Context {
      inner: sender,
      is_anon: false,
      #[cfg(feature = "helix")]
      helix: None,
    };
    (ctx, receiver)
  }
}

type Task = Box<dyn FnOnce(Context) -> BoxFuture<'static, Result<(), BotError>> + Send>;

/// Builder for a [`Bot`].
pub struct BotBuilder<E> {
  config: Config,
  events: E,
  cogs: Vec<Box<dyn CommandGroup>>,
  tasks: Vec<Task>,
  #[cfg(feature = "helix")]
  helix: Option<Arc<Helix>>,
}

impl<E: EventHandler> BotBuilder<E> {
  /// Report lifecycle events to `events`.
  pub fn events<E2: EventHandler>(self, events: E2) -> BotBuilder<E2> {
    BotBuilder {
      config: self.config,
      events,
      cogs: self.cogs,
      tasks: self.tasks,
      #[cfg(feature = "helix")]
      helix: self.helix,
    }
  }

  /// Register a cog. Cogs see every message, in the order they were registered.
  pub fn cog(mut self, cog: impl CommandGroup + 'static) -> Self {
    self.cogs.push(Box::new(cog));
    self
  }

  /// Run `task` alongside the bot once it has joined its room.
  ///
  /// If the task fails, the bot stops with its error.
  pub fn task<F, Fut>(mut self, task: F) -> Self
  where
    F: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
  {
    self.tasks.push(Box::new(move |ctx| Box::pin(task(ctx))));
    self
  }

  /// Use `helix` to verify the room on startup, and for follower lookups.
  #[cfg(feature = "helix")]
  pub fn helix(mut self, helix: Helix) -> Self {
    self.helix = Some(Arc::new(helix));
    self
  }

  /// Finish the bot. Fires [`EventHandler::on_ready`].
  pub fn build(self) -> Bot<E> {
    let inner = Inner {
      logger: Logger::new(self.config.log.clone()),
      config: self.config,
      events: self.events,
      cogs: self.cogs,
      #[cfg(feature = "helix")]
      helix: self.helix,
    };
    inner.events.on_ready();
    inner.log(
      LogLevel::Init,
      LogCategory::Init,
      format_args!("bot ready with {} cog(s)", inner.cogs.len()),
    );
    Bot {
      inner,
      tasks: self.tasks,
    }
  }
}

/// A chat bot for a single room.
pub struct Bot<E = ()> {
  inner: Inner<E>,
  tasks: Vec<Task>,
}

/// Everything a running bot needs, apart from its connection.
struct Inner<E> {
  config: Config,
  events: E,
  cogs: Vec<Box<dyn CommandGroup>>,
  logger: Logger,
  #[cfg(feature = "helix")]
  helix: Option<Arc<Helix>>,
}

static_assert_send!(Bot);

impl Bot {
  pub fn builder(config: Config) -> BotBuilder<()> {
    BotBuilder {
      config,
      events: (),
      cogs: Vec::new(),
      tasks: Vec::new(),
      #[cfg(feature = "helix")]
      helix: None,
    }
  }
}

impl<E: EventHandler> Bot<E> {
  /// Connect to the configured room and handle messages until the bot stops.
  ///
  /// Returns `Ok` if the bot was stopped on purpose, see [`Context::shutdown`].
  /// Failing to connect returns immediately, without firing termination events.
  pub async fn run(self) -> Result<(), BotError> {
    let inner = &self.inner;
    inner.events.on_run().await;

    #[cfg(feature = "helix")]
    if let Some(helix) = &inner.helix {
      inner.verify(helix, &inner.config.channel).await?;
    }

    inner.log(
      LogLevel::Init,
      LogCategory::Init,
      format_args!("connecting to {}", inner.config.endpoint),
    );
    let session = match Session::connect(inner.config.clone()).await {
      Ok(session) => session,
      Err(e) => {
        inner.log(LogLevel::Error, LogCategory::Error, &e);
        return Err(e.into());
      }
    };
    self.listen(session).await
  }

  /// Like [`Bot::run`], over an already connected `session`.
  ///
  /// The session joins the configured room first, unless it already joined one.
  pub async fn run_on(self, session: Session) -> Result<(), BotError> {
    self.inner.events.on_run().await;
    self.listen(session).await
  }

  async fn listen(self, session: Session) -> Result<(), BotError> {
    let Bot { inner, tasks } = self;
    let (sender, requests) = mpsc::unbounded_channel();
    let ctx = Context {
      inner: sender,
      is_anon: session.credentials().is_anon(),
      #[cfg(feature = "helix")]
      helix: inner.helix.clone(),
    };

    let tasks = tasks
      .into_iter()
      .map(|task| task(ctx.clone()))
      .collect::<Vec<_>>();
    let background = async move {
      try_join_all(tasks).await?;
      std::future::pending::<Result<(), BotError>>().await
    };

    let mut dispatch = Dispatch {
      bot: inner,
      session,
      ctx,
      requests,
    };

    let result = tokio::select! {
      result = dispatch.start() => result,
      result = background => result,
    };
    dispatch.shutdown(result).await
  }
}

impl<E: EventHandler> Inner<E> {
  fn log(&self, level: LogLevel, category: LogCategory, text: impl std::fmt::Display) {
    self.logger.log(&self.events, level, category, text);
  }

  #[cfg(feature = "helix")]
  async fn verify(&self, helix: &Helix, channel: &str) -> Result<String, BotError> {
    self.log(
      LogLevel::Init,
      LogCategory::Request,
      format_args!("verifying room {channel}"),
    );
    helix.verify(channel).await.map_err(|e| {
      self.log(LogLevel::Error, LogCategory::Error, &e);
      BotError::Helix(e)
    })
  }
}

/// The state of a running bot.
struct Dispatch<E> {
  bot: Inner<E>,
  session: Session,
  ctx: Context,
  requests: mpsc::UnboundedReceiver<Request>,
}

impl<E: EventHandler> Dispatch<E> {
  async fn start(&mut self) -> Result<(), BotError> {
    if self.session.channel().is_none() {
      let channel = self.bot.config.channel.clone();
      self.session.join(&channel).await?;
    }
    self.on_connect().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listen_for_ctrl_c = true;

    loop {
      tokio::task::yield_now().await;

      tokio::select! {
        line = self.session.recv() => {
          self.handle_line(line?).await?;
        }
        Some(request) = self.requests.recv() => {
          self.handle_request(request).await?;
        }
        result = &mut ctrl_c, if listen_for_ctrl_c => match result {
          Ok(()) => {
            self.bot.log(LogLevel::Basic, LogCategory::Basic, "received ctrl-c");
            return Err(BotError::Exit);
          }
          Err(e) => {
            warn!(error = %e, "failed to listen for ctrl-c");
            listen_for_ctrl_c = false;
          }
        },
      }
    }
  }

  async fn on_connect(&mut self) {
    let channel = self.session.channel().unwrap_or_default().to_owned();
    self.bot.log(
      LogLevel::Init,
      LogCategory::Init,
      format_args!("joined #{channel} as {}", self.session.credentials().nick),
    );
    self.bot.events.on_connect(&self.ctx).await;
  }

  async fn handle_line(&mut self, line: String) -> Result<(), BotError> {
    self.bot.log(LogLevel::LowLevel, LogCategory::Recv, &line);

    match Line::classify(&line) {
      Line::Ping(arg) => {
        let arg = if arg.is_empty() { ":tmi.twitch.tv" } else { arg };
        self.session.pong(arg).await?;
        self
          .bot
          .log(LogLevel::LowLevel, LogCategory::Send, format_args!("PONG {arg}"));
      }
      Line::Privmsg => self.handle_privmsg(&line).await?,
      Line::Reconnect => {
        self
          .bot
          .log(LogLevel::Warning, LogCategory::Basic, "server requested a reconnect");
        self.session.reconnect().await?;
        self.on_connect().await;
      }
      Line::Notice(text) => self.bot.log(LogLevel::Warning, LogCategory::Incoming, text),
      Line::Other => {}
    }
    Ok(())
  }

  async fn handle_privmsg(&mut self, line: &str) -> Result<(), BotError> {
    let channel = self
      .session
      .channel()
      .unwrap_or(self.bot.config.channel.as_str())
      .to_owned();
    let mut msg = Message::parse(channel, line)?;

    #[cfg(feature = "helix")]
    self.lookup_follower(&mut msg).await?;

    self.bot.logger.incoming(&self.bot.events, &msg);
    self.bot.events.on_message(&self.ctx, &msg).await;

    let mut outcome = Outcome::NotAddressed;
    for cog in &self.bot.cogs {
      let result = cog.resolve(&self.ctx, &mut msg).await?;
      if result > Outcome::NotAddressed {
        trace!(cog = cog.name(), ?result, "resolved");
      }
      outcome = outcome.combine(result);
    }

    let events = &self.bot.events;
    match outcome {
      Outcome::Executed => events.on_command_executed(&self.ctx, &msg).await,
      Outcome::AddressedNoMatch => events.on_command_not_found(&self.ctx, &msg).await,
      Outcome::NotAddressed => events.on_not_addressed(&self.ctx, &msg).await,
    }
    Ok(())
  }

  #[cfg(feature = "helix")]
  async fn lookup_follower(&mut self, msg: &mut Message) -> Result<(), BotError> {
    if !self.bot.config.lookup_followers {
      return Ok(());
    }
    let room_id = msg.tag(crate::irc::Tag::RoomId);
    let (Some(helix), Some(broadcaster_id)) = (&self.bot.helix, room_id) else {
      return Ok(());
    };

    self.bot.log(
      LogLevel::LowLevel,
      LogCategory::Request,
      format_args!("follow lookup for {}", msg.sender().name()),
    );
    let follows = helix.follows(broadcaster_id, msg.sender().id()).await?;
    msg.set_follows_broadcaster(follows);
    Ok(())
  }

  async fn handle_request(&mut self, request: Request) -> Result<(), BotError> {
    match request {
      Request::Privmsg { text, reply_to } => self.privmsg(text, reply_to).await,
      Request::ChangeRoom { room } => {
        #[cfg(feature = "helix")]
        if let Some(helix) = self.bot.helix.clone() {
          self.bot.verify(&helix, &room).await?;
        }
        self.bot.log(
          LogLevel::Init,
          LogCategory::Init,
          format_args!("changing room to {room}"),
        );
        self.session.change_room(&room).await?;
        self.on_connect().await;
        Ok(())
      }
      Request::Exit => Err(BotError::Exit),
    }
  }

  async fn privmsg(&mut self, text: String, reply_to: Option<String>) -> Result<(), BotError> {
    match &reply_to {
      Some(parent_id) => self.session.reply(parent_id, &text).await?,
      None => self.session.send(&text).await?,
    }
    let channel = self.session.channel().unwrap_or_default();
    self.bot.logger.outgoing(
      &self.bot.events,
      &self.bot.config.credentials.nick,
      &text,
      channel,
    );
    Ok(())
  }

  async fn shutdown(mut self, result: Result<(), BotError>) -> Result<(), BotError> {
    let result = match result {
      Ok(()) | Err(BotError::Exit) => Ok(()),
      Err(e) => Err(e),
    };

    match &result {
      Ok(()) => {
        self
          .bot
          .log(LogLevel::Basic, LogCategory::Basic, "shutting down");
        self.bot.events.on_graceful_termination(&self.ctx).await;
      }
      Err(e) => {
        error!(error = %e, "bot terminated unexpectedly");
        self.bot.log(LogLevel::Error, LogCategory::Error, e);
        self.bot.events.on_unexpected_termination(&self.ctx, e).await;
      }
    }
    self.bot.events.on_terminated(&self.ctx).await;

    self.flush().await;
    self.session.disconnect().await;
    result
  }

  /// Send whatever was queued before the bot stopped.
  async fn flush(&mut self) {
    while let Ok(request) = self.requests.try_recv() {
      let Request::Privmsg { text, reply_to } = request else {
        continue;
      };
      if let Err(e) = self.privmsg(text, reply_to).await {
        debug!(error = %e, "failed to flush message");
        break;
      }
    }
  }
}

#[derive(Debug)]
pub enum BotError {
  Send(SendError),
  Recv(RecvError),
  Parse(ParseError),
  Connect(ConnectError),
  Reconnect(ReconnectError),
  #[cfg(feature = "helix")]
  Helix(HelixError),

  /// A command handler or task failed.
  Handler(Box<dyn std::error::Error + Send + Sync>),

  /// Stop the bot gracefully.
  ///
  /// Return this from a command handler or task to stop the bot
  /// as if [`Context::shutdown`] was called.
  Exit,

  /// The arguments did not fit the command.
  ///
  /// Return this from a command handler to let the next matching
  /// command try instead.
  BadArguments,
}

impl BotError {
  /// Wrap an arbitrary error from a command handler or task.
  pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    BotError::Handler(err.into())
  }
}

impl From<SendError> for BotError {
  fn from(err: SendError) -> Self {
    BotError::Send(err)
  }
}

impl From<RecvError> for BotError {
  fn from(err: RecvError) -> Self {
    BotError::Recv(err)
  }
}

impl From<ParseError> for BotError {
  fn from(err: ParseError) -> Self {
    BotError::Parse(err)
  }
}

impl From<ConnectError> for BotError {
  fn from(err: ConnectError) -> Self {
    BotError::Connect(err)
  }
}

impl From<ReconnectError> for BotError {
  fn from(err: ReconnectError) -> Self {
    BotError::Reconnect(err)
  }
}

#[cfg(feature = "helix")]
impl From<HelixError> for BotError {
  fn from(err: HelixError) -> Self {
    BotError::Helix(err)
  }
}

impl std::error::Error for BotError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      BotError::Send(err) => Some(err),
      BotError::Recv(err) => Some(err),
      BotError::Parse(err) => Some(err),
      BotError::Connect(err) => Some(err),
      BotError::Reconnect(err) => Some(err),
      #[cfg(feature = "helix")]
      BotError::Helix(err) => Some(err),
      BotError::Handler(err) => Some(err.as_ref()),
      BotError::Exit | BotError::BadArguments => None,
    }
  }
}

impl std::fmt::Display for BotError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BotError::Send(err) => write!(f, "{err}"),
      BotError::Recv(err) => write!(f, "{err}"),
      BotError::Parse(err) => write!(f, "{err}"),
      BotError::Connect(err) => write!(f, "{err}"),
      BotError::Reconnect(err) => write!(f, "{err}"),
      #[cfg(feature = "helix")]
      BotError::Helix(err) => write!(f, "{err}"),
      BotError::Handler(err) => write!(f, "handler failed: {err}"),
      BotError::Exit => write!(f, "bot exited"),
      BotError::BadArguments => write!(f, "bad command arguments"),
    }
  }
}
