//! ## Lifecycle events
//!
//! Implement [`EventHandler`] to observe what the bot is doing. Every method
//! has a default no-op implementation, so only override the ones you need:
//!
//! ```rust,no_run
//! use cogbot::events::EventHandler;
//! use cogbot::{Context, Message};
//!
//! struct Greeter;
//!
//! impl EventHandler for Greeter {
//!   async fn on_connect(&self, ctx: &Context) {
//!     ctx.send("HeyGuys");
//!   }
//!
//!   async fn on_command_not_found(&self, ctx: &Context, msg: &Message) {
//!     ctx.reply(msg, "unknown command");
//!   }
//! }
//! ```
//!
//! Hooks run inline on the bot's loop, one at a time, in the order the
//! events happen. A slow hook delays everything after it.

use crate::bot::{BotError, Context};
use crate::log::LogRecord;
use crate::msg::Message;
use std::future::Future;

pub trait EventHandler: Send + Sync + 'static {
  /// The bot was built.
  fn on_ready(&self) {}

  /// The bot was started, before connecting.
  fn on_run(&self) -> impl Future<Output = ()> + Send {
    async {}
  }

  /// The bot joined a room. Fires again after a reconnect or room change.
  fn on_connect(&self, ctx: &Context) -> impl Future<Output = ()> + Send {
    let _ = ctx;
    async {}
  }

  /// A chat message was received, before any command runs.
  fn on_message(&self, ctx: &Context, msg: &Message) -> impl Future<Output = ()> + Send {
    let _ = (ctx, msg);
    async {}
  }

  /// A command ran for `msg`.
  fn on_command_executed(&self, ctx: &Context, msg: &Message) -> impl Future<Output = ()> + Send {
    let _ = (ctx, msg);
    async {}
  }

  /// `msg` was addressed to a cog, but no command could run.
  fn on_command_not_found(
    &self,
    ctx: &Context,
    msg: &Message,
  ) -> impl Future<Output = ()> + Send {
    let _ = (ctx, msg);
    async {}
  }

  /// `msg` was not addressed to any cog.
  fn on_not_addressed(&self, ctx: &Context, msg: &Message) -> impl Future<Output = ()> + Send {
    let _ = (ctx, msg);
    async {}
  }

  /// The bot stopped because of `error`.
  fn on_unexpected_termination(
    &self,
    ctx: &Context,
    error: &BotError,
  ) -> impl Future<Output = ()> + Send {
    let _ = (ctx, error);
    async {}
  }

  /// The bot was asked to stop.
  fn on_graceful_termination(&self, ctx: &Context) -> impl Future<Output = ()> + Send {
    let _ = ctx;
    async {}
  }

  /// The bot stopped, for any reason.
  ///
  /// Messages sent from here are still delivered before disconnecting.
  fn on_terminated(&self, ctx: &Context) -> impl Future<Output = ()> + Send {
    let _ = ctx;
    async {}
  }

  /// A log record passed the bot's [`LogConfig`][crate::log::LogConfig].
  fn on_log(&self, record: &LogRecord) {
    let _ = record;
  }
}

/// Ignores every event.
impl EventHandler for () {}
