//! ## Bot logging
//!
//! Everything the bot does is reported through a [`Logger`], which filters
//! records by [`LogLevel`] and [`LogCategory`] according to a [`LogConfig`].
//! Accepted records are emitted as `tracing` events, and handed to
//! [`EventHandler::on_log`][crate::events::EventHandler::on_log].
//!
//! ```rust
//! use cogbot::log::{ChatFormat, LogCategory, LogConfig, LogLevel};
//!
//! let config = LogConfig::default()
//!   .level(LogLevel::Message)
//!   .categories([LogCategory::Incoming, LogCategory::Outgoing])
//!   .chat_format(ChatFormat::new("[#{channel}] {name}: {text}"));
//! assert!(config.accepts(LogLevel::Message, LogCategory::Incoming));
//! assert!(!config.accepts(LogLevel::Message, LogCategory::Request));
//! ```

use crate::events::EventHandler;
use crate::msg::Message;
use std::collections::HashSet;
use std::fmt::Display;

/// Severity of a log record, from least to most severe.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
  /// Raw protocol traffic.
  LowLevel,

  /// Startup and connection progress.
  Init,

  /// General bot activity.
  #[default]
  Basic,

  /// Chat lines, incoming and outgoing.
  Message,

  Warning,

  Error,
}

/// What part of the bot a log record is about.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogCategory {
  Init,
  Basic,
  /// Chat lines received.
  Incoming,
  /// Chat lines sent.
  Outgoing,
  /// Raw lines written to the connection.
  Send,
  /// Raw lines read from the connection.
  Recv,
  /// Helix requests.
  Request,
  Error,
}

impl LogCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogCategory::Init => "init",
      LogCategory::Basic => "basic",
      LogCategory::Incoming => "incoming",
      LogCategory::Outgoing => "outgoing",
      LogCategory::Send => "send",
      LogCategory::Recv => "recv",
      LogCategory::Request => "request",
      LogCategory::Error => "error",
    }
  }
}

impl Display for LogCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Template used to render chat lines.
///
/// `{name}`, `{text}` and `{channel}` are replaced by the sender's display name,
/// the message text and the room. Anything else is copied as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatFormat(String);

impl ChatFormat {
  pub fn new(template: impl Into<String>) -> Self {
    Self(template.into())
  }

  pub fn render(&self, name: &str, text: &str, channel: &str) -> String {
    let mut out = String::with_capacity(self.0.len() + name.len() + text.len());
    let mut rest = self.0.as_str();
    while let Some(start) = rest.find('{') {
      out.push_str(&rest[..start]);
      rest = &rest[start..];

      let placeholder = [("{name}", name), ("{text}", text), ("{channel}", channel)]
        .into_iter()
        .find(|(key, _)| rest.starts_with(key));
      match placeholder {
        Some((key, value)) => {
          out.push_str(value);
          rest = &rest[key.len()..];
        }
        None => {
          out.push('{');
          rest = &rest[1..];
        }
      }
    }
    out.push_str(rest);
    out
  }
}

impl Default for ChatFormat {
  fn default() -> Self {
    Self::new("{name}: {text}")
  }
}

/// Which records the bot logs, and how chat lines look.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogConfig {
  /// Records below this level are dropped.
  pub level: LogLevel,

  /// If set, only records in these categories are kept.
  pub categories: Option<HashSet<LogCategory>>,

  pub chat_format: ChatFormat,
}

impl LogConfig {
  /// Set the minimum level.
  pub fn level(mut self, level: LogLevel) -> Self {
    self.level = level;
    self
  }

  /// Only keep records in `categories`.
  pub fn categories(mut self, categories: impl IntoIterator<Item = LogCategory>) -> Self {
    self.categories = Some(categories.into_iter().collect());
    self
  }

  /// Set the chat line template.
  pub fn chat_format(mut self, format: ChatFormat) -> Self {
    self.chat_format = format;
    self
  }

  /// Whether a record with `level` and `category` should be logged.
  pub fn accepts(&self, level: LogLevel, category: LogCategory) -> bool {
    level >= self.level
      && self
        .categories
        .as_ref()
        .map_or(true, |categories| categories.contains(&category))
  }
}

/// One accepted log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
  pub level: LogLevel,
  pub category: LogCategory,
  pub text: String,
}

/// Filters records and sends them to `tracing` and the bot's event handler.
#[derive(Clone, Debug, Default)]
pub struct Logger {
  config: LogConfig,
}

impl Logger {
  pub fn new(config: LogConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &LogConfig {
    &self.config
  }

  /// Log `text`, if `level` and `category` are accepted.
  pub fn log<E: EventHandler>(
    &self,
    events: &E,
    level: LogLevel,
    category: LogCategory,
    text: impl Display,
  ) {
    if !self.config.accepts(level, category) {
      return;
    }

    let record = LogRecord {
      level,
      category,
      text: text.to_string(),
    };
    let text = record.text.as_str();
    match level {
      LogLevel::LowLevel => trace!(%category, "{text}"),
      LogLevel::Init | LogLevel::Basic => debug!(%category, "{text}"),
      LogLevel::Message => info!(%category, "{text}"),
      LogLevel::Warning => warn!(%category, "{text}"),
      LogLevel::Error => error!(%category, "{text}"),
    }
    events.on_log(&record);
  }

  /// Log a chat message received in the room.
  pub fn incoming<E: EventHandler>(&self, events: &E, msg: &Message) {
    if self.config.accepts(LogLevel::Message, LogCategory::Incoming) {
      let line = self
        .config
        .chat_format
        .render(msg.sender().name(), msg.text(), msg.channel());
      self.log(events, LogLevel::Message, LogCategory::Incoming, line);
    }
  }

  /// Log a chat message sent by the bot.
  pub fn outgoing<E: EventHandler>(&self, events: &E, nick: &str, text: &str, channel: &str) {
    if self.config.accepts(LogLevel::Message, LogCategory::Outgoing) {
      let line = self.config.chat_format.render(nick, text, channel);
      self.log(events, LogLevel::Message, LogCategory::Outgoing, line);
    }
  }
}
