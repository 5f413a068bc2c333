//! ## Command cogs
//!
//! A [`Cog`] is a group of [`Command`]s sharing one prefix and one piece of owner state.
//! Cogs are built once, up front, and registered on a [`Bot`][crate::bot::Bot]:
//!
//! ```rust,no_run
//! use cogbot::cog::{Arity, Cog, Command, Permission};
//! use cogbot::{BotError, Context, Message};
//! use std::sync::Arc;
//!
//! struct Greeter {
//!   greeting: String,
//! }
//!
//! async fn hello(this: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
//!   ctx.send(format!("{} {}", this.greeting, msg.sender().name()));
//!   Ok(())
//! }
//!
//! async fn so(_: Arc<Greeter>, ctx: Context, msg: Message) -> Result<(), BotError> {
//!   ctx.send(format!("go follow {}", msg.args()[0]));
//!   Ok(())
//! }
//!
//! let cog = Cog::builder("!", Greeter { greeting: "HeyGuys".into() })
//!   .command(Command::new("hello", hello).aliases(["hi", "howdy"]))
//!   .command(Command::new("so", so).arity(1).permission(Permission::Moderator))
//!   .build();
//! ```
//!
//! When a message arrives, every registered cog gets a chance to [resolve][CommandGroup::resolve]
//! it to at most one command. The rules, in order:
//! - A message which doesn't start with the prefix is [`Outcome::NotAddressed`].
//! - A command name matches if the text after the prefix starts with it, followed
//!   by a space or the end of the text. `!test2` never runs `test`.
//! - Commands with an exact [`Arity`] equal to the number of arguments win, higher arities first.
//! - Otherwise the first matching [`Arity::Any`] command runs.
//! - Commands the sender lacks the [`Permission`] for are skipped, as are handlers
//!   which return [`BotError::BadArguments`].

mod permission;

pub use permission::Permission;

use crate::bot::{BotError, Context};
use crate::msg::{split_args, Message, User};
use futures_util::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// The number of arguments a command expects after its name.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Arity {
  /// Any number of arguments. Only used if no exact match exists.
  #[default]
  Any,

  /// Exactly this many space-separated arguments.
  Exact(usize),
}

impl Arity {
  fn sort_key(self) -> i64 {
    match self {
      Arity::Any => -1,
      Arity::Exact(n) => n as i64,
    }
  }
}

impl From<usize> for Arity {
  fn from(value: usize) -> Self {
    Arity::Exact(value)
  }
}

/// Implemented for async functions which can handle a command.
///
/// The handler receives the cog's owner state, a [`Context`] for talking back to
/// the room, and the [`Message`] with its [arguments][Message::args] filled in.
pub trait CommandHandler<T>: Send + Sync + 'static {
  fn call(&self, owner: Arc<T>, ctx: Context, msg: Message)
    -> BoxFuture<'static, Result<(), BotError>>;
}

impl<T, F, Fut> CommandHandler<T> for F
where
  T: Send + Sync + 'static,
  F: Fn(Arc<T>, Context, Message) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
  fn call(
    &self,
    owner: Arc<T>,
    ctx: Context,
    msg: Message,
  ) -> BoxFuture<'static, Result<(), BotError>> {
    Box::pin(self(owner, ctx, msg))
  }
}

/// One command: its names, the arguments it expects, and who may run it.
pub struct Command<T> {
  names: Vec<String>,
  arity: Arity,
  permission: Permission,
  whitelist: HashSet<String>,
  handler: Arc<dyn CommandHandler<T>>,
}

impl<T: Send + Sync + 'static> Command<T> {
  /// Create a command called `name`, which runs `handler`.
  ///
  /// By default, it accepts any number of arguments and anyone may run it.
  pub fn new(name: impl Into<String>, handler: impl CommandHandler<T>) -> Self {
    Self {
      names: vec![name.into()],
      arity: Arity::Any,
      permission: Permission::Unset,
      whitelist: HashSet::new(),
      handler: Arc::new(handler),
    }
  }

  /// Add another name this command may be called by.
  pub fn alias(mut self, name: impl Into<String>) -> Self {
    self.names.push(name.into());
    self
  }

  /// Add more names this command may be called by.
  pub fn aliases(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.names.extend(names.into_iter().map(Into::into));
    self
  }

  /// Set the number of arguments this command expects.
  pub fn arity(mut self, arity: impl Into<Arity>) -> Self {
    self.arity = arity.into();
    self
  }

  /// Set the lowest role which may run this command.
  pub fn permission(mut self, permission: Permission) -> Self {
    self.permission = permission;
    self
  }

  /// Allow these users to run the command, regardless of their role.
  pub fn whitelist(mut self, users: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.whitelist.extend(users.into_iter().map(Into::into));
    self
  }
}

impl<T> Command<T> {
  /// Primary name followed by aliases.
  pub fn names(&self) -> &[String] {
    &self.names
  }

  /// The number of arguments this command expects.
  pub fn expected_arity(&self) -> Arity {
    self.arity
  }

  /// The lowest role which may run this command.
  pub fn required_permission(&self) -> Permission {
    self.permission
  }

  /// Whether `user` may run this command.
  pub fn allows(&self, user: &User) -> bool {
    self.permission.allows(user, &self.whitelist)
  }
}

impl<T> std::fmt::Debug for Command<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Command")
      .field("names", &self.names)
      .field("arity", &self.arity)
      .field("permission", &self.permission)
      .field("whitelist", &self.whitelist)
      .finish_non_exhaustive()
  }
}

/// The result of offering a message to a cog.
///
/// Outcomes are ordered so that combining the results of several cogs is
/// just taking the maximum, see [`Outcome::aggregate`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
  /// The message doesn't start with the cog's prefix.
  NotAddressed,

  /// The message starts with the prefix, but no command could run.
  AddressedNoMatch,

  /// A command ran.
  Executed,
}

impl Outcome {
  /// Combine the outcomes of two cogs for the same message.
  ///
  /// `Executed` wins over `AddressedNoMatch`, which wins over `NotAddressed`.
  #[inline]
  pub fn combine(self, other: Outcome) -> Outcome {
    self.max(other)
  }

  /// Combine the outcomes of every cog for the same message.
  ///
  /// The result is `NotAddressed` only if every cog (or no cog at all) was not addressed.
  pub fn aggregate(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
    outcomes
      .into_iter()
      .fold(Outcome::NotAddressed, Outcome::combine)
  }
}

/// A type-erased [`Cog`], as stored by the bot.
pub trait CommandGroup: Send + Sync {
  /// Name used in logs.
  fn name(&self) -> &str;

  /// The prefix which messages addressed to this group start with.
  fn prefix(&self) -> &str;

  /// Pick at most one command for `msg` and run it.
  ///
  /// On a match, the message's [`arg_text`][Message::arg_text] and [`args`][Message::args]
  /// are filled in before the handler runs. Handler errors other than
  /// [`BotError::BadArguments`] are returned as-is.
  fn resolve<'a>(
    &'a self,
    ctx: &'a Context,
    msg: &'a mut Message,
  ) -> BoxFuture<'a, Result<Outcome, BotError>>;
}

struct Entry<T> {
  name: String,
  arity: Arity,
  command: Arc<Command<T>>,
}

/// A group of commands sharing a prefix and owner state.
pub struct Cog<T> {
  name: String,
  prefix: String,
  owner: Arc<T>,
  /// In resolution order.
  entries: Vec<Entry<T>>,
}

impl<T: Send + Sync + 'static> Cog<T> {
  /// Start building a cog with the given `prefix` and `owner` state.
  ///
  /// The owner is shared by every command in the cog.
  pub fn builder(prefix: impl Into<String>, owner: T) -> CogBuilder<T> {
    CogBuilder {
      name: None,
      prefix: prefix.into(),
      owner: Arc::new(owner),
      entries: Vec::new(),
      keys: HashMap::new(),
    }
  }

  /// The owner state shared by this cog's commands.
  pub fn owner(&self) -> &Arc<T> {
    &self.owner
  }

  /// `(name, arity)` pairs in the order they are tried.
  pub fn keys(&self) -> impl Iterator<Item = (&str, Arity)> + '_ {
    self
      .entries
      .iter()
      .map(|entry| (entry.name.as_str(), entry.arity))
  }

  async fn try_run(
    &self,
    entry: &Entry<T>,
    arg_text: &str,
    ctx: &Context,
    msg: &mut Message,
  ) -> Result<bool, BotError> {
    msg.set_arg_text(arg_text);

    if !entry.command.allows(msg.sender()) {
      debug!(
        cog = %self.name,
        command = %entry.name,
        user = %msg.sender().name(),
        "permission denied"
      );
      return Ok(false);
    }

    trace!(cog = %self.name, command = %entry.name, args = ?msg.args(), "running command");
    match entry
      .command
      .handler
      .call(self.owner.clone(), ctx.clone(), msg.clone())
      .await
    {
      Ok(()) => Ok(true),
      Err(BotError::BadArguments) => {
        debug!(cog = %self.name, command = %entry.name, "handler rejected its arguments");
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }
}

impl<T: Send + Sync + 'static> CommandGroup for Cog<T> {
  fn name(&self) -> &str {
    &self.name
  }

  fn prefix(&self) -> &str {
    &self.prefix
  }

  fn resolve<'a>(
    &'a self,
    ctx: &'a Context,
    msg: &'a mut Message,
  ) -> BoxFuture<'a, Result<Outcome, BotError>> {
    Box::pin(async move {
      let Some(rest) = msg.text().strip_prefix(self.prefix.as_str()) else {
        return Ok(Outcome::NotAddressed);
      };
      let rest = rest.to_owned();

      let mut fallback = None;
      for entry in &self.entries {
        let Some(arg_text) = match_name(&rest, &entry.name) else {
          continue;
        };
        match entry.arity {
          Arity::Exact(n) if n == split_args(arg_text).len() => {
            if self.try_run(entry, arg_text, ctx, msg).await? {
              return Ok(Outcome::Executed);
            }
          }
          Arity::Exact(_) => {}
          Arity::Any => {
            if fallback.is_none() {
              fallback = Some((entry, arg_text));
            }
          }
        }
      }

      if let Some((entry, arg_text)) = fallback {
        if self.try_run(entry, arg_text, ctx, msg).await? {
          return Ok(Outcome::Executed);
        }
      }

      Ok(Outcome::AddressedNoMatch)
    })
  }
}

/// If `text` starts with the command `name` followed by a space or the end of
/// the text, returns the text after the name and the space.
fn match_name<'a>(text: &'a str, name: &str) -> Option<&'a str> {
  let after = text.strip_prefix(name)?;
  if after.is_empty() {
    Some(after)
  } else {
    after.strip_prefix(' ')
  }
}

/// Builder for a [`Cog`].
pub struct CogBuilder<T> {
  name: Option<String>,
  prefix: String,
  owner: Arc<T>,
  entries: Vec<Entry<T>>,
  keys: HashMap<(String, Arity), usize>,
}

impl<T: Send + Sync + 'static> CogBuilder<T> {
  /// Name used in logs. Defaults to the prefix.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Register a command under each of its names.
  ///
  /// Registering a command with the same name and arity as an earlier one
  /// replaces the earlier one.
  pub fn command(mut self, command: Command<T>) -> Self {
    let command = Arc::new(command);
    for name in command.names.iter().filter(|name| !name.is_empty()) {
      let key = (name.clone(), command.arity);
      match self.keys.get(&key) {
        Some(&index) => {
          trace!(command = %name, arity = ?command.arity, "replacing command");
          self.entries[index].command = command.clone();
        }
        None => {
          self.keys.insert(key, self.entries.len());
          self.entries.push(Entry {
            name: name.clone(),
            arity: command.arity,
            command: command.clone(),
          });
        }
      }
    }
    self
  }

  /// Finish the cog.
  ///
  /// Commands are ordered by arity, highest first and [`Arity::Any`] last,
  /// then by longer name first, then by registration order.
  pub fn build(self) -> Cog<T> {
    let mut entries = self.entries;
    entries.sort_by(|a, b| {
      b.arity
        .sort_key()
        .cmp(&a.arity.sort_key())
        .then_with(|| b.name.len().cmp(&a.name.len()))
    });

    Cog {
      name: self.name.unwrap_or_else(|| self.prefix.clone()),
      prefix: self.prefix,
      owner: self.owner,
      entries,
    }
  }
}

static_assert_send!(Cog<()>);
static_assert_sync!(Cog<()>);
