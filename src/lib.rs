#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
#[macro_use]
extern crate tracing;

pub(crate) const fn assert_sync<T: ?Sized + Sync>() {}
macro_rules! static_assert_sync {
  ($T:ty) => {
    const _: () = {
      let _ = $crate::assert_sync::<$T>;
    };
  };
}

pub(crate) const fn assert_send<T: ?Sized + Send>() {}
macro_rules! static_assert_send {
  ($T:ty) => {
    const _: () = {
      let _ = $crate::assert_send::<$T>;
    };
  };
}

#[macro_use]
mod macros;

pub mod irc;
pub mod msg;

pub use irc::{maybe_unescape, unescape, Line, Tag};
pub use msg::{Message, ParseError, Tier, User};

#[cfg(feature = "client")]
pub mod bot;
#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod cog;
#[cfg(feature = "client")]
pub mod events;
#[cfg(feature = "client")]
pub mod log;

#[cfg(feature = "client")]
pub use bot::{Bot, BotBuilder, BotError, Context};
#[cfg(feature = "client")]
pub use client::{Config, Credentials, Session};
#[cfg(feature = "client")]
pub use cog::{Arity, Cog, Command, Outcome, Permission};
#[cfg(feature = "client")]
pub use events::EventHandler;

#[cfg(feature = "helix")]
pub mod helix;

#[cfg(feature = "helix")]
pub use helix::Helix;
