use crate::msg::User;
use std::collections::HashSet;

/// Who may run a command, based on their role in the room.
///
/// Each level implies every level above it, so `Subscriber` commands may also
/// be run by moderators and the broadcaster.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Permission {
  /// Only the whitelist decides. An empty whitelist lets everyone through.
  #[default]
  Unset,
  Everyone,
  Subscriber,
  Moderator,
  Broadcaster,
}

impl Permission {
  /// Rank of the lowest [`Tier`][crate::msg::Tier] allowed through, `None` for [`Permission::Unset`].
  pub fn rank(self) -> Option<u8> {
    match self {
      Permission::Unset => None,
      Permission::Everyone => Some(3),
      Permission::Subscriber => Some(2),
      Permission::Moderator => Some(1),
      Permission::Broadcaster => Some(0),
    }
  }

  /// Whether `user` may run a command with this permission and `whitelist`.
  ///
  /// Being on the whitelist always grants access, it never restricts it.
  /// A user is on the whitelist if either their display name or login is.
  pub fn allows(self, user: &User, whitelist: &HashSet<String>) -> bool {
    let whitelisted = whitelist.contains(user.name())
      || user.login().is_some_and(|login| whitelist.contains(login));

    match self.rank() {
      None => whitelist.is_empty() || whitelisted,
      Some(rank) => user.tier().rank() <= rank || whitelisted,
    }
  }
}
