macro_rules! tags_def {
  (
    $tag:ident;
    $($(#[$meta:meta])* $key:literal = $name:ident),* $(,)?
  ) => {
    /// A tag name.
    ///
    /// Tags which the library knows about have their own variant,
    /// everything else is [`Tag::Unknown`].
    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
    #[non_exhaustive]
    pub enum $tag<'src> {
      $(
        $(#[$meta])*
        $name,
      )*
      Unknown(&'src str),
    }

    impl<'src> $tag<'src> {
      #[doc = concat!("Get the string value of the [`", stringify!($tag), "`].")]
      #[inline]
      pub fn as_str(&self) -> &'src str {
        match self {
          $(Self::$name => $key,)*
          Self::Unknown(key) => key,
        }
      }

      #[doc = concat!("Parse a [`", stringify!($tag), "`] from a string.")]
      #[inline]
      pub fn parse(src: &'src str) -> Self {
        match src {
          $($key => Self::$name,)*
          _ => Self::Unknown(src),
        }
      }
    }
  }
}

impl<'src> From<&'src str> for Tag<'src> {
  fn from(value: &'src str) -> Self {
    Tag::parse(value)
  }
}

impl std::fmt::Display for Tag<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

tags_def! {
  Tag;
  /// `subscriber/<months>` and friends.
  "badge-info" = BadgeInfo,
  /// Comma-separated `<name>/<version>` list.
  "badges" = Badges,
  "bits" = Bits,
  "client-nonce" = ClientNonce,
  "color" = Color,
  /// The sender's display name, escaped.
  "display-name" = DisplayName,
  "emotes" = Emotes,
  "first-msg" = FirstMsg,
  "flags" = Flags,
  /// Unique message ID, used as the parent of replies.
  "id" = Id,
  /// `1` if the sender is a moderator.
  "mod" = Mod,
  "reply-parent-msg-id" = ReplyParentMsgId,
  "returning-chatter" = ReturningChatter,
  "room-id" = RoomId,
  /// `1` if the sender is subscribed.
  "subscriber" = Subscriber,
  /// Unix timestamp in milliseconds.
  "tmi-sent-ts" = TmiSentTs,
  "turbo" = Turbo,
  "user-id" = UserId,
  "user-type" = UserType,
  "vip" = Vip,
}
