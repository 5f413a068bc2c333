//! ## Chat messages
//!
//! The entrypoint to this module is [`Message::parse`], which turns one raw
//! `PRIVMSG` line into a [`Message`] carrying a snapshot of its sender, [`User`].
//!
//! ```rust
//! let raw = "@badges=broadcaster/1;mod=0;subscriber=0;display-name=Ann;user-id=1 PRIVMSG #ch :!ping\r\n";
//! let msg = cogbot::Message::parse("ch", raw).unwrap();
//! assert_eq!(msg.text(), "!ping");
//! assert!(msg.sender().is_broadcaster());
//! ```

use crate::irc::{command_at, maybe_unescape, tag_pairs, trim_line_ending, Tag};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt::Display;

/// One chat message received in the joined room.
///
/// Created per inbound line by [`Message::parse`]. The command resolver fills in
/// [`Message::arg_text`] and [`Message::args`] once a command name has matched,
/// until then they are empty.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
  channel: String,
  tags: BTreeMap<String, String>,
  raw: String,
  text: String,
  arg_text: String,
  args: Vec<String>,
  sender: User,
}

generate_getters! {
  for Message as self {
    /// Room in which this message was received.
    channel -> &str = self.channel.as_str(),

    /// All tags sent with the message.
    ///
    /// Values are kept exactly as sent, use [`maybe_unescape`][crate::irc::maybe_unescape]
    /// on values which may contain escaped characters.
    tags -> &BTreeMap<String, String> = &self.tags,

    /// The line this message was parsed from.
    raw -> &str = self.raw.as_str(),

    /// Text content of the message, including any command prefix and name.
    text -> &str = self.text.as_str(),

    /// Text after the matched command name and one separating space.
    ///
    /// Empty until a command has matched.
    arg_text -> &str = self.arg_text.as_str(),

    /// [`Message::arg_text`] split on single spaces.
    args -> &[String] = &self.args,

    /// The user who sent this message.
    sender -> &User = &self.sender,
  }
}

impl Message {
  /// Parse one raw `PRIVMSG` line received in `channel`.
  ///
  /// The line has the shape `@<tags> :<prefix> PRIVMSG #<channel> :<text>`,
  /// where the tag segment and prefix are optional. A trailing line ending is ignored.
  ///
  /// Malformed lines are rejected, there is no partial recovery.
  pub fn parse(channel: impl Into<String>, raw: impl Into<String>) -> Result<Self, ParseError> {
    let raw = raw.into();
    let line = trim_line_ending(&raw);

    let Some((cmd_start, "PRIVMSG")) = command_at(line) else {
      return Err(ParseError::NotPrivmsg);
    };

    let (tags, prefix) = match line.strip_prefix('@').and_then(|rest| rest.split_once(' ')) {
      Some((segment, _)) => {
        let tags = tag_pairs(segment)
          .map(|(key, value)| (key.to_owned(), value.to_owned()))
          .collect();
        // `@` + segment + ` `
        (tags, &line[segment.len() + 2..cmd_start])
      }
      None => (BTreeMap::new(), &line[..cmd_start]),
    };

    let login = parse_login(prefix);

    let params = &line[cmd_start + "PRIVMSG".len()..];
    let Some((_, text)) = params.split_once(':') else {
      return Err(ParseError::MissingText);
    };
    let text = text.to_owned();

    let sender = User::from_tags(&tags, login)?;

    Ok(Message {
      channel: channel.into(),
      tags,
      raw,
      text,
      arg_text: String::new(),
      args: Vec::new(),
      sender,
    })
  }

  /// Retrieve the value of `tag`.
  ///
  /// ```rust,ignore
  /// assert!(message.tag(Tag::Id) == message.tag("id"));
  /// ```
  pub fn tag<'a>(&self, tag: impl Into<Tag<'a>>) -> Option<&str> {
    self.tags.get(tag.into().as_str()).map(String::as_str)
  }

  /// Unique ID of the message, used when replying to it.
  pub fn id(&self) -> Option<&str> {
    self.tag(Tag::Id).filter(|id| !id.is_empty())
  }

  /// Login of the sender, from the line's `nick!user@host` prefix.
  pub fn login(&self) -> Option<&str> {
    self.sender.login()
  }

  /// The time at which the server received the message.
  pub fn timestamp(&self) -> Option<DateTime<Utc>> {
    self.tag(Tag::TmiSentTs).and_then(parse_timestamp)
  }

  /// Store the text following a matched command name.
  pub(crate) fn set_arg_text(&mut self, arg_text: &str) {
    self.arg_text = arg_text.to_owned();
    self.args = split_args(arg_text);
  }

  pub(crate) fn set_follows_broadcaster(&mut self, follows: bool) {
    self.sender.follows_broadcaster = Some(follows);
  }
}

/// Split `arg_text` on single spaces. Empty text has no arguments.
pub(crate) fn split_args(arg_text: &str) -> Vec<String> {
  if arg_text.is_empty() {
    return Vec::new();
  }
  arg_text.split(' ').map(String::from).collect()
}

/// `:nick!user@host ` -> `nick`
fn parse_login(prefix: &str) -> Option<String> {
  let prefix = prefix.trim().strip_prefix(':')?;
  let nick = prefix.split_once('!').map_or(prefix, |(nick, _)| nick);
  Some(nick).filter(|nick| !nick.is_empty()).map(String::from)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  Utc.timestamp_millis_opt(s.parse().ok()?).single()
}

/// Snapshot of the sender's identity and role at the time the message was sent.
///
/// Every role field is derived from the message tags.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
  name: String,
  id: String,
  login: Option<String>,
  is_broadcaster: bool,
  is_moderator: bool,
  is_subscriber: bool,
  subscription_months: u32,
  badges: Vec<String>,
  follows_broadcaster: Option<bool>,
}

generate_getters! {
  for User as self {
    /// Display name.
    ///
    /// This is the name which appears in chat, and may contain arbitrary unicode characters.
    name -> &str = self.name.as_str(),

    /// Id of the user.
    id -> &str = self.id.as_str(),

    /// Login of the user, if the line had a `nick!user@host` prefix.
    login -> Option<&str> = self.login.as_deref(),

    /// Whether the user is the owner of the room.
    is_broadcaster -> bool,

    /// Whether the user moderates the room.
    is_moderator -> bool,

    /// Whether the user is subscribed to the room.
    is_subscriber -> bool,

    /// Number of months subscribed, `0` for non-subscribers.
    subscription_months -> u32,

    /// Raw badges, e.g. `subscriber/12`.
    badges -> &[String] = &self.badges,

    /// Whether the user follows the broadcaster.
    ///
    /// [`None`] unless follower lookup is enabled on the bot.
    follows_broadcaster -> Option<bool>,
  }
}

impl User {
  /// Derive a user from a message's tags.
  pub fn from_tags(
    tags: &BTreeMap<String, String>,
    login: Option<String>,
  ) -> Result<Self, ParseError> {
    let tag = |tag: Tag<'static>| tags.get(tag.as_str()).map(String::as_str);
    let required = |name: Tag<'static>| tag(name).ok_or(ParseError::MissingTag(name.as_str()));

    let name = maybe_unescape(required(Tag::DisplayName)?).into_owned();
    let id = required(Tag::UserId)?.to_owned();
    let badges = tag(Tag::Badges).unwrap_or_default();
    let is_subscriber = parse_flag(tag(Tag::Subscriber).unwrap_or_default());

    Ok(User {
      name,
      id,
      login,
      is_broadcaster: badges.contains("broadcaster"),
      is_moderator: parse_flag(tag(Tag::Mod).unwrap_or_default()),
      is_subscriber,
      subscription_months: match is_subscriber {
        true => parse_months(tag(Tag::BadgeInfo).unwrap_or_default()),
        false => 0,
      },
      badges: match badges.is_empty() {
        true => Vec::new(),
        false => badges.split(',').map(String::from).collect(),
      },
      follows_broadcaster: None,
    })
  }

  /// The highest role held by the user.
  pub fn tier(&self) -> Tier {
    if self.is_broadcaster {
      Tier::Broadcaster
    } else if self.is_moderator {
      Tier::Moderator
    } else if self.is_subscriber {
      Tier::Subscriber
    } else {
      Tier::Everyone
    }
  }
}

/// Role of a user in the room, from highest to lowest.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
  Broadcaster,
  Moderator,
  Subscriber,
  Everyone,
}

impl Tier {
  /// `0` for the broadcaster, `3` for everyone else.
  pub fn rank(self) -> u8 {
    self as u8
  }
}

/// Tag flags are truthy when non-empty and not `0`.
fn parse_flag(v: &str) -> bool {
  !v.is_empty() && v != "0"
}

/// `subscriber/22,predictions/blue-1` -> `22`
fn parse_months(badge_info: &str) -> u32 {
  badge_info
    .split(',')
    .flat_map(|info| info.split_once('/'))
    .find(|(name, _)| matches!(*name, "subscriber" | "founder"))
    .and_then(|(_, months)| months.parse().ok())
    .unwrap_or(0)
}

/// Failed to parse a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
  /// The line is not a chat message.
  NotPrivmsg,

  /// The line has no `:` separating the channel from the text.
  MissingText,

  /// A tag required to identify the sender is missing.
  MissingTag(&'static str),
}

impl Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ParseError::NotPrivmsg => write!(f, "failed to parse message: not a PRIVMSG"),
      ParseError::MissingText => write!(f, "failed to parse message: missing text"),
      ParseError::MissingTag(tag) => write!(f, "failed to parse message: missing tag `{tag}`"),
    }
  }
}

impl std::error::Error for ParseError {}

static_assert_send!(Message);
static_assert_sync!(Message);

#[cfg(test)]
mod tests {
  use super::*;

  const PING: &str =
    "@badges=broadcaster/1;mod=0;subscriber=0;display-name=Ann;user-id=1 PRIVMSG #ch :!ping\r\n";

  const FULL: &str = "@badge-info=subscriber/22;badges=moderator/1,subscriber/12;color=#19E6E6;display-name=randers;emotes=;flags=;id=d831d848-b7c7-4559-ae3a-2cb88f4dbfed;mod=1;room-id=11148817;subscriber=1;tmi-sent-ts=1594555275886;turbo=0;user-id=40286300;user-type=mod :randers!randers@randers.tmi.twitch.tv PRIVMSG #pajlada :!so  forsen";

  #[test]
  fn parse_without_prefix() {
    let msg = Message::parse("ch", PING).unwrap();
    assert_eq!(msg.channel(), "ch");
    assert_eq!(msg.text(), "!ping");
    assert_eq!(msg.raw(), PING);
    assert_eq!(msg.arg_text(), "");
    assert!(msg.args().is_empty());
    assert_eq!(msg.tag(Tag::UserId), Some("1"));
    assert_eq!(msg.tag("mod"), Some("0"));

    let user = msg.sender();
    assert_eq!(user.name(), "Ann");
    assert_eq!(user.id(), "1");
    assert_eq!(user.login(), None);
    assert!(user.is_broadcaster());
    assert!(!user.is_moderator());
    assert!(!user.is_subscriber());
    assert_eq!(user.subscription_months(), 0);
    assert_eq!(user.badges(), ["broadcaster/1"]);
    assert_eq!(user.tier(), Tier::Broadcaster);
  }

  #[test]
  fn parse_full_line() {
    let msg = Message::parse("pajlada", FULL).unwrap();
    assert_eq!(msg.text(), "!so  forsen");
    assert_eq!(msg.id(), Some("d831d848-b7c7-4559-ae3a-2cb88f4dbfed"));
    assert_eq!(msg.timestamp().unwrap().timestamp_millis(), 1594555275886);
    assert_eq!(msg.tag(Tag::UserType), Some("mod"));
    assert_eq!(msg.sender().tier(), Tier::Moderator);

    insta::assert_debug_snapshot!(msg.sender(), @r###"
    User {
        name: "randers",
        id: "40286300",
        login: Some(
            "randers",
        ),
        is_broadcaster: false,
        is_moderator: true,
        is_subscriber: true,
        subscription_months: 22,
        badges: [
            "moderator/1",
            "subscriber/12",
        ],
        follows_broadcaster: None,
    }
    "###);
  }

  #[test]
  fn parse_is_idempotent() {
    for line in [PING, FULL] {
      let a = Message::parse("ch", line).unwrap();
      let b = Message::parse("ch", line).unwrap();
      assert_eq!(a.sender(), b.sender());
      assert_eq!(a.tags(), b.tags());
    }
  }

  #[test]
  fn roles_agree_with_tags() {
    let cases = [
      ("broadcaster/1,subscriber/0", "subscriber/3", "1", true, 3),
      ("subscriber/12", "subscriber/14", "1", false, 14),
      ("founder/0", "founder/30", "1", false, 30),
      ("vip/1", "", "0", false, 0),
      ("", "", "", false, 0),
    ];
    for (badges, badge_info, subscriber, broadcaster, months) in cases {
      let line = format!(
        "@badge-info={badge_info};badges={badges};display-name=x;mod=0;subscriber={subscriber};user-id=2 PRIVMSG #ch :hi"
      );
      let msg = Message::parse("ch", line).unwrap();
      let user = msg.sender();
      assert_eq!(user.is_broadcaster(), badges.contains("broadcaster"));
      assert_eq!(user.is_broadcaster(), broadcaster);
      assert_eq!(user.subscription_months(), months, "{badges} / {badge_info}");
      assert_eq!(
        user.badges().len(),
        badges.split(',').filter(|b| !b.is_empty()).count()
      );
    }
  }

  #[test]
  fn display_name_is_unescaped() {
    let msg = Message::parse(
      "riotgames",
      "@badges=;display-name=Riot\\sGames;mod=1;subscriber=0;user-id=36029255 :riotgames!riotgames@riotgames.tmi.twitch.tv PRIVMSG #riotgames :test",
    )
    .unwrap();
    assert_eq!(msg.sender().name(), "Riot Games");
    assert_eq!(msg.tag(Tag::DisplayName), Some("Riot\\sGames"));
    assert_eq!(msg.sender().login(), Some("riotgames"));
    assert_eq!(msg.login(), Some("riotgames"));
    assert_eq!(msg.sender().tier(), Tier::Moderator);
  }

  #[test]
  fn text_keeps_colons_and_empty_text() {
    let msg = Message::parse(
      "ch",
      "@display-name=a;user-id=1 :a!a@a PRIVMSG #ch :see: https://example.com",
    )
    .unwrap();
    assert_eq!(msg.text(), "see: https://example.com");

    let msg = Message::parse("ch", "@display-name=a;user-id=1 PRIVMSG #ch :").unwrap();
    assert_eq!(msg.text(), "");
  }

  #[test]
  fn rejects_malformed_lines() {
    assert_eq!(
      Message::parse("ch", "PING :tmi.twitch.tv"),
      Err(ParseError::NotPrivmsg)
    );
    assert_eq!(
      Message::parse("ch", "@display-name=a;user-id=1 PRIVMSG #ch"),
      Err(ParseError::MissingText)
    );
    assert_eq!(
      Message::parse("ch", "@user-id=1 PRIVMSG #ch :hi"),
      Err(ParseError::MissingTag("display-name"))
    );
    assert_eq!(
      Message::parse("ch", "PRIVMSG #ch :hi"),
      Err(ParseError::MissingTag("display-name"))
    );
  }

  #[test]
  fn command_word_decides_not_text() {
    assert_eq!(
      Message::parse(
        "ch",
        "@display-name=Ann;msg-id=resub;user-id=1 :tmi.twitch.tv USERNOTICE #ch :love the PRIVMSG parser"
      ),
      Err(ParseError::NotPrivmsg)
    );

    let msg = Message::parse(
      "ch",
      "@display-name=Ann;user-id=1 :ann!ann@ann.tmi.twitch.tv PRIVMSG #ch :hi PRIVMSG #ch :!stop",
    )
    .unwrap();
    assert_eq!(msg.text(), "hi PRIVMSG #ch :!stop");
    assert_eq!(msg.login(), Some("ann"));
  }

  #[test]
  fn truncated_lines_never_panic() {
    for line in [PING, FULL] {
      for (end, _) in line.char_indices() {
        let _ = Message::parse("ch", &line[..end]);
      }
      for (start, _) in line.char_indices() {
        let _ = Message::parse("ch", &line[start..]);
      }
    }
  }

  #[test]
  fn args_split_on_single_spaces() {
    assert!(split_args("").is_empty());
    assert_eq!(split_args("a b"), ["a", "b"]);
    assert_eq!(split_args(" forsen"), ["", "forsen"]);
  }
}
