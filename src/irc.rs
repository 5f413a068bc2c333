//! ## Raw line handling
//!
//! The entrypoint to this module is [`Line::classify`], which decides what
//! the read loop should do with one line received from the server.
//!
//! ```rust
//! use cogbot::irc::Line;
//!
//! assert_eq!(Line::classify("PING :tmi.twitch.tv\r\n"), Line::Ping(":tmi.twitch.tv"));
//! ```
//!
//! ⚠ This is _not_ an IRCv3 parser! It only understands the handful of
//! line shapes Twitch sends to a bot which joined a single channel.

mod tag;

pub use tag::Tag;

use std::borrow::Cow;

/// What kind of line the server sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line<'src> {
  /// Keep-alive probe. Holds everything after `PING `.
  Ping(&'src str),

  /// A chat message, see [`Message::parse`][crate::msg::Message::parse].
  Privmsg,

  /// A server notice. Holds the notice text.
  Notice(&'src str),

  /// The server is about to restart and wants us to reconnect.
  Reconnect,

  /// Anything else.
  Other,
}

impl<'src> Line<'src> {
  /// Classify a raw line by its command word. The line ending is ignored.
  pub fn classify(src: &'src str) -> Self {
    let src = trim_line_ending(src);

    let Some((start, command)) = command_at(src) else {
      return Line::Other;
    };
    let params = src[start + command.len()..].trim_start_matches(' ');

    match command {
      "PING" => Line::Ping(params),
      "PRIVMSG" => Line::Privmsg,
      "NOTICE" => Line::Notice(match params.split_once(':') {
        Some((_, text)) => text,
        None => params,
      }),
      "RECONNECT" => Line::Reconnect,
      _ => Line::Other,
    }
  }
}

/// Strip a trailing `\r\n`, `\n`, or `\r`.
pub fn trim_line_ending(src: &str) -> &str {
  src.trim_end_matches(['\r', '\n'])
}

/// `@tags :prefix COMMAND ...`
///
/// Returns the byte offset and text of the command word, skipping the optional
/// tag and prefix segments. Anything after the command is never looked at.
pub(crate) fn command_at(src: &str) -> Option<(usize, &str)> {
  let mut start = 0;
  if src.starts_with('@') {
    start = src.find(' ')? + 1;
  }
  if src[start..].starts_with(':') {
    start += src[start..].find(' ')? + 1;
  }
  let command = src[start..].split(' ').next().filter(|cmd| !cmd.is_empty())?;
  Some((start, command))
}

/// Iterate over the `key=value` pairs of a tag segment.
///
/// `segment` is the part of the line between the leading `@` and the first space.
/// Each pair is split on the first `=`; a tag without a value yields an empty string.
pub fn tag_pairs(segment: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
  segment
    .split(';')
    .filter(|pair| !pair.is_empty())
    .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

/// Checks if `value` needs to be unescaped by looking for escaped characters.
///
/// If it must be unescaped, then it must reallocate and will return an owned string.
/// Otherwise, it returns a borrow of the original `value`.
pub fn maybe_unescape<'a>(value: impl Into<Cow<'a, str>>) -> Cow<'a, str> {
  let value: Cow<'_, str> = value.into();
  match value.find(['\\', '⸝']) {
    Some(start) => Cow::Owned(unescape_from(&value, start)),
    None => value,
  }
}

/// Unescape a tag `value` according to the escaped characters that Twitch IRC supports.
///
/// Note that this is _not_ the same as IRCv3! Twitch doesn't follow the spec here.
pub fn unescape(value: &str) -> String {
  unescape_from(value, 0)
}

#[inline]
fn unescape_from(input: &str, start: usize) -> String {
  let mut out = String::with_capacity(input.len());
  out.push_str(&input[..start]);

  let mut escape = false;
  for char in input[start..].chars() {
    match char {
      '\\' if escape => {
        out.push('\\');
        escape = false;
      }
      '\\' => escape = true,
      ':' if escape => {
        out.push(';');
        escape = false;
      }
      's' if escape => {
        out.push(' ');
        escape = false;
      }
      'r' if escape => {
        out.push('\r');
        escape = false;
      }
      'n' if escape => {
        out.push('\n');
        escape = false;
      }
      '⸝' => out.push(','),
      c => {
        escape = false;
        out.push(c)
      }
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classify_ping() {
    assert_eq!(
      Line::classify("PING :tmi.twitch.tv\r\n"),
      Line::Ping(":tmi.twitch.tv")
    );
    assert_eq!(Line::classify("PING"), Line::Ping(""));
  }

  #[test]
  fn classify_privmsg() {
    let data = "@badges=;display-name=Ann;user-id=1 :ann!ann@ann.tmi.twitch.tv PRIVMSG #ch :hi NOTICE me\r\n";
    assert_eq!(Line::classify(data), Line::Privmsg);
  }

  #[test]
  fn classify_looks_only_at_the_command() {
    let resub = "@badge-info=subscriber/3;display-name=Ann;msg-id=resub;user-id=1 :tmi.twitch.tv USERNOTICE #ch :love the PRIVMSG parser";
    assert_eq!(Line::classify(resub), Line::Other);

    let whisper = "@display-name=Ann;user-id=1 :ann!ann@ann.tmi.twitch.tv WHISPER bot :x PRIVMSG #ch :!stop";
    assert_eq!(Line::classify(whisper), Line::Other);

    let chat = "@display-name=Ann;user-id=1 :ann!ann@ann.tmi.twitch.tv PRIVMSG #ch :see NOTICE * :x";
    assert_eq!(Line::classify(chat), Line::Privmsg);

    assert_eq!(command_at(":tmi.twitch.tv"), None);
    assert_eq!(command_at("@a=b :tmi.twitch.tv PING"), Some((20, "PING")));
  }

  #[test]
  fn classify_notice() {
    assert_eq!(
      Line::classify(":tmi.twitch.tv NOTICE * :Improperly formatted auth\r\n"),
      Line::Notice("Improperly formatted auth")
    );
    assert_eq!(
      Line::classify(":tmi.twitch.tv NOTICE * :Login authentication failed"),
      Line::Notice("Login authentication failed")
    );
  }

  #[test]
  fn classify_reconnect_and_other() {
    assert_eq!(Line::classify(":tmi.twitch.tv RECONNECT"), Line::Reconnect);
    assert_eq!(
      Line::classify(":tmi.twitch.tv CAP * ACK :twitch.tv/tags"),
      Line::Other
    );
    assert_eq!(
      Line::classify(":ann!ann@ann.tmi.twitch.tv JOIN #ch"),
      Line::Other
    );
    assert_eq!(Line::classify(""), Line::Other);
  }

  #[test]
  fn tag_pairs_split_on_first_equals() {
    let pairs = tag_pairs("a=1;b=;c;d=x=y;").collect::<Vec<_>>();
    assert_eq!(pairs, [("a", "1"), ("b", ""), ("c", ""), ("d", "x=y")]);
  }

  #[test]
  fn unescape_display_name() {
    assert_eq!(maybe_unescape("Riot\\sGames"), "Riot Games");
    assert_eq!(unescape("a\\:b\\\\c"), "a;b\\c");
    assert!(matches!(maybe_unescape("plain"), Cow::Borrowed("plain")));
  }
}
