//! Message parsing and serialization.
//!
//! The wire grammar is the classic RFC 1459 form, one message per line:
//!
//! ```text
//! [":" prefix " "] command *(" " parameter)
//! ```
//!
//! On parse, a parameter beginning with `:` becomes the final parameter and
//! swallows the remaining tokens. On serialize, the last parameter is
//! colon-prefixed iff it is empty or contains a space or a literal colon.
//! Commands are normalized to upper-case in both directions, so
//! `parse(serialize(m)) == m` for any message this type can represent.

use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};
use crate::reply::Reply;

/// An owned IRC message: optional prefix, upper-cased command, parameters.
///
/// Only the last parameter may contain spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message source (`nick!user@host` or a server name), without the `:`.
    pub prefix: Option<String>,
    /// The command, normalized to upper-case.
    pub command: String,
    /// Ordered command parameters.
    pub params: Vec<String>,
}

impl Message {
    /// Build a message from raw components. The command is upper-cased.
    pub fn new(prefix: Option<&str>, command: &str, params: Vec<&str>) -> Self {
        Message {
            prefix: prefix.map(str::to_owned),
            command: command.to_ascii_uppercase(),
            params: params.into_iter().map(str::to_owned).collect(),
        }
    }

    /// The nickname portion of the prefix, if the prefix is a user mask.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next()?;
        // A server-name prefix contains dots and is not a nick.
        if nick.is_empty() || nick.contains('.') {
            None
        } else {
            Some(nick)
        }
    }

    /// Interpret a three-digit command as a well-known numeric reply.
    pub fn reply(&self) -> Option<Reply> {
        Reply::from_code(&self.command)
    }

    /// A PRIVMSG to a target.
    pub fn privmsg(target: &str, text: &str) -> Self {
        Message::new(None, "PRIVMSG", vec![target, text])
    }

    /// A NOTICE to a target.
    pub fn notice(target: &str, text: &str) -> Self {
        Message::new(None, "NOTICE", vec![target, text])
    }

    /// A JOIN for one channel.
    pub fn join(channel: &str) -> Self {
        Message::new(None, "JOIN", vec![channel])
    }

    /// A NICK registration/change.
    pub fn nick(nick: &str) -> Self {
        Message::new(None, "NICK", vec![nick])
    }

    /// A USER registration.
    pub fn user(user: &str, realname: &str) -> Self {
        Message::new(None, "USER", vec![user, "*", "*", realname])
    }

    /// A PASS for connection passwords.
    pub fn pass(password: &str) -> Self {
        Message::new(None, "PASS", vec![password])
    }

    /// A PING carrying the given parameters.
    pub fn ping(params: Vec<&str>) -> Self {
        Message::new(None, "PING", params)
    }

    /// A PONG echoing the given parameters.
    pub fn pong(params: Vec<&str>) -> Self {
        Message::new(None, "PONG", params)
    }

    /// A QUIT with an optional parting message.
    pub fn quit(reason: Option<&str>) -> Self {
        Message::new(None, "QUIT", reason.into_iter().collect())
    }

    /// A WHOIS query for one nick.
    pub fn whois(nick: &str) -> Self {
        Message::new(None, "WHOIS", vec![nick])
    }

    /// A NAMES query for one channel.
    pub fn names(channel: &str) -> Self {
        Message::new(None, "NAMES", vec![channel])
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        parse_line(line).map_err(|cause| ProtocolError::InvalidMessage {
            string: line.to_owned(),
            cause,
        })
    }
}

fn parse_line(line: &str) -> Result<Message, MessageParseError> {
    if line.is_empty() {
        return Err(MessageParseError::EmptyMessage);
    }

    let (prefix, rest) = match line.strip_prefix(':') {
        Some(rest) => {
            let (prefix, tail) = rest.split_once(' ').ok_or(MessageParseError::MissingCommand)?;
            (Some(prefix.to_owned()), tail)
        }
        None => (None, line),
    };

    let tokens: Vec<&str> = rest.split(' ').filter(|t| !t.is_empty()).collect();
    let (&command, rest_tokens) = tokens
        .split_first()
        .ok_or(MessageParseError::MissingCommand)?;
    let command = command.to_ascii_uppercase();

    let mut params = Vec::new();
    for (i, token) in rest_tokens.iter().enumerate() {
        if let Some(stripped) = token.strip_prefix(':') {
            // Trailing parameter: swallow everything that follows.
            let mut tail = vec![stripped];
            tail.extend_from_slice(&rest_tokens[i + 1..]);
            params.push(tail.join(" "));
            break;
        }
        params.push((*token).to_owned());
    }

    Ok(Message {
        prefix,
        command,
        params,
    })
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().wrapping_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.contains(' ') || param.contains(':')) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_trailing() {
        let msg: Message = ":nick!~user@host PRIVMSG #channel :hello world"
            .parse()
            .unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("nick!~user@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#channel", "hello world"]);
    }

    #[test]
    fn serialize_round_trip() {
        let msg = Message::new(
            Some("nick!~user@host"),
            "privmsg",
            vec!["#channel", "hello world"],
        );
        let line = msg.to_string();
        assert_eq!(line, ":nick!~user@host PRIVMSG #channel :hello world");
        let reparsed: Message = line.parse().unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn command_is_upper_cased_on_parse() {
        let msg: Message = "privmsg #c :hi".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn trailing_swallows_remaining_tokens() {
        let msg: Message = "KICK #c victim :go away now".parse().unwrap();
        assert_eq!(msg.params, vec!["#c", "victim", "go away now"]);
    }

    #[test]
    fn colon_in_middle_token_starts_trailing() {
        let msg: Message = "332 me #c :topic: with colon".parse().unwrap();
        assert_eq!(msg.params, vec!["me", "#c", "topic: with colon"]);
    }

    #[test]
    fn serialize_colon_prefixes_when_needed() {
        let spaced = Message::new(None, "PRIVMSG", vec!["#c", "two words"]);
        assert_eq!(spaced.to_string(), "PRIVMSG #c :two words");

        let colon = Message::new(None, "PRIVMSG", vec!["#c", "a:b"]);
        assert_eq!(colon.to_string(), "PRIVMSG #c :a:b");

        let plain = Message::new(None, "JOIN", vec!["#c"]);
        assert_eq!(plain.to_string(), "JOIN #c");

        let empty = Message::new(None, "TOPIC", vec!["#c", ""]);
        assert_eq!(empty.to_string(), "TOPIC #c :");
    }

    #[test]
    fn parse_strips_crlf() {
        let msg: Message = "PING :irc.example.net\r\n".parse().unwrap();
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn empty_line_is_an_error() {
        assert!("".parse::<Message>().is_err());
        assert!("\r\n".parse::<Message>().is_err());
    }

    #[test]
    fn prefix_without_command_is_an_error() {
        assert!(":prefixonly".parse::<Message>().is_err());
    }

    #[test]
    fn source_nick_extracts_user_prefix_only() {
        let user: Message = ":nick!~user@host PRIVMSG #c :hi".parse().unwrap();
        assert_eq!(user.source_nick(), Some("nick"));

        let server: Message = ":irc.example.net 001 me :welcome".parse().unwrap();
        assert_eq!(server.source_nick(), None);

        let bare: Message = "PING :x".parse().unwrap();
        assert_eq!(bare.source_nick(), None);
    }

    #[test]
    fn numeric_reply_mapping() {
        let msg: Message = ":server 376 me :end of motd".parse().unwrap();
        assert_eq!(msg.reply(), Some(Reply::EndOfMotd));

        let msg: Message = ":server PRIVMSG #c :hi".parse().unwrap();
        assert_eq!(msg.reply(), None);
    }
}
