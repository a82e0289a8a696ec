//! Message targets and text payloads.
//!
//! A [`Target`] is where a PRIVMSG is directed: a channel or a nick,
//! distinguished by a leading-character test on the raw string. [`Text`] is
//! a non-empty message body.

use std::fmt;
use std::str::FromStr;

use crate::chan::{Channel, CHANNEL_PREFIXES};
use crate::error::MessageParseError;
use crate::nick::Nick;

/// The destination of a user-directed message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// A channel target (`#`, `&`, `+`, or `!` prefix).
    Channel(Channel),
    /// A nick target.
    Nick(Nick),
}

impl Target {
    /// Derive a target from a raw string by its leading character.
    pub fn parse(s: &str) -> Result<Self, MessageParseError> {
        match s.chars().next() {
            Some(c) if CHANNEL_PREFIXES.contains(&c) => Channel::new(s).map(Target::Channel),
            _ => Nick::new(s).map(Target::Nick),
        }
    }

    /// The raw target string.
    pub fn as_str(&self) -> &str {
        match self {
            Target::Channel(c) => c.as_str(),
            Target::Nick(n) => n.as_str(),
        }
    }

    /// True if this target is a channel.
    pub fn is_channel(&self) -> bool {
        matches!(self, Target::Channel(_))
    }
}

impl FromStr for Target {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-empty message body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Text(String);

impl Text {
    /// Wrap a message body, rejecting the empty string.
    pub fn new(s: impl Into<String>) -> Result<Self, MessageParseError> {
        let s = s.into();
        if s.is_empty() {
            Err(MessageParseError::EmptyText)
        } else {
            Ok(Text(s))
        }
    }

    /// The body as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_char_selects_variant() {
        assert!(Target::parse("#chan").unwrap().is_channel());
        assert!(Target::parse("&local").unwrap().is_channel());
        assert!(Target::parse("+open").unwrap().is_channel());
        assert!(Target::parse("!safe1").unwrap().is_channel());
        assert!(!Target::parse("somenick").unwrap().is_channel());
    }

    #[test]
    fn invalid_either_way_is_an_error() {
        // Channel prefix but invalid channel body.
        assert!(Target::parse("#bad channel").is_err());
        // No prefix and not a valid nick.
        assert!(Target::parse("9nope").is_err());
    }

    #[test]
    fn text_rejects_empty() {
        assert!(Text::new("").is_err());
        assert_eq!(Text::new("hi").unwrap().as_str(), "hi");
    }
}
