//! Validated channel-name wrapper.
//!
//! Channel names start with one of `# & + !`, contain no space, comma, BEL,
//! NUL, or other control characters, and are at most 50 characters long
//! (RFC 2812 section 1.3). Comparison is case-insensitive like [`Nick`].
//!
//! [`Nick`]: crate::nick::Nick

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::casemap::{irc_cmp, irc_lower_char};
use crate::error::MessageParseError;

/// Leading characters that mark a target string as a channel.
pub const CHANNEL_PREFIXES: [char; 4] = ['#', '&', '+', '!'];

/// Maximum channel name length including the prefix character.
const MAX_CHANNEL_LEN: usize = 50;

fn is_valid(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if CHANNEL_PREFIXES.contains(&c) => {}
        _ => return false,
    }
    if s.chars().count() > MAX_CHANNEL_LEN {
        return false;
    }
    chars.all(|c| c != ' ' && c != ',' && c != '\x07' && !c.is_control())
}

/// A validated IRC channel name.
#[derive(Debug, Clone)]
pub struct Channel(String);

impl Channel {
    /// Validate and wrap a channel name.
    pub fn new(s: impl Into<String>) -> Result<Self, MessageParseError> {
        let s = s.into();
        if is_valid(&s) {
            Ok(Channel(s))
        } else {
            Err(MessageParseError::InvalidChannel(s))
        }
    }

    /// The channel name as originally spelled.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Channel {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::new(s)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        irc_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Channel {}

impl PartialOrd for Channel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Channel {
    fn cmp(&self, other: &Self) -> Ordering {
        irc_cmp(&self.0, &other.0)
    }
}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.0.chars() {
            irc_lower_char(c).hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_each_prefix() {
        for chan in ["#channel", "&local", "+modeless", "!safe12345"] {
            assert!(Channel::new(chan).is_ok(), "{chan} should be valid");
        }
    }

    #[test]
    fn rejects_bad_channels() {
        for chan in ["channel", "#chan nel", "#chan,nel", ""] {
            assert!(Channel::new(chan).is_err(), "{chan} should be invalid");
        }
        let long = format!("#{}", "a".repeat(MAX_CHANNEL_LEN));
        assert!(Channel::new(long).is_err());
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a = Channel::new("#Chan[1]").unwrap();
        let b = Channel::new("#chan{1}").unwrap();
        assert_eq!(a, b);
    }
}
