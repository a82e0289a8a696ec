//! Validated nickname wrapper.
//!
//! Nicknames follow the RFC 2812 grammar: a letter or special character,
//! followed by letters, digits, specials, or hyphens. Equality, ordering,
//! and hashing are case-insensitive under RFC 1459 folding.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::casemap::{irc_cmp, irc_lower_char};
use crate::error::MessageParseError;

/// Maximum nickname length accepted (RFC 2812 allows servers to extend the
/// original 9-character limit; 30 is a common NICKLEN).
pub const MAX_NICK_LEN: usize = 30;

/// "Special" characters allowed in nicknames per RFC 2812.
#[inline]
fn is_special(c: char) -> bool {
    matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
}

fn is_valid(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_NICK_LEN {
        return false;
    }
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_alphabetic() && !is_special(first) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || is_special(c) || c == '-')
}

/// A validated IRC nickname.
#[derive(Debug, Clone)]
pub struct Nick(String);

impl Nick {
    /// Validate and wrap a nickname.
    pub fn new(s: impl Into<String>) -> Result<Self, MessageParseError> {
        let s = s.into();
        if is_valid(&s) {
            Ok(Nick(s))
        } else {
            Err(MessageParseError::InvalidNick(s))
        }
    }

    /// The nickname as originally spelled.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Nick {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nick::new(s)
    }
}

impl fmt::Display for Nick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Nick {
    fn eq(&self, other: &Self) -> bool {
        irc_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Nick {}

impl PartialOrd for Nick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nick {
    fn cmp(&self, other: &Self) -> Ordering {
        irc_cmp(&self.0, &other.0)
    }
}

impl Hash for Nick {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.0.chars() {
            irc_lower_char(c).hash(state);
        }
    }
}
