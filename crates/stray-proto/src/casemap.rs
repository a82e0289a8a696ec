//! RFC 1459 case mapping.
//!
//! IRC comparisons are case-insensitive with the twist that `[]\~` are the
//! uppercase forms of `{}|^`. Nick and channel equality, ordering, and the
//! wildcard matcher all fold through this mapping.

use std::cmp::Ordering;

/// Fold a single character to its RFC 1459 lowercase form.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a string to RFC 1459 lowercase.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive equality under RFC 1459 folding.
pub fn irc_eq(a: &str, b: &str) -> bool {
    irc_cmp(a, b) == Ordering::Equal
}

/// Case-insensitive ordering under RFC 1459 folding.
///
/// Used to implement `Ord` for the validated nick and channel wrappers.
pub fn irc_cmp(a: &str, b: &str) -> Ordering {
    let mut ia = a.chars().map(irc_lower_char);
    let mut ib = b.chars().map(irc_lower_char);
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => match ca.cmp(&cb) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}
