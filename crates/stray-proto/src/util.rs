//! Wildcard matching for masks and ignore patterns.
//!
//! Patterns use `*` (zero or more characters) and `?` (exactly one), and
//! compare case-insensitively under RFC 1459 folding so `NICK!*@*` matches
//! `nick!~user@host`.

use crate::casemap::irc_lower_char;

/// Match `text` against a wildcard `pattern` with IRC case folding.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();
    glob_match(&pattern, &text)
}

/// Match a `nick!user@host` mask against a wildcarded pattern.
///
/// Convenience wrapper used by the client's ignore filter and by ban-style
/// authorisation rules.
#[inline]
pub fn matches_hostmask(pattern: &str, hostmask: &str) -> bool {
    wildcard_match(pattern, hostmask)
}

// Iterative matcher with backtracking to the most recent '*'.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star: Option<usize> = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star {
            // Mismatch: let the last '*' consume one more character.
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question_mark() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("test*", "testing"));
        assert!(wildcard_match("*test", "unittest"));
        assert!(wildcard_match("*test*", "unittesting"));
        assert!(wildcard_match("te?t", "test"));
        assert!(!wildcard_match("te?t", "tet"));
        assert!(!wildcard_match("te?t", "tests"));
    }

    #[test]
    fn case_folding_applies() {
        assert!(wildcard_match("TEST*", "testing"));
        assert!(wildcard_match("nick[*]", "NICK{abc}"));
    }

    #[test]
    fn multiple_stars_backtrack() {
        assert!(wildcard_match("*a*b*c*", "xaybzc"));
        assert!(wildcard_match("**", "x"));
        assert!(!wildcard_match("", "something"));
        assert!(wildcard_match("", ""));
    }

    #[test]
    fn hostmask_patterns() {
        assert!(matches_hostmask("nick!*@*", "nick!~user@host.com"));
        assert!(matches_hostmask("*!*@*.example.net", "other!~u@a.example.net"));
        assert!(!matches_hostmask("nick!*@*", "othernick!~user@example.net"));
    }
}
