//! Error types for the protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid UTF-8 bytes in a received line.
    #[error("invalid UTF-8 in line at byte {byte_pos}")]
    InvalidUtf8 {
        /// Byte position where validation failed.
        byte_pos: usize,
    },

    /// Line exceeded the maximum allowed length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Refused to write a line containing an embedded CR or LF.
    #[error("embedded line break in outgoing message")]
    EmbeddedLineBreak,

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The invalid line.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing messages or deriving event views.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Line was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Line had a prefix but no command.
    #[error("missing command")]
    MissingCommand,

    /// A nickname failed validation.
    #[error("invalid nickname: {0}")]
    InvalidNick(String),

    /// A channel name failed validation.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// A message body was empty where text is required.
    #[error("empty text")]
    EmptyText,

    /// An event view was derived from a message with the wrong command.
    #[error("expected {expected}, got {got}")]
    UnexpectedCommand {
        /// The command the view is derived from.
        expected: &'static str,
        /// The command actually present.
        got: String,
    },

    /// Too few parameters for the requested view.
    #[error("{command}: expected at least {expected} params, got {got}")]
    MissingParams {
        /// Command being interpreted.
        command: &'static str,
        /// Minimum parameter count.
        expected: usize,
        /// Actual parameter count.
        got: usize,
    },

    /// A view required a `nick!user@host` prefix that was absent.
    #[error("missing sender prefix")]
    MissingPrefix,
}
