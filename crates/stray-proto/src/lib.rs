//! # stray-proto
//!
//! Protocol support for the Straylight IRC bot: a line codec, a message
//! parser/serializer, validated value types, and narrow event views derived
//! from raw messages.
//!
//! ## Quick Start
//!
//! ```rust
//! use stray_proto::Message;
//!
//! let msg: Message = ":nick!~user@host PRIVMSG #channel :hello world"
//!     .parse()
//!     .expect("valid IRC line");
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.params[1], "hello world");
//! ```
//!
//! Derived views give typed access to the handful of commands the bot
//! dispatches on:
//!
//! ```rust
//! use stray_proto::{Message, Privmsg};
//!
//! let msg: Message = ":nick!~user@host PRIVMSG #channel :hi".parse().unwrap();
//! let pm = Privmsg::try_from(&msg).unwrap();
//! assert_eq!(pm.sender.as_str(), "nick");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod chan;
pub mod error;
pub mod event;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod nick;
pub mod reply;
pub mod target;
pub mod util;

pub use self::casemap::{irc_cmp, irc_eq, irc_lower_char, irc_to_lower};
pub use self::chan::{Channel, CHANNEL_PREFIXES};
pub use self::error::{MessageParseError, ProtocolError};
pub use self::event::{Join, Kick, Part, Ping, Privmsg, Quit};
#[cfg(feature = "tokio")]
pub use self::line::{LineCodec, MAX_LINE_LEN};
pub use self::message::Message;
pub use self::nick::{Nick, MAX_NICK_LEN};
pub use self::reply::Reply;
pub use self::target::{Target, Text};
pub use self::util::{matches_hostmask, wildcard_match};
