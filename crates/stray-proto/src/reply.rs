//! Well-known numeric replies.
//!
//! Three-digit commands map to this closed set so handlers can dispatch on a
//! symbolic name instead of a string of digits. Only the numerics the bot
//! acts on are listed: registration/MOTD, NAMES, the WHOIS family, and the
//! network-specific "identified to services" variants.

/// A numeric server reply the bot knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // Variants are the standard reply names.
pub enum Reply {
    Welcome,
    YourHost,
    Created,
    MyInfo,
    ISupport,

    Away,
    // 307 is used by several networks (e.g. UnrealIRCd) for "is a
    // registered nick".
    WhoisRegNick,
    WhoisUser,
    WhoisServer,
    WhoisOperator,
    WhoisIdle,
    EndOfWhois,
    WhoisChannels,
    // 320 is a freeform WHOIS line; Freenode-lineage servers used it for
    // "is identified to services".
    WhoisSpecial,
    // 330 "is logged in as" (account name), the ratbox/charybdis form.
    WhoisAccount,

    NameReply,
    EndOfNames,

    Motd,
    MotdStart,
    EndOfMotd,
    ErrNoMotd,

    ErrNoSuchNick,
}

impl Reply {
    /// Map a three-digit command string to a known reply.
    pub fn from_code(command: &str) -> Option<Reply> {
        if command.len() != 3 || !command.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(match command {
            "001" => Reply::Welcome,
            "002" => Reply::YourHost,
            "003" => Reply::Created,
            "004" => Reply::MyInfo,
            "005" => Reply::ISupport,
            "301" => Reply::Away,
            "307" => Reply::WhoisRegNick,
            "311" => Reply::WhoisUser,
            "312" => Reply::WhoisServer,
            "313" => Reply::WhoisOperator,
            "317" => Reply::WhoisIdle,
            "318" => Reply::EndOfWhois,
            "319" => Reply::WhoisChannels,
            "320" => Reply::WhoisSpecial,
            "330" => Reply::WhoisAccount,
            "353" => Reply::NameReply,
            "366" => Reply::EndOfNames,
            "372" => Reply::Motd,
            "375" => Reply::MotdStart,
            "376" => Reply::EndOfMotd,
            "401" => Reply::ErrNoSuchNick,
            "422" => Reply::ErrNoMotd,
            _ => return None,
        })
    }

    /// The numeric code for this reply.
    pub fn code(&self) -> u16 {
        match self {
            Reply::Welcome => 1,
            Reply::YourHost => 2,
            Reply::Created => 3,
            Reply::MyInfo => 4,
            Reply::ISupport => 5,
            Reply::Away => 301,
            Reply::WhoisRegNick => 307,
            Reply::WhoisUser => 311,
            Reply::WhoisServer => 312,
            Reply::WhoisOperator => 313,
            Reply::WhoisIdle => 317,
            Reply::EndOfWhois => 318,
            Reply::WhoisChannels => 319,
            Reply::WhoisSpecial => 320,
            Reply::WhoisAccount => 330,
            Reply::NameReply => 353,
            Reply::EndOfNames => 366,
            Reply::Motd => 372,
            Reply::MotdStart => 375,
            Reply::EndOfMotd => 376,
            Reply::ErrNoSuchNick => 401,
            Reply::ErrNoMotd => 422,
        }
    }
}
