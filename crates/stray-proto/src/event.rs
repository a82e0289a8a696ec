//! Derived event views.
//!
//! Each view is a narrow, validated reading of a raw [`Message`] for one
//! command. Construction fails if the command is wrong, the sender nick is
//! missing or invalid, or the parameter count is short.

use crate::chan::Channel;
use crate::error::MessageParseError;
use crate::message::Message;
use crate::nick::Nick;
use crate::target::{Target, Text};

fn expect_command(msg: &Message, expected: &'static str) -> Result<(), MessageParseError> {
    if msg.command == expected {
        Ok(())
    } else {
        Err(MessageParseError::UnexpectedCommand {
            expected,
            got: msg.command.clone(),
        })
    }
}

fn sender(msg: &Message) -> Result<Nick, MessageParseError> {
    let nick = msg.source_nick().ok_or(MessageParseError::MissingPrefix)?;
    Nick::new(nick)
}

fn param<'a>(
    msg: &'a Message,
    index: usize,
    command: &'static str,
) -> Result<&'a str, MessageParseError> {
    msg.params
        .get(index)
        .map(String::as_str)
        .ok_or(MessageParseError::MissingParams {
            command,
            expected: index + 1,
            got: msg.params.len(),
        })
}

/// A user- or channel-directed chat message (PRIVMSG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privmsg {
    /// Who sent it.
    pub sender: Nick,
    /// Where it was sent.
    pub target: Target,
    /// The message body.
    pub text: Text,
}

impl Privmsg {
    /// Where a reply should go: the channel for channel messages, the
    /// sender for direct messages.
    pub fn reply_target(&self) -> Target {
        match &self.target {
            Target::Channel(_) => self.target.clone(),
            Target::Nick(_) => Target::Nick(self.sender.clone()),
        }
    }
}

impl TryFrom<&Message> for Privmsg {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "PRIVMSG")?;
        Ok(Privmsg {
            sender: sender(msg)?,
            target: Target::parse(param(msg, 0, "PRIVMSG")?)?,
            text: Text::new(param(msg, 1, "PRIVMSG")?)?,
        })
    }
}

/// A channel join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Who joined.
    pub nick: Nick,
    /// The channel joined.
    pub channel: Channel,
}

impl TryFrom<&Message> for Join {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "JOIN")?;
        Ok(Join {
            nick: sender(msg)?,
            channel: Channel::new(param(msg, 0, "JOIN")?)?,
        })
    }
}

/// A channel part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Who left.
    pub nick: Nick,
    /// The channel left.
    pub channel: Channel,
    /// Optional parting message.
    pub reason: Option<String>,
}

impl TryFrom<&Message> for Part {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "PART")?;
        Ok(Part {
            nick: sender(msg)?,
            channel: Channel::new(param(msg, 0, "PART")?)?,
            reason: msg.params.get(1).cloned(),
        })
    }
}

/// A channel kick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kick {
    /// Who issued the kick.
    pub kicker: Nick,
    /// The channel the kick happened in.
    pub channel: Channel,
    /// Who was kicked.
    pub victim: Nick,
    /// Optional kick message.
    pub reason: Option<String>,
}

impl TryFrom<&Message> for Kick {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "KICK")?;
        Ok(Kick {
            kicker: sender(msg)?,
            channel: Channel::new(param(msg, 0, "KICK")?)?,
            victim: Nick::new(param(msg, 1, "KICK")?)?,
            reason: msg.params.get(2).cloned(),
        })
    }
}

/// A network quit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quit {
    /// Who quit.
    pub nick: Nick,
    /// Optional quit message.
    pub reason: Option<String>,
}

impl TryFrom<&Message> for Quit {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "QUIT")?;
        Ok(Quit {
            nick: sender(msg)?,
            reason: msg.params.first().cloned(),
        })
    }
}

/// A server liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    /// The parameters to echo back in the PONG.
    pub params: Vec<String>,
}

impl TryFrom<&Message> for Ping {
    type Error = MessageParseError;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        expect_command(msg, "PING")?;
        Ok(Ping {
            params: msg.params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Message {
        line.parse().unwrap()
    }

    #[test]
    fn privmsg_view() {
        let msg = parse(":nick!~user@host PRIVMSG #channel :hello world");
        let pm = Privmsg::try_from(&msg).unwrap();
        assert_eq!(pm.sender.as_str(), "nick");
        assert!(pm.target.is_channel());
        assert_eq!(pm.text.as_str(), "hello world");
        assert_eq!(pm.reply_target().as_str(), "#channel");
    }

    #[test]
    fn privmsg_to_nick_replies_to_sender() {
        let msg = parse(":nick!~user@host PRIVMSG botname :hi");
        let pm = Privmsg::try_from(&msg).unwrap();
        assert_eq!(pm.reply_target().as_str(), "nick");
    }

    #[test]
    fn privmsg_requires_prefix_and_params() {
        let no_prefix = parse("PRIVMSG #channel :hi");
        assert_eq!(
            Privmsg::try_from(&no_prefix),
            Err(MessageParseError::MissingPrefix)
        );

        let short = parse(":nick!~u@h PRIVMSG #channel");
        assert!(matches!(
            Privmsg::try_from(&short),
            Err(MessageParseError::MissingParams { .. })
        ));
    }

    #[test]
    fn privmsg_rejects_wrong_command() {
        let msg = parse(":nick!~u@h NOTICE #channel :hi");
        assert!(matches!(
            Privmsg::try_from(&msg),
            Err(MessageParseError::UnexpectedCommand { .. })
        ));
    }

    #[test]
    fn join_part_kick_quit_views() {
        let join = Join::try_from(&parse(":nick!~u@h JOIN #c")).unwrap();
        assert_eq!(join.channel.as_str(), "#c");

        let part = Part::try_from(&parse(":nick!~u@h PART #c :bye")).unwrap();
        assert_eq!(part.reason.as_deref(), Some("bye"));

        let kick = Kick::try_from(&parse(":op!~u@h KICK #c victim :out")).unwrap();
        assert_eq!(kick.kicker.as_str(), "op");
        assert_eq!(kick.victim.as_str(), "victim");

        let quit = Quit::try_from(&parse(":nick!~u@h QUIT :gone")).unwrap();
        assert_eq!(quit.reason.as_deref(), Some("gone"));
    }

    #[test]
    fn ping_keeps_params() {
        let ping = Ping::try_from(&parse("PING :irc.example.net")).unwrap();
        assert_eq!(ping.params, vec!["irc.example.net"]);
    }
}
