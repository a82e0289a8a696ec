//! Message-driven command dispatch for plugins.
//!
//! A responder plugin declares its commands in a static table of
//! [`CommandSpec`]s: name, visibility predicates, an optional positional
//! schema, help text, and the handler function. Dispatch walks the table for
//! every chat line that starts with the command prefix; mismatched schemas
//! and failed predicates skip the handler silently, so an unauthorised user
//! learns nothing about commands they cannot run.

use std::collections::BTreeSet;
use std::sync::Arc;

use stray_proto::{Message, Nick, Privmsg, Target};

use crate::bus::{channels, Bus, Payload};
use crate::identity::AuthContext;

/// Fallback help text for undocumented commands.
pub const NO_HELP: &str = "no help available";

/// How many words a schema element consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` words.
    Exact(usize),
    /// Zero or one word.
    Optional,
    /// Any number of words, including none.
    ZeroOrMore,
    /// At least one word.
    OneOrMore,
}

/// One named element of a positional schema.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    /// Display name used in rendered help.
    pub name: &'static str,
    /// Word count this element accepts.
    pub arity: Arity,
}

/// Context the visibility predicates run against. The sender is absent for
/// command-list queries, which carry only a destination and an identity.
pub struct PredicateContext<'a> {
    /// Where the triggering message was sent (or where a listing goes).
    pub target: &'a Target,
    /// Who sent the triggering message, when one exists.
    pub sender: Option<&'a Nick>,
}

/// Visibility predicate over plugin state, context, and identity.
pub type Predicate<P> = fn(&P, &PredicateContext<'_>, &AuthContext) -> bool;

/// A parsed command about to be handled.
pub struct Invocation<'a> {
    /// The chat message that carried the command.
    pub message: &'a Privmsg,
    /// The resolved identity of the sender.
    pub auth: &'a AuthContext,
    /// The command word, without the prefix.
    pub command: &'a str,
    /// The words after the command word.
    pub args: Vec<&'a str>,
}

/// A command table entry.
pub struct CommandSpec<P: ?Sized + 'static> {
    /// Command word, matched after the prefix.
    pub name: &'static str,
    /// Every predicate must pass or the entry is skipped silently.
    pub predicates: &'static [Predicate<P>],
    /// Positional schema, matched against the whole command text with the
    /// command word as element zero. `None` accepts any argument list.
    pub schema: Option<&'static [ArgSpec]>,
    /// Help text shown by listings.
    pub help: Option<&'static str>,
    /// The handler. An `Err` is published on `on_exception`.
    pub handler: fn(&P, &Invocation<'_>) -> Result<(), String>,
}

/// A plugin that reacts to chat traffic through a static command table.
pub trait Responder: Send + Sync + Sized + 'static {
    /// Stable identity string, used as the bus-owner tag and as the origin
    /// of `on_exception` reports.
    fn identity(&self) -> &str;

    /// The static command table.
    fn commands() -> &'static [CommandSpec<Self>] {
        &[]
    }

    /// The prefix a chat line must start with to be treated as a command.
    fn command_prefix(&self) -> String {
        ".".to_owned()
    }

    /// Called for every inbound message, command or not.
    fn on_message(&self, _msg: &Message, _auth: &AuthContext) {}

    /// Called for every inbound chat message, command or not.
    fn on_privmsg(&self, _msg: &Privmsg, _auth: &AuthContext) {}
}

/// True when `word_count` whitespace-split words can satisfy `schema`.
/// The command word itself is schema element zero.
pub fn schema_matches(schema: &[ArgSpec], word_count: usize) -> bool {
    let mut min = 0usize;
    let mut max = Some(0usize);
    for arg in schema {
        match arg.arity {
            Arity::Exact(n) => {
                min += n;
                max = max.map(|m| m + n);
            }
            Arity::Optional => {
                max = max.map(|m| m + 1);
            }
            Arity::ZeroOrMore => {
                max = None;
            }
            Arity::OneOrMore => {
                min += 1;
                max = None;
            }
        }
    }
    word_count >= min && max.is_none_or(|m| word_count <= m)
}

/// Render a schema as a usage fragment, skipping the command word.
fn render_schema(schema: &[ArgSpec]) -> String {
    let mut out = String::new();
    for arg in schema.iter().skip(1) {
        if !out.is_empty() {
            out.push(' ');
        }
        match arg.arity {
            Arity::Exact(_) => {
                out.push('<');
                out.push_str(arg.name);
                out.push('>');
            }
            Arity::Optional => {
                out.push('[');
                out.push_str(arg.name);
                out.push(']');
            }
            Arity::ZeroOrMore => {
                out.push('[');
                out.push_str(arg.name);
                out.push_str(" ...]");
            }
            Arity::OneOrMore => {
                out.push('<');
                out.push_str(arg.name);
                out.push_str(" ...>");
            }
        }
    }
    out
}

/// Run every matching command handler in `plugin`'s table against `msg`.
///
/// `on_message` always fires; `on_privmsg` fires for chat messages; command
/// handlers fire when the text starts with the prefix, the name matches,
/// all predicates pass, and the schema (if any) accepts the word count.
/// Handler errors become `on_exception` publishes, never replies.
pub fn dispatch<P: Responder>(plugin: &P, bus: &Bus, msg: &Message, auth: &AuthContext) {
    plugin.on_message(msg, auth);

    let Ok(privmsg) = Privmsg::try_from(msg) else {
        return;
    };
    plugin.on_privmsg(&privmsg, auth);

    let prefix = plugin.command_prefix();
    let Some(body) = privmsg.text.as_str().strip_prefix(&prefix) else {
        return;
    };
    let words: Vec<&str> = body.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return;
    };

    let ctx = PredicateContext {
        target: &privmsg.target,
        sender: Some(&privmsg.sender),
    };
    for spec in P::commands() {
        if spec.name != command {
            continue;
        }
        if !spec.predicates.iter().all(|p| p(plugin, &ctx, auth)) {
            continue;
        }
        if let Some(schema) = spec.schema {
            if !schema_matches(schema, words.len()) {
                continue;
            }
        }
        let invocation = Invocation {
            message: &privmsg,
            auth,
            command,
            args: args.to_vec(),
        };
        if let Err(detail) = (spec.handler)(plugin, &invocation) {
            bus.publish(
                channels::ON_EXCEPTION,
                plugin.identity(),
                &Payload::Exception {
                    origin: plugin.identity().to_owned(),
                    detail,
                },
            );
        }
    }
}

/// The command names in `plugin`'s table visible under `target`/`auth`.
pub fn visible_commands<P>(plugin: &P, target: &Target, auth: &AuthContext) -> BTreeSet<String>
where
    P: Responder,
{
    let ctx = PredicateContext {
        target,
        sender: None,
    };
    let mut names = BTreeSet::new();
    for spec in P::commands() {
        if spec.predicates.iter().all(|p| p(plugin, &ctx, auth)) {
            names.insert(spec.name.to_owned());
        }
    }
    names
}

/// Usage and help text for a visible command, or [`NO_HELP`].
pub fn help_for<P>(plugin: &P, command: &str, target: &Target, auth: &AuthContext) -> String
where
    P: Responder,
{
    let ctx = PredicateContext {
        target,
        sender: None,
    };
    let prefix = plugin.command_prefix();
    let mut lines = Vec::new();
    for spec in P::commands() {
        if spec.name != command {
            continue;
        }
        if !spec.predicates.iter().all(|p| p(plugin, &ctx, auth)) {
            continue;
        }
        let usage = match spec.schema {
            Some(schema) => {
                let rendered = render_schema(schema);
                if rendered.is_empty() {
                    format!("{prefix}{command}")
                } else {
                    format!("{prefix}{command} {rendered}")
                }
            }
            None => format!("{prefix}{command}"),
        };
        lines.push(format!("{usage}: {}", spec.help.unwrap_or(NO_HELP)));
    }
    if lines.is_empty() {
        NO_HELP.to_owned()
    } else {
        lines.join("; ")
    }
}

/// Subscribe `plugin`'s dispatcher on the bus. Authenticated responders
/// listen on `auth_message_in` and receive the resolved identity; plain
/// responders listen on `message_in` with an anonymous identity.
pub fn attach<P: Responder + 'static>(plugin: &Arc<P>, bus: &Arc<Bus>, authenticated: bool) {
    let channel = if authenticated {
        channels::AUTH_MESSAGE_IN
    } else {
        channels::MESSAGE_IN
    };
    let owner = plugin.identity().to_owned();
    let plugin = Arc::clone(plugin);
    let bus_for_handler = Arc::clone(bus);
    bus.subscribe(channel, &owner, move |_, payload| match payload {
        Payload::Message(msg) if !authenticated => {
            dispatch(
                plugin.as_ref(),
                &bus_for_handler,
                msg,
                &AuthContext::anonymous(),
            );
        }
        Payload::AuthMessage(msg, auth) if authenticated => {
            dispatch(plugin.as_ref(), &bus_for_handler, msg, auth);
        }
        _ => {}
    });
}
