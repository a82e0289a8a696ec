//! The in-process event bus.
//!
//! A [`Bus`] is an explicit value owned by the process root and handed to
//! every component that publishes or subscribes; tests construct their own
//! instance for isolation. Channels are named, delivery is synchronous on
//! the publishing thread in registration order, and the bus performs no
//! exception isolation: plugins guard their own handlers and convert
//! internal failures into a publish on [`channels::ON_EXCEPTION`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use stray_proto::{Message, Target};

use crate::identity::AuthContext;

/// Channel names used by the core.
pub mod channels {
    /// Raw inbound messages from the protocol client.
    pub const MESSAGE_IN: &str = "message_in";
    /// Outbound messages for the protocol client to serialize and write.
    pub const MESSAGE_OUT: &str = "message_out";
    /// Inbound messages re-published with a resolved identity attached.
    pub const AUTH_MESSAGE_IN: &str = "auth_message_in";
    /// Caught plugin/manager failures, consumed by the exception logger.
    pub const ON_EXCEPTION: &str = "on_exception";
    /// Request that the manager load a plugin by name.
    pub const MODULE_LOAD: &str = "module_load";
    /// Request that the manager unload a plugin by name.
    pub const MODULE_UNLOAD: &str = "module_unload";
    /// Request that the manager reload a plugin by name.
    pub const MODULE_RELOAD: &str = "module_reload";
    /// Announcement that a plugin finished loading.
    pub const MODULE_LOADED: &str = "module_loaded";
    /// Announcement that a plugin was unloaded.
    pub const MODULE_UNLOADED: &str = "module_unloaded";
    /// Request that the manager re-read the config file.
    pub const CONFIG_RELOAD: &str = "config_reload";
    /// Announcement that the config file was re-read.
    pub const CONFIG_RELOADED: &str = "config_reloaded";
    /// A runtime config mutation happened; the manager persists it.
    pub const CONFIG_CHANGED: &str = "config_changed";
    /// Ask every loaded plugin for its visible commands.
    pub const REQUEST_LIST_COMMANDS: &str = "request_list_commands";
    /// The aggregated, de-duplicated command set.
    pub const LIST_COMMANDS: &str = "list_commands";
}

/// What travels on the bus.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A raw protocol message.
    Message(Message),
    /// A protocol message paired with its resolved identity.
    AuthMessage(Message, AuthContext),
    /// A plugin name (module_load/unload/reload and their announcements).
    Module(String),
    /// A caught failure report.
    Exception {
        /// Who caught it.
        origin: String,
        /// What happened.
        detail: String,
    },
    /// A command-list query for a given context.
    CommandQuery {
        /// Where the answer should be delivered.
        target: Target,
        /// Identity the visibility predicates run against.
        auth: AuthContext,
    },
    /// The aggregated command set answering a [`Payload::CommandQuery`].
    CommandList {
        /// Where the answer should be delivered.
        target: Target,
        /// The de-duplicated command names.
        commands: BTreeSet<String>,
    },
    /// Signal with no data (config_reload and friends).
    None,
}

type Handler = Arc<dyn Fn(&str, &Payload) + Send + Sync>;

struct Subscription {
    owner: String,
    handler: Handler,
}

/// Named-channel publish/subscribe with synchronous fan-out.
#[derive(Default)]
pub struct Bus {
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
}

impl Bus {
    /// Create a fresh, empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Bus::default())
    }

    /// Register `handler` on `channel`. The `owner` tag is used by
    /// [`Bus::unsubscribe_all`] so a plugin can tear down every handler it
    /// registered without enumerating channels.
    pub fn subscribe<F>(&self, channel: &str, owner: &str, handler: F)
    where
        F: Fn(&str, &Payload) + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.lock();
        subs.entry(channel.to_owned()).or_default().push(Subscription {
            owner: owner.to_owned(),
            handler: Arc::new(handler),
        });
    }

    /// Remove every handler registered by `owner`, across all channels.
    pub fn unsubscribe_all(&self, owner: &str) {
        let mut subs = self.subscriptions.lock();
        for list in subs.values_mut() {
            list.retain(|s| s.owner != owner);
        }
    }

    /// Deliver `payload` to every current subscriber of `channel`,
    /// synchronously, in registration order, on the calling thread.
    ///
    /// The subscriber list is snapshotted before delivery, so handlers may
    /// subscribe or publish without deadlocking; a handler that panics
    /// aborts delivery to the remaining subscribers of this call.
    pub fn publish(&self, channel: &str, sender: &str, payload: &Payload) {
        let handlers: Vec<Handler> = {
            let subs = self.subscriptions.lock();
            match subs.get(channel) {
                Some(list) => list.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(sender, payload);
        }
    }

    /// Number of subscriptions on a channel. Test support.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions
            .lock()
            .get(channel)
            .map_or(0, |l| l.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PMutex;

    fn record(log: &Arc<PMutex<Vec<String>>>, entry: impl Into<String>) {
        log.lock().push(entry.into());
    }

    #[test]
    fn delivery_in_registration_order() {
        let bus = Bus::new();
        let log = Arc::new(PMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe("chan", "owner", move |_, _| record(&log, tag));
        }

        bus.publish("chan", "test", &Payload::None);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_all_removes_across_channels() {
        let bus = Bus::new();
        let log = Arc::new(PMutex::new(Vec::new()));

        for chan in ["a", "b"] {
            let gone_log = Arc::clone(&log);
            bus.subscribe(chan, "gone", move |_, _| record(&gone_log, "gone"));
            let kept_log = Arc::clone(&log);
            bus.subscribe(chan, "kept", move |_, _| record(&kept_log, "kept"));
        }

        bus.unsubscribe_all("gone");
        bus.publish("a", "test", &Payload::None);
        bus.publish("b", "test", &Payload::None);

        assert_eq!(*log.lock(), vec!["kept", "kept"]);
        assert_eq!(bus.subscriber_count("a"), 1);
    }

    #[test]
    fn publish_to_unknown_channel_is_a_no_op() {
        let bus = Bus::new();
        bus.publish("nobody", "test", &Payload::None);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = Bus::new();
        let log = Arc::new(PMutex::new(Vec::new()));

        {
            let bus2 = Arc::clone(&bus);
            let log = Arc::clone(&log);
            bus.subscribe("outer", "o", move |_, _| {
                record(&log, "outer");
                bus2.publish("inner", "o", &Payload::None);
            });
        }
        {
            let log = Arc::clone(&log);
            bus.subscribe("inner", "i", move |_, _| record(&log, "inner"));
        }

        bus.publish("outer", "test", &Payload::None);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn sender_tag_is_delivered() {
        let bus = Bus::new();
        let log = Arc::new(PMutex::new(Vec::new()));
        {
            let log = Arc::clone(&log);
            bus.subscribe("chan", "o", move |sender, _| record(&log, sender));
        }
        bus.publish("chan", "core.client", &Payload::None);
        assert_eq!(*log.lock(), vec!["core.client"]);
    }
}
