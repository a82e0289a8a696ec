//! The admin plugin.
//!
//! Listens on `auth_message_in` so every command carries a resolved
//! identity, and gates the lifecycle commands behind the `admin` group.
//! Load/unload/reload are only requests here; the manager does the work and
//! persists the module list. The `commands` command is open to everyone and
//! answers with whatever the listing aggregation says is visible to them.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use stray_proto::{Message, Target};

use crate::bus::{channels, Bus, Payload};
use crate::config::ConfigView;
use crate::error::PluginError;
use crate::identity::AuthContext;
use crate::plugin::responder::{
    self, ArgSpec, Arity, CommandSpec, PredicateContext, Responder,
};
use crate::plugin::{Plugin, PluginContext};

const ADMIN: &str = "core.admin";
const DEFAULT_PREFIX: &str = ".";

fn admin_only(_: &AdminCommands, _: &PredicateContext<'_>, auth: &AuthContext) -> bool {
    auth.in_group("admin")
}

const MODULE_SCHEMA: &[ArgSpec] = &[
    ArgSpec {
        name: "command",
        arity: Arity::Exact(1),
    },
    ArgSpec {
        name: "module",
        arity: Arity::Exact(1),
    },
];

const BARE_SCHEMA: &[ArgSpec] = &[ArgSpec {
    name: "command",
    arity: Arity::Exact(1),
}];

/// The responder core holding the command table.
pub struct AdminCommands {
    bus: Arc<Bus>,
    prefix: String,
}

impl AdminCommands {
    fn request(&self, channel: &'static str, module: &str) {
        self.bus
            .publish(channel, ADMIN, &Payload::Module(module.to_owned()));
    }
}

impl Responder for AdminCommands {
    fn identity(&self) -> &str {
        ADMIN
    }

    fn command_prefix(&self) -> String {
        self.prefix.clone()
    }

    fn commands() -> &'static [CommandSpec<Self>] {
        &[
            CommandSpec {
                name: "load",
                predicates: &[admin_only],
                schema: Some(MODULE_SCHEMA),
                help: Some("load a plugin by name"),
                handler: |p, inv| {
                    p.request(channels::MODULE_LOAD, inv.args[0]);
                    Ok(())
                },
            },
            CommandSpec {
                name: "unload",
                predicates: &[admin_only],
                schema: Some(MODULE_SCHEMA),
                help: Some("unload a plugin by name"),
                handler: |p, inv| {
                    p.request(channels::MODULE_UNLOAD, inv.args[0]);
                    Ok(())
                },
            },
            CommandSpec {
                name: "reload",
                predicates: &[admin_only],
                schema: Some(MODULE_SCHEMA),
                help: Some("reload a plugin by name"),
                handler: |p, inv| {
                    p.request(channels::MODULE_RELOAD, inv.args[0]);
                    Ok(())
                },
            },
            CommandSpec {
                name: "rehash",
                predicates: &[admin_only],
                schema: Some(BARE_SCHEMA),
                help: Some("re-read the config file"),
                handler: |p, _| {
                    p.bus.publish(channels::CONFIG_RELOAD, ADMIN, &Payload::None);
                    Ok(())
                },
            },
            CommandSpec {
                name: "commands",
                predicates: &[],
                schema: Some(BARE_SCHEMA),
                help: Some("list the commands visible to you"),
                handler: |p, inv| {
                    p.bus.publish(
                        channels::REQUEST_LIST_COMMANDS,
                        ADMIN,
                        &Payload::CommandQuery {
                            target: inv.message.reply_target(),
                            auth: inv.auth.clone(),
                        },
                    );
                    Ok(())
                },
            },
        ]
    }
}

/// The plugin wrapper registered under `core.admin`.
pub struct AdminPlugin {
    bus: Arc<Bus>,
    core: Arc<AdminCommands>,
}

impl AdminPlugin {
    /// Factory registered under `core.admin`.
    pub fn create(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        let mut view = ConfigView::new(Arc::clone(&ctx.config), Arc::clone(&ctx.bus), ADMIN);
        view.register_location("core", "admin");
        let prefix = view.str_or("command_prefix", DEFAULT_PREFIX);
        Ok(Arc::new(AdminPlugin {
            bus: Arc::clone(&ctx.bus),
            core: Arc::new(AdminCommands {
                bus: Arc::clone(&ctx.bus),
                prefix,
            }),
        }))
    }
}

#[async_trait]
impl Plugin for AdminPlugin {
    fn identity(&self) -> &str {
        ADMIN
    }

    async fn start(&self) -> Result<(), PluginError> {
        responder::attach(&self.core, &self.bus, true);
        // Relay the aggregated listing back to whoever asked for it.
        let bus = Arc::clone(&self.bus);
        self.bus
            .subscribe(channels::LIST_COMMANDS, ADMIN, move |_, payload| {
                if let Payload::CommandList { target, commands } = payload {
                    let text = if commands.is_empty() {
                        "no commands available".to_owned()
                    } else {
                        commands.iter().cloned().collect::<Vec<_>>().join(", ")
                    };
                    bus.publish(
                        channels::MESSAGE_OUT,
                        ADMIN,
                        &Payload::Message(Message::privmsg(target.as_str(), &text)),
                    );
                }
            });
        Ok(())
    }

    async fn stop(&self) {
        self.bus.unsubscribe_all(ADMIN);
    }

    fn all_commands(&self, target: &Target, auth: &AuthContext) -> BTreeSet<String> {
        responder::visible_commands(self.core.as_ref(), target, auth)
    }
}
