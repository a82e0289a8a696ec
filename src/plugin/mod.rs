//! Plugin contract and name resolution.
//!
//! A plugin is resolved from a name string through an explicit factory
//! registry (no runtime reflection): built-ins register under the `core.`
//! namespace, externally supplied plugins under `ext.`. The factory
//! constructs the plugin with the shared bus and config; the manager owns
//! the resulting handle.
//!
//! Identity is a stable string chosen by the plugin author, not the type:
//! hot-reload replaces the instance, and the identity string is what makes
//! "already loaded" checks survive the swap.

pub mod responder;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use stray_proto::Target;

use crate::bus::Bus;
use crate::config::ConfigDocument;
use crate::error::PluginError;
use crate::identity::AuthContext;

/// Shared services handed to every plugin factory.
#[derive(Clone)]
pub struct PluginContext {
    /// The process event bus.
    pub bus: Arc<Bus>,
    /// The process configuration document.
    pub config: Arc<ConfigDocument>,
}

/// The capability set every plugin exposes to the lifecycle manager.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identity string (also the plugin's bus-owner tag).
    fn identity(&self) -> &str;

    /// Start the plugin: subscribe its bus handlers and spawn its task if
    /// it is long-running.
    async fn start(&self) -> Result<(), PluginError>;

    /// Stop the plugin. Must be idempotent, must unblock any in-flight
    /// wait, and must not return until the plugin's task has exited.
    async fn stop(&self);

    /// Command names currently visible for the given context.
    fn all_commands(&self, _target: &Target, _auth: &AuthContext) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// A loaded plugin tracked by the manager.
pub struct PluginHandle {
    /// The plugin's identity string at load time.
    pub identity: String,
    /// The running instance.
    pub plugin: Arc<dyn Plugin>,
}

/// Constructor signature for plugin factories.
pub type PluginFactory = fn(&PluginContext) -> Result<Arc<dyn Plugin>, PluginError>;

/// Explicit name-to-factory table.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// A registry with all built-in plugins registered.
    pub fn with_builtins() -> Self {
        let mut registry = PluginRegistry::new();
        registry.register("core.client", crate::client::IrcClient::create);
        registry.register("core.identity", crate::identity::IdentityPlugin::create);
        registry.register("core.admin", crate::plugins::admin::AdminPlugin::create);
        registry.register(
            "core.exceptions",
            crate::plugins::exceptions::ExceptionLogger::create,
        );
        registry
    }

    /// Register a factory under `name`.
    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.factories.insert(name.to_owned(), factory);
    }

    /// Resolve a plugin name to its factory.
    pub fn resolve(&self, name: &str) -> Result<PluginFactory, PluginError> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPlugin;

    #[async_trait]
    impl Plugin for NullPlugin {
        fn identity(&self) -> &str {
            "ext.null"
        }
        async fn start(&self) -> Result<(), PluginError> {
            Ok(())
        }
        async fn stop(&self) {}
    }

    fn null_factory(_: &PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(NullPlugin))
    }

    #[test]
    fn resolve_known_and_unknown_names() {
        let mut registry = PluginRegistry::new();
        registry.register("ext.null", null_factory);

        assert!(registry.resolve("ext.null").is_ok());
        assert!(matches!(
            registry.resolve("ext.absent"),
            Err(PluginError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = PluginRegistry::with_builtins();
        for name in ["core.client", "core.identity", "core.admin", "core.exceptions"] {
            assert!(registry.resolve(name).is_ok(), "{name} should resolve");
        }
    }
}
