//! Plugin lifecycle management.
//!
//! The manager owns every loaded [`PluginHandle`] and the configuration
//! document. Load, unload, and reload can be called directly or requested
//! over the bus (`module_load`/`module_unload`/`module_reload`, usually
//! published by the admin plugin); bus requests are forwarded to a control
//! task so the work happens off the publishing thread, and their failures
//! are reported on `on_exception` instead of propagating.
//!
//! Successful bus-triggered loads and unloads persist the updated module
//! list back to the config file, so the bot comes back up with the same
//! plugin set it went down with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::{channels, Bus, Payload};
use crate::config::ConfigDocument;
use crate::error::{ConfigError, PluginError};
use crate::plugin::{PluginContext, PluginHandle, PluginRegistry};

const MANAGER: &str = "core.manager";

enum Control {
    Load(String),
    Unload(String),
    Reload(String),
    ConfigReload,
    ConfigChanged,
    Shutdown,
}

/// Owns the loaded plugin set and reacts to lifecycle requests.
pub struct PluginManager {
    bus: Arc<Bus>,
    config: Arc<ConfigDocument>,
    registry: PluginRegistry,
    handles: Mutex<Vec<PluginHandle>>,
    stopped: AtomicBool,
    control: mpsc::UnboundedSender<Control>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Control>>>,
    control_task: Mutex<Option<JoinHandle<()>>>,
}

impl PluginManager {
    /// Build a manager over `bus` and `config` with the given registry.
    pub fn new(bus: Arc<Bus>, config: Arc<ConfigDocument>, registry: PluginRegistry) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(PluginManager {
            bus,
            config,
            registry,
            handles: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            control: tx,
            control_rx: Mutex::new(Some(rx)),
            control_task: Mutex::new(None),
        })
    }

    fn context(&self) -> PluginContext {
        PluginContext {
            bus: Arc::clone(&self.bus),
            config: Arc::clone(&self.config),
        }
    }

    /// Subscribe the manager's bus handlers and spawn the control task.
    pub fn start(self: &Arc<Self>) {
        let Some(rx) = self.control_rx.lock().take() else {
            debug!("manager already started");
            return;
        };
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_control(rx).await });
        *self.control_task.lock() = Some(task);

        for (channel, make) in [
            (
                channels::MODULE_LOAD,
                Control::Load as fn(String) -> Control,
            ),
            (channels::MODULE_UNLOAD, Control::Unload as fn(String) -> Control),
            (channels::MODULE_RELOAD, Control::Reload as fn(String) -> Control),
        ] {
            let control = self.control.clone();
            self.bus.subscribe(channel, MANAGER, move |_, payload| {
                if let Payload::Module(name) = payload {
                    let _ = control.send(make(name.clone()));
                }
            });
        }
        {
            let control = self.control.clone();
            self.bus.subscribe(channels::CONFIG_RELOAD, MANAGER, move |_, _| {
                let _ = control.send(Control::ConfigReload);
            });
        }
        {
            let control = self.control.clone();
            self.bus
                .subscribe(channels::CONFIG_CHANGED, MANAGER, move |_, _| {
                    let _ = control.send(Control::ConfigChanged);
                });
        }
        {
            let manager = Arc::clone(self);
            self.bus
                .subscribe(channels::REQUEST_LIST_COMMANDS, MANAGER, move |_, payload| {
                    if let Payload::CommandQuery { target, auth } = payload {
                        let commands = {
                            let handles = manager.handles.lock();
                            handles
                                .iter()
                                .flat_map(|h| h.plugin.all_commands(target, auth))
                                .collect()
                        };
                        manager.bus.publish(
                            channels::LIST_COMMANDS,
                            MANAGER,
                            &Payload::CommandList {
                                target: target.clone(),
                                commands,
                            },
                        );
                    }
                });
        }
    }

    /// Load every plugin named in the config's `modules` list.
    pub async fn autoload(&self) {
        for name in self.config.modules() {
            if let Err(e) = self.load(&name).await {
                error!(plugin = %name, error = %e, "autoload failed");
                self.report(format!("autoload {name}: {e}"));
            }
        }
    }

    /// Load a plugin by name. Idempotent: a second load of an already
    /// present identity is a no-op and publishes nothing.
    pub async fn load(&self, name: &str) -> Result<(), PluginError> {
        let factory = self.registry.resolve(name)?;
        let plugin = factory(&self.context())?;
        let identity = plugin.identity().to_owned();
        {
            let mut handles = self.handles.lock();
            if handles.iter().any(|h| h.identity == identity) {
                debug!(plugin = %identity, "already loaded");
                return Ok(());
            }
            handles.push(PluginHandle {
                identity: identity.clone(),
                plugin: Arc::clone(&plugin),
            });
        }
        if let Err(e) = plugin.start().await {
            self.handles.lock().retain(|h| h.identity != identity);
            return Err(e);
        }
        info!(plugin = %identity, "loaded");
        self.bus
            .publish(channels::MODULE_LOADED, MANAGER, &Payload::Module(identity));
        Ok(())
    }

    /// Unload a plugin by identity. No-op if it is not loaded.
    pub async fn unload(&self, name: &str) {
        let removed = {
            let mut handles = self.handles.lock();
            handles
                .iter()
                .position(|h| h.identity == name)
                .map(|i| handles.remove(i))
        };
        let Some(handle) = removed else {
            debug!(plugin = %name, "not loaded");
            return;
        };
        handle.plugin.stop().await;
        info!(plugin = %name, "unloaded");
        self.bus.publish(
            channels::MODULE_UNLOADED,
            MANAGER,
            &Payload::Module(handle.identity),
        );
    }

    /// Unload then load, picking up a fresh instance and fresh config.
    pub async fn reload(&self, name: &str) -> Result<(), PluginError> {
        self.unload(name).await;
        self.load(name).await
    }

    /// The identities currently loaded, in load order.
    pub fn loaded(&self) -> Vec<String> {
        self.handles.lock().iter().map(|h| h.identity.clone()).collect()
    }

    /// Stop every plugin and shut the control task down. Idempotent; does
    /// not return until every plugin has fully stopped.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<PluginHandle> = std::mem::take(&mut *self.handles.lock());
        for handle in drained {
            handle.plugin.stop().await;
            debug!(plugin = %handle.identity, "stopped");
        }
        let _ = self.control.send(Control::Shutdown);
        let task = self.control_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.bus.unsubscribe_all(MANAGER);
    }

    fn report(&self, detail: String) {
        self.bus.publish(
            channels::ON_EXCEPTION,
            MANAGER,
            &Payload::Exception {
                origin: MANAGER.to_owned(),
                detail,
            },
        );
    }

    /// Persist the `modules` list after a bus-triggered load/unload.
    fn persist_modules(&self, name: &str, present: bool) {
        let mut modules = self.config.modules();
        let listed = modules.iter().any(|m| m == name);
        match (present, listed) {
            (true, false) => modules.push(name.to_owned()),
            (false, true) => modules.retain(|m| m != name),
            _ => return,
        }
        self.config.set_modules(&modules);
        self.save_config();
    }

    fn save_config(&self) {
        match self.config.save() {
            Ok(()) => {}
            Err(ConfigError::NoBackingFile) => {
                debug!("config has no backing file, not persisted");
            }
            Err(e) => self.report(format!("config save: {e}")),
        }
    }

    async fn run_control(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Control>) {
        while let Some(control) = rx.recv().await {
            match control {
                Control::Load(name) => match self.load(&name).await {
                    Ok(()) => self.persist_modules(&name, true),
                    Err(e) => self.report(format!("load {name}: {e}")),
                },
                Control::Unload(name) => {
                    self.unload(&name).await;
                    self.persist_modules(&name, false);
                }
                Control::Reload(name) => {
                    if let Err(e) = self.reload(&name).await {
                        self.report(format!("reload {name}: {e}"));
                    }
                }
                Control::ConfigReload => match self.config.reload() {
                    Ok(()) => {
                        info!("config reloaded");
                        self.bus
                            .publish(channels::CONFIG_RELOADED, MANAGER, &Payload::None);
                    }
                    Err(e) => self.report(format!("config reload: {e}")),
                },
                Control::ConfigChanged => self.save_config(),
                Control::Shutdown => break,
            }
        }
    }
}
