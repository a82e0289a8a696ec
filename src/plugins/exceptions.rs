//! The exception logger.
//!
//! Plugins never let failures escape into the bus; they convert them into
//! `on_exception` publishes. This plugin is the consumer of those reports.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::bus::{channels, Bus, Payload};
use crate::error::PluginError;
use crate::plugin::{Plugin, PluginContext};

const EXCEPTIONS: &str = "core.exceptions";

/// Logs every `on_exception` report.
pub struct ExceptionLogger {
    bus: Arc<Bus>,
}

impl ExceptionLogger {
    /// Factory registered under `core.exceptions`.
    pub fn create(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(ExceptionLogger {
            bus: Arc::clone(&ctx.bus),
        }))
    }
}

#[async_trait]
impl Plugin for ExceptionLogger {
    fn identity(&self) -> &str {
        EXCEPTIONS
    }

    async fn start(&self) -> Result<(), PluginError> {
        self.bus
            .subscribe(channels::ON_EXCEPTION, EXCEPTIONS, |sender, payload| {
                if let Payload::Exception { origin, detail } = payload {
                    error!(%origin, %sender, "{detail}");
                }
            });
        Ok(())
    }

    async fn stop(&self) {
        self.bus.unsubscribe_all(EXCEPTIONS);
    }
}
