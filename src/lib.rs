//! straybot - an extensible plugin-driven IRC chat agent.
//!
//! The core is four subsystems: the in-process event [`bus`], the plugin
//! lifecycle [`manager`], the wire-protocol [`client`], and the WHOIS-backed
//! [`identity`] resolver. Everything else is a plugin built on those
//! contracts; the protocol value types and codec live in the `stray-proto`
//! crate.

pub mod bus;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod plugin;
pub mod plugins;
