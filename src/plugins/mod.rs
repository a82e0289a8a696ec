//! Built-in plugins. Feature plugins are thin consumers of the core
//! contracts; these two are the ones the core itself depends on.

pub mod admin;
pub mod exceptions;
