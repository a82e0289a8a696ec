//! The runtime configuration document.
//!
//! Configuration is read from a TOML file at startup into a mutable,
//! lock-guarded [`ConfigDocument`]. Core code and plugins address it with
//! dotted paths; plugin settings live under the
//! `module_config.<namespace>.<plugin>.<key>` convention and a top-level
//! `modules` array names the plugins to auto-load.
//!
//! Plugins do not touch the document directly. Each gets a [`ConfigView`]
//! that walks its registered locations most-specific-first, then its layered
//! default tables, and publishes `config_changed` on writes so the manager
//! persists the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use toml::value::Table;
use toml::Value;

use crate::bus::{channels, Bus, Payload};
use crate::error::ConfigError;

/// Resolve a dotted path inside a table.
///
/// A missing segment yields [`ConfigError::KeyMissing`]; a present segment
/// that is not a table while more segments remain yields
/// [`ConfigError::TypeMismatch`] - the two cases are deliberately distinct.
fn lookup<'a>(root: &'a Table, path: &str) -> Result<&'a Value, ConfigError> {
    let mut table = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = table
            .get(segment)
            .ok_or_else(|| ConfigError::KeyMissing(path.to_owned()))?;
        if segments.peek().is_none() {
            return Ok(value);
        }
        table = value.as_table().ok_or_else(|| ConfigError::TypeMismatch {
            path: path.to_owned(),
            segment: segment.to_owned(),
        })?;
    }
    Err(ConfigError::KeyMissing(path.to_owned()))
}

/// Write a dotted path inside a table, creating intermediate tables.
fn insert(root: &mut Table, path: &str, value: Value) -> Result<(), ConfigError> {
    let mut table = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return Ok(());
        }
        let entry = table
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Table(Table::new()));
        table = entry.as_table_mut().ok_or_else(|| ConfigError::TypeMismatch {
            path: path.to_owned(),
            segment: segment.to_owned(),
        })?;
    }
    Err(ConfigError::KeyMissing(path.to_owned()))
}

struct Inner {
    root: Table,
    path: Option<PathBuf>,
}

/// The process-wide configuration document, one coarse lock for readers and
/// writers alike.
pub struct ConfigDocument {
    inner: Mutex<Inner>,
}

impl ConfigDocument {
    /// Load a document from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, ConfigError> {
        let content = std::fs::read_to_string(&path)?;
        let root: Table = toml::from_str(&content)?;
        Ok(Arc::new(ConfigDocument {
            inner: Mutex::new(Inner {
                root,
                path: Some(path.as_ref().to_owned()),
            }),
        }))
    }

    /// Build a document from an in-memory table (no backing file).
    pub fn from_table(root: Table) -> Arc<Self> {
        Arc::new(ConfigDocument {
            inner: Mutex::new(Inner { root, path: None }),
        })
    }

    /// Re-read the backing file, replacing the in-memory document.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock();
        let path = inner.path.clone().ok_or(ConfigError::NoBackingFile)?;
        let content = std::fs::read_to_string(path)?;
        inner.root = toml::from_str(&content)?;
        Ok(())
    }

    /// Write the document back to its backing file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let inner = self.inner.lock();
        let path = inner.path.clone().ok_or(ConfigError::NoBackingFile)?;
        let rendered = toml::to_string_pretty(&inner.root)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// Read the value at a dotted path.
    pub fn get_path(&self, path: &str) -> Result<Value, ConfigError> {
        let inner = self.inner.lock();
        lookup(&inner.root, path).cloned()
    }

    /// Write a value at a dotted path, creating intermediate tables.
    pub fn set_path(&self, path: &str, value: Value) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock();
        insert(&mut inner.root, path, value)
    }

    /// The top-level `modules` auto-load list.
    pub fn modules(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .root
            .get("modules")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the `modules` list (persisted by the manager afterwards).
    pub fn set_modules(&self, modules: &[String]) {
        let mut inner = self.inner.lock();
        inner.root.insert(
            "modules".to_owned(),
            Value::Array(modules.iter().map(|m| Value::String(m.clone())).collect()),
        );
    }
}

/// A plugin's layered view of the configuration document.
///
/// Lookup order for `get`: registered locations in reverse registration
/// order (most specific first), then registered default tables in reverse
/// registration order. Writes go to the most recently registered location.
pub struct ConfigView {
    doc: Arc<ConfigDocument>,
    bus: Arc<Bus>,
    owner: String,
    locations: Vec<(String, String)>,
    defaults: Vec<Table>,
}

impl ConfigView {
    /// Create an empty view for `owner` (the plugin's identity string).
    pub fn new(doc: Arc<ConfigDocument>, bus: Arc<Bus>, owner: &str) -> Self {
        ConfigView {
            doc,
            bus,
            owner: owner.to_owned(),
            locations: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Register a `(namespace, name)` location under `module_config`.
    pub fn register_location(&mut self, namespace: &str, name: &str) {
        self.locations.push((namespace.to_owned(), name.to_owned()));
    }

    /// Register a table of defaults, consulted after all locations.
    pub fn register_defaults(&mut self, defaults: Table) {
        self.defaults.push(defaults);
    }

    fn location_path(namespace: &str, name: &str, key: &str) -> String {
        format!("module_config.{namespace}.{name}.{key}")
    }

    /// Look up `key` through the layered locations and defaults.
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        for (namespace, name) in self.locations.iter().rev() {
            match self.doc.get_path(&Self::location_path(namespace, name, key)) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_missing() => continue,
                Err(e) => return Err(e),
            }
        }
        for table in self.defaults.iter().rev() {
            match lookup(table, key) {
                Ok(value) => return Ok(value.clone()),
                Err(e) if e.is_missing() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ConfigError::KeyMissing(key.to_owned()))
    }

    /// Look up `key`, falling back to `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value, ConfigError> {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(e) if e.is_missing() => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Look up `key`; when absent, write `value` to the primary location
    /// and return it.
    pub fn get_auto(&self, key: &str, value: Value) -> Result<Value, ConfigError> {
        match self.get(key) {
            Ok(found) => Ok(found),
            Err(e) if e.is_missing() => {
                self.set(key, value.clone())?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Write `key` into the most recently registered location and announce
    /// the change on `config_changed`.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let (namespace, name) = self
            .locations
            .last()
            .ok_or_else(|| ConfigError::KeyMissing(key.to_owned()))?;
        self.doc
            .set_path(&Self::location_path(namespace, name, key), value)?;
        self.bus
            .publish(channels::CONFIG_CHANGED, &self.owner, &Payload::None);
        Ok(())
    }

    /// String convenience lookup.
    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    /// Integer convenience lookup.
    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).ok().and_then(|v| v.as_integer()).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> Table {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn dotted_lookup_and_distinct_errors() {
        let doc = ConfigDocument::from_table(table(
            r#"
            [a.b]
            c = 1
            leaf = "x"
            "#,
        ));

        assert_eq!(doc.get_path("a.b.c").unwrap().as_integer(), Some(1));
        assert!(matches!(
            doc.get_path("a.b.missing"),
            Err(ConfigError::KeyMissing(_))
        ));
        // `leaf` is a string; traversing through it is a type error.
        assert!(matches!(
            doc.get_path("a.b.leaf.deeper"),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn set_path_creates_intermediates_and_rejects_non_tables() {
        let doc = ConfigDocument::from_table(table("existing = 5"));

        doc.set_path("new.nested.key", Value::Integer(7)).unwrap();
        assert_eq!(doc.get_path("new.nested.key").unwrap().as_integer(), Some(7));

        assert!(matches!(
            doc.set_path("existing.sub", Value::Integer(1)),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn layered_lookup_most_specific_first() {
        let doc = ConfigDocument::from_table(table(
            r#"
            [module_config.core.example]
            shared = "specific"
            only_specific = 1

            [module_config.ext.example]
            only_general = 2
            "#,
        ));
        let bus = Bus::new();
        let mut view = ConfigView::new(doc, bus, "test");
        // Registration order: general first, specific last.
        view.register_location("ext", "example");
        view.register_location("core", "example");
        view.register_defaults(table("shared = \"default-one\"\nfrom_default_one = 10"));
        view.register_defaults(table("from_default_two = 20"));

        // Most recently registered location wins.
        assert_eq!(view.get("shared").unwrap().as_str(), Some("specific"));
        // Falls through to the earlier location.
        assert_eq!(view.get("only_general").unwrap().as_integer(), Some(2));
        // Falls through to default layers, most recent first.
        assert_eq!(view.get("from_default_two").unwrap().as_integer(), Some(20));
        assert_eq!(view.get("from_default_one").unwrap().as_integer(), Some(10));
        // Nothing anywhere.
        assert!(view.get("absent").unwrap_err().is_missing());
        assert_eq!(
            view.get_or("absent", Value::Integer(9)).unwrap().as_integer(),
            Some(9)
        );
    }

    #[test]
    fn set_writes_primary_location_and_announces() {
        let doc = ConfigDocument::from_table(Table::new());
        let bus = Bus::new();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(0usize));
        {
            let seen = std::sync::Arc::clone(&seen);
            bus.subscribe(channels::CONFIG_CHANGED, "test", move |_, _| {
                *seen.lock() += 1;
            });
        }

        let mut view = ConfigView::new(Arc::clone(&doc), Arc::clone(&bus), "test");
        view.register_location("core", "example");
        view.set("answer", Value::Integer(42)).unwrap();

        assert_eq!(
            doc.get_path("module_config.core.example.answer")
                .unwrap()
                .as_integer(),
            Some(42)
        );
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn get_auto_writes_and_returns() {
        let doc = ConfigDocument::from_table(Table::new());
        let bus = Bus::new();
        let mut view = ConfigView::new(Arc::clone(&doc), bus, "test");
        view.register_location("core", "example");

        let value = view.get_auto("limit", Value::Integer(3)).unwrap();
        assert_eq!(value.as_integer(), Some(3));
        // Second call reads the stored value.
        let value = view.get_auto("limit", Value::Integer(99)).unwrap();
        assert_eq!(value.as_integer(), Some(3));
    }

    #[test]
    fn modules_list_round_trip() {
        let doc = ConfigDocument::from_table(table("modules = [\"core.client\", \"core.admin\"]"));
        assert_eq!(doc.modules(), vec!["core.client", "core.admin"]);

        doc.set_modules(&["core.client".to_owned()]);
        assert_eq!(doc.modules(), vec!["core.client"]);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[a]\nb = 1\n").unwrap();

        let doc = ConfigDocument::load(&path).unwrap();
        doc.set_path("a.c", Value::Integer(2)).unwrap();
        doc.save().unwrap();

        let doc2 = ConfigDocument::load(&path).unwrap();
        assert_eq!(doc2.get_path("a.c").unwrap().as_integer(), Some(2));

        std::fs::write(&path, "[a]\nb = 7\n").unwrap();
        doc2.reload().unwrap();
        assert_eq!(doc2.get_path("a.b").unwrap().as_integer(), Some(7));
        assert!(doc2.get_path("a.c").is_err());
    }
}
