use prestart_core::{PrestartError, Result, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

/// The layers of a [`SettingsStore`], highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Values written through [`SettingsStore::set`].
    Overrides,
    File,
    Env,
    Defaults,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Overrides,
        LayerKind::File,
        LayerKind::Env,
        LayerKind::Defaults,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Overrides => "overrides",
            LayerKind::File => "file",
            LayerKind::Env => "env",
            LayerKind::Defaults => "defaults",
        }
    }
}

/// Layered key/value settings with a merged read view.
///
/// The environment layer is read-only except while an [`EnvWriteGuard`]
/// returned by [`SettingsStore::unlock_env`] is alive.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    overrides: BTreeMap<String, Value>,
    file: BTreeMap<String, Value>,
    env: BTreeMap<String, Value>,
    defaults: BTreeMap<String, Value>,
    env_read_only: bool,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            file: BTreeMap::new(),
            env: BTreeMap::new(),
            defaults: BTreeMap::new(),
            env_read_only: true,
        }
    }
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the file layer.
    pub fn load_file(&mut self, values: BTreeMap<String, Value>) {
        self.file = values;
    }

    /// Replace the environment layer. Loading is not a write, so the
    /// read-only lock does not apply.
    pub fn load_env(&mut self, values: BTreeMap<String, Value>) {
        self.env = values;
    }

    /// Register defaults. Existing defaults for the same keys are replaced;
    /// higher layers still win on read.
    pub fn defaults<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in values {
            self.defaults.insert(k.into(), v.into());
        }
    }

    /// Merged lookup across all layers.
    pub fn get(&self, key: &str) -> Option<&Value> {
        LayerKind::ALL
            .iter()
            .find_map(|kind| self.layer(*kind).get(key))
    }

    /// Merged lookup that treats falsy values (`false`, `0`, `""`) as absent.
    pub fn get_truthy(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| v.is_truthy())
    }

    /// String form of the merged value, if any.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Write a value. It always lands in the overrides layer, and also in the
    /// environment layer while that layer is unlocked.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if !self.env_read_only {
            self.env.insert(key.clone(), value.clone());
        }
        self.overrides.insert(key, value);
    }

    /// Write directly into the environment layer.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        if self.env_read_only {
            return Err(PrestartError::ReadOnlyLayer(LayerKind::Env.name()));
        }
        self.env.insert(key.into(), value.into());
        Ok(())
    }

    pub fn is_env_read_only(&self) -> bool {
        self.env_read_only
    }

    /// Make the environment layer writable until the returned guard drops.
    pub fn unlock_env(&mut self) -> EnvWriteGuard<'_> {
        self.env_read_only = false;
        EnvWriteGuard { store: self }
    }

    pub fn layer(&self, kind: LayerKind) -> &BTreeMap<String, Value> {
        match kind {
            LayerKind::Overrides => &self.overrides,
            LayerKind::File => &self.file,
            LayerKind::Env => &self.env,
            LayerKind::Defaults => &self.defaults,
        }
    }

    /// Every key defined in any layer, sorted.
    pub fn keys(&self) -> BTreeSet<&str> {
        LayerKind::ALL
            .iter()
            .flat_map(|kind| self.layer(*kind).keys().map(String::as_str))
            .collect()
    }
}

/// Write access to the environment layer. Restores the read-only lock on
/// drop, including during unwinding.
pub struct EnvWriteGuard<'a> {
    store: &'a mut SettingsStore,
}

impl Deref for EnvWriteGuard<'_> {
    type Target = SettingsStore;

    fn deref(&self) -> &SettingsStore {
        self.store
    }
}

impl DerefMut for EnvWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut SettingsStore {
        self.store
    }
}

impl Drop for EnvWriteGuard<'_> {
    fn drop(&mut self) {
        self.store.env_read_only = true;
    }
}
