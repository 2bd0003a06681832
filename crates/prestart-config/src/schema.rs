use prestart_core::{PrestartError, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::store::SettingsStore;

/// Settings coerced to real booleans during resolution.
pub const FLAG_KEYS: [&str; 3] = ["isCluster", "isPrimary", "jobsDisabled"];

pub const DEFAULT_UPLOAD_PATH: &str = "public/uploads";
pub const UPLOAD_URL: &str = "/assets/uploads";
pub const DEFAULT_SESSION_KEY: &str = "express.sid";
pub const DEFAULT_PORT: i64 = 4567;

/// Relative to the install root.
pub const VIEWS_DIR: &str = "build/public/templates";
pub const CORE_TEMPLATES_DIR: &str = "src/views";
/// Relative to the resolved themes directory.
pub const BASE_THEME_TEMPLATES_DIR: &str = "nodebb-theme-persona/templates";

// ── Package metadata ───────────────────────────────────────────

/// Name, version and supported runtime ranges of the host package.
///
/// Deserializes from a `package.json`-shaped document:
/// `{"name": "...", "version": "...", "engines": {"node": ">=18"}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub engines: BTreeMap<String, String>,
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            engines: BTreeMap::new(),
        }
    }

    /// Declare the supported version range for a runtime.
    pub fn with_engine(mut self, engine: impl Into<String>, range: impl Into<String>) -> Self {
        self.engines.insert(engine.into(), range.into());
        self
    }

    pub fn engine_range(&self, engine: &str) -> Option<&str> {
        self.engines.get(engine).map(String::as_str)
    }

    /// Read metadata from a JSON file, or a TOML file with the same shape.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed = if is_json {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        } else {
            toml::from_str(&raw).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| PrestartError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        })
    }
}

// ── Install paths ──────────────────────────────────────────────

/// Fixed locations of the installation, supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub base_dir: PathBuf,
    /// Default themes directory, `{base_dir}/themes`.
    pub themes: PathBuf,
}

impl InstallPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let themes = base_dir.join("themes");
        Self { base_dir, themes }
    }

    pub fn from_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }
}

// ── Resolved settings ──────────────────────────────────────────

/// Settings derived from the `url` setting. Only present when `url` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlSettings {
    pub base_url: String,
    pub secure: bool,
    pub use_port: bool,
    pub relative_path: String,
    pub asset_base_url: String,
    pub port: String,
    /// Cookie domain if configured, otherwise the URL hostname.
    #[serde(skip)]
    pub domain: String,
    #[serde(rename = "socket.io:origins")]
    pub socket_origins: String,
}

/// The fully resolved, internally consistent settings object.
///
/// Typed fields cover everything the host depends on; any other key is
/// reachable through [`ResolvedSettings::get`].
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    pub base_dir: PathBuf,
    pub themes_path: PathBuf,
    pub upload_path: PathBuf,
    pub upload_url: String,
    pub views_dir: PathBuf,
    pub version: String,
    #[serde(rename = "isCluster")]
    pub is_cluster: bool,
    #[serde(rename = "isPrimary")]
    pub is_primary: bool,
    #[serde(rename = "jobsDisabled")]
    pub jobs_disabled: bool,
    #[serde(rename = "runJobs")]
    pub run_jobs: bool,
    pub core_templates_path: PathBuf,
    pub base_templates_path: PathBuf,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(flatten)]
    pub url: Option<UrlSettings>,
    #[serde(skip)]
    store: SettingsStore,
}

impl ResolvedSettings {
    /// Snapshot the typed view of a store that has been through every
    /// resolution pass.
    pub(crate) fn from_store(store: SettingsStore, url: Option<UrlSettings>) -> Self {
        let path = |key: &str| PathBuf::from(store.get_string(key).unwrap_or_default());
        let flag = |key: &str| store.get(key).and_then(Value::as_bool).unwrap_or(false);

        Self {
            base_dir: path("base_dir"),
            themes_path: path("themes_path"),
            upload_path: path("upload_path"),
            upload_url: store.get_string("upload_url").unwrap_or_default(),
            views_dir: path("views_dir"),
            version: store.get_string("version").unwrap_or_default(),
            is_cluster: flag("isCluster"),
            is_primary: flag("isPrimary"),
            jobs_disabled: flag("jobsDisabled"),
            run_jobs: flag("runJobs"),
            core_templates_path: path("core_templates_path"),
            base_templates_path: path("base_templates_path"),
            session_key: store.get_string("sessionKey").unwrap_or_default(),
            url,
            store,
        }
    }

    /// Raw merged lookup of any key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    /// String form of any key.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.store.get_string(key)
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// `APP_ENV` resolves to `production`.
    pub fn is_production(&self) -> bool {
        self.get_str("APP_ENV").as_deref() == Some("production")
    }

    /// Port the host will bind, if the URL settings were derived.
    pub fn port(&self) -> Option<&str> {
        self.url.as_ref().map(|u| u.port.as_str())
    }
}
