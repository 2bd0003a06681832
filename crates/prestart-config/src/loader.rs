use prestart_core::{PrestartError, Result, Value, parse_flag};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::schema::*;
use crate::store::SettingsStore;
use crate::urls::UrlDescriptor;

/// Separator between namespace segments in flattened keys.
const KEY_SEPARATOR: &str = ":";
/// Environment names use this in place of [`KEY_SEPARATOR`].
const ENV_SEPARATOR: &str = "__";

// ── Environment ────────────────────────────────────────────────

/// An explicit snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((name.into(), value.into()));
        self
    }

    /// Last value set for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Environment layer contents: `a__b` becomes `a:b`, values stay strings.
    fn into_layer(self) -> BTreeMap<String, Value> {
        self.vars
            .into_iter()
            .map(|(k, v)| (k.replace(ENV_SEPARATOR, KEY_SEPARATOR), Value::String(v)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

// ── Loader ─────────────────────────────────────────────────────

/// Locates the config file and runs the resolution pipeline.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > PRESTART_CONFIG > `{base_dir}/config.json`.
    ///
    /// The fallback location is only used if it exists; the other two are
    /// returned as-is so that a missing file surfaces as an error.
    pub fn resolve_path(
        explicit: Option<&Path>,
        env: &Environment,
        paths: &InstallPaths,
    ) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Some(p) = env.get("PRESTART_CONFIG").filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(p));
        }
        let fallback = paths.base_dir.join("config.json");
        fallback.exists().then_some(fallback)
    }

    /// Locate the config file and resolve the settings.
    pub fn load(
        explicit: Option<&Path>,
        env: Environment,
        package: &PackageMetadata,
        paths: &InstallPaths,
    ) -> Result<ResolvedSettings> {
        let config_path = Self::resolve_path(explicit, &env, paths);
        resolve(config_path.as_deref(), env, package, paths)
    }

    /// Parse a config file into a flat layer. `.json` files are JSON, anything
    /// else is TOML. Nested tables flatten to `:`-joined keys.
    pub fn read_layer(path: &Path) -> Result<BTreeMap<String, Value>> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PrestartError::ConfigNotFound(path.to_path_buf()),
            _ => PrestartError::Io(e),
        })?;
        let parse_error = |reason: String| PrestartError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        };

        let mut layer = BTreeMap::new();
        if path.extension().is_some_and(|ext| ext == "json") {
            let doc: serde_json::Value =
                serde_json::from_str(&raw).map_err(|e| parse_error(e.to_string()))?;
            let serde_json::Value::Object(map) = doc else {
                return Err(parse_error("top level must be an object".into()));
            };
            flatten_json("", &map, &mut layer);
        } else {
            let table: toml::Table = toml::from_str(&raw).map_err(|e| parse_error(e.to_string()))?;
            flatten_toml("", &table, &mut layer);
        }
        Ok(layer)
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_SEPARATOR}{key}")
    }
}

fn flatten_json(
    prefix: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    out: &mut BTreeMap<String, Value>,
) {
    for (key, value) in map {
        let key = join_key(prefix, key);
        match value {
            serde_json::Value::Object(nested) => flatten_json(&key, nested, out),
            other => {
                if let Some(v) = Value::from_json(other) {
                    out.insert(key, v);
                }
            }
        }
    }
}

fn flatten_toml(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, Value>) {
    for (key, value) in table {
        let key = join_key(prefix, key);
        match value {
            toml::Value::Table(nested) => flatten_toml(&key, nested, out),
            other => {
                if let Some(v) = toml_scalar(other) {
                    out.insert(key, v);
                }
            }
        }
    }
}

fn toml_scalar(value: &toml::Value) -> Option<Value> {
    match value {
        toml::Value::String(s) => Some(Value::String(s.clone())),
        toml::Value::Integer(i) => Some(Value::Integer(*i)),
        toml::Value::Float(f) => Some(Value::Float(*f)),
        toml::Value::Boolean(b) => Some(Value::Bool(*b)),
        toml::Value::Datetime(d) => Some(Value::String(d.to_string())),
        toml::Value::Array(items) => {
            Some(Value::Array(items.iter().filter_map(toml_scalar).collect()))
        }
        toml::Value::Table(_) => None,
    }
}

// ── Resolution pipeline ────────────────────────────────────────

/// Build the resolved settings from a config file, the environment and the
/// package metadata.
///
/// Fails if `config_file` is given but cannot be read or parsed, or if the
/// `url` setting is malformed. A missing `url` only skips URL derivation.
pub fn resolve(
    config_file: Option<&Path>,
    env: Environment,
    package: &PackageMetadata,
    paths: &InstallPaths,
) -> Result<ResolvedSettings> {
    let mut store = SettingsStore::new();

    if let Some(path) = config_file {
        info!(config_path = %path.display(), "loading configuration");
        store.load_file(ConfigLoader::read_layer(path)?);
    }
    store.load_env(env.into_layer());

    apply_defaults(&mut store, package, paths);
    coerce_flags(&mut store);

    let run_jobs = flag(&store, "isPrimary") && !flag(&store, "jobsDisabled");
    store.set("runJobs", run_jobs);

    resolve_paths(&mut store, paths)?;

    store.set("upload_url", UPLOAD_URL);
    if store.get_truthy("sessionKey").is_none() {
        store.set("sessionKey", DEFAULT_SESSION_KEY);
    }

    let url = match store.get_truthy("url").map(ToString::to_string) {
        Some(raw) => Some(derive_url_settings(&mut store, &raw)?),
        None => {
            debug!("no url configured, skipping url derivation");
            None
        }
    };

    Ok(ResolvedSettings::from_store(store, url))
}

fn apply_defaults(store: &mut SettingsStore, package: &PackageMetadata, paths: &InstallPaths) {
    store.defaults([
        ("base_dir", Value::from(path_string(&paths.base_dir))),
        ("themes_path", Value::from(path_string(&paths.themes))),
        ("upload_path", Value::from(DEFAULT_UPLOAD_PATH)),
        ("views_dir", Value::from(path_string(&paths.base_dir.join(VIEWS_DIR)))),
        ("version", Value::from(package.version.as_str())),
        ("isCluster", Value::Bool(false)),
        ("isPrimary", Value::Bool(true)),
        ("jobsDisabled", Value::Bool(false)),
    ]);
}

/// Rewrite every flag key as a real boolean. The environment layer stays
/// unlocked only for the duration of the loop.
pub(crate) fn coerce_flags(store: &mut SettingsStore) {
    let mut store = store.unlock_env();
    for key in FLAG_KEYS {
        let value = store.get(key).is_some_and(parse_flag);
        store.set(key, value);
    }
}

fn flag(store: &SettingsStore, key: &str) -> bool {
    store.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn resolve_paths(store: &mut SettingsStore, paths: &InstallPaths) -> Result<()> {
    let themes = resolve_against(&paths.base_dir, &setting_path(store, "themes_path"))?;
    store.set("themes_path", path_string(&themes));
    store.set(
        "core_templates_path",
        path_string(&resolve_against(&paths.base_dir, Path::new(CORE_TEMPLATES_DIR))?),
    );
    store.set(
        "base_templates_path",
        path_string(&themes.join(BASE_THEME_TEMPLATES_DIR)),
    );

    let upload = resolve_against(
        &setting_path(store, "base_dir"),
        &setting_path(store, "upload_path"),
    )?;
    store.set("upload_path", path_string(&upload));
    Ok(())
}

fn derive_url_settings(store: &mut SettingsStore, raw: &str) -> Result<UrlSettings> {
    let url = UrlDescriptor::parse(raw)?;
    let relative_path = url.relative_path();

    let asset_base_url = match store.get_truthy("asset_base_url") {
        Some(existing) => existing.to_string(),
        None => format!("{relative_path}/assets"),
    };
    let port = resolve_port(store, &url);
    let domain = store
        .get_truthy("cookieDomain")
        .map(ToString::to_string)
        .unwrap_or_else(|| url.hostname.clone());
    let socket_origins = store
        .get_truthy("socket.io:origins")
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("{}//{}:*", url.protocol, domain));

    let settings = UrlSettings {
        base_url: url.base_url(),
        secure: url.is_secure(),
        use_port: url.port.is_some(),
        relative_path,
        asset_base_url,
        port: port.to_string(),
        domain,
        socket_origins,
    };

    store.set("base_url", settings.base_url.as_str());
    store.set("secure", settings.secure);
    store.set("use_port", settings.use_port);
    store.set("relative_path", settings.relative_path.as_str());
    store.set("asset_base_url", settings.asset_base_url.as_str());
    store.set("port", port);
    store.set("socket.io:origins", settings.socket_origins.as_str());

    debug!(base_url = %settings.base_url, port = %settings.port, "derived url settings");
    Ok(settings)
}

/// First truthy of: `PORT`, `port`, the URL's own port, the setting named by
/// `PORT_ENV_VAR`, then [`DEFAULT_PORT`].
fn resolve_port(store: &SettingsStore, url: &UrlDescriptor) -> Value {
    if let Some(port) = store.get_truthy("PORT") {
        return port.clone();
    }
    if let Some(port) = store.get_truthy("port") {
        return port.clone();
    }
    if let Some(port) = url.port.filter(|p| *p != 0) {
        return Value::from(port);
    }
    if let Some(port) = store
        .get_truthy("PORT_ENV_VAR")
        .and_then(|name| store.get_truthy(&name.to_string()))
    {
        return port.clone();
    }
    Value::Integer(DEFAULT_PORT)
}

// ── Path helpers ───────────────────────────────────────────────

fn setting_path(store: &SettingsStore, key: &str) -> PathBuf {
    PathBuf::from(store.get_string(key).unwrap_or_default())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Join `path` onto `base` unless it is already absolute, anchor a still
/// relative result at the current directory, then normalize `.` and `..`
/// lexically.
pub(crate) fn resolve_against(base: &Path, path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let joined = if joined.is_absolute() {
        joined
    } else {
        std::path::absolute(&joined)?
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    Ok(out)
}
