//! # prestart-config
//!
//! Startup configuration resolution. Reads a config file (JSON or TOML), the
//! process environment and compiled-in defaults, in that precedence order,
//! then coerces flag settings and derives paths, ports and URL settings.
//!
//! Also hosts the advisory runtime compatibility check.

pub mod compat;
pub mod loader;
pub mod schema;
pub mod store;
pub mod urls;

pub use compat::{Compatibility, check as check_compatibility};
pub use loader::{ConfigLoader, Environment, resolve};
pub use schema::{InstallPaths, PackageMetadata, ResolvedSettings, UrlSettings};
pub use store::{EnvWriteGuard, LayerKind, SettingsStore};
pub use urls::UrlDescriptor;
