use clap::{Parser, Subcommand};
use console::style;
use prestart_config::{
    ConfigLoader, Environment, InstallPaths, PackageMetadata, ResolvedSettings, check_compatibility,
};
use prestart_core::Result;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::logging::{LogBackend, LoggingConfigurator};

/// prestart — resolve layered startup configuration.
#[derive(Parser)]
#[command(name = "prestart", version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file (JSON or TOML). Falls back to PRESTART_CONFIG,
    /// then `<base-dir>/config.json`.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Install root. Defaults to the current directory.
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Package metadata file with `name`, `version` and `engines`.
    #[arg(long, global = true)]
    pub package: Option<PathBuf>,

    /// Running runtime version to check against the package's engine range.
    /// Defaults to the version of the compiler that built prestart.
    pub runtime_version: Option<String>,

    /// Key of the engine range in the package metadata.
    #[arg(long, global = true, default_value = "rust")]
    pub engine: String,

    /// Leave the logging subsystem unconfigured.
    #[arg(long, global = true)]
    pub plain_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the resolved settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a single resolved setting
    Get {
        /// Setting key, e.g. `port` or `socket.io:origins`
        key: String,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = match &self.base_dir {
            Some(dir) => InstallPaths::new(dir),
            None => InstallPaths::from_current_dir()?,
        };
        let package = match &self.package {
            Some(path) => PackageMetadata::from_path(path)?,
            None => Self::own_package(),
        };

        let settings = ConfigLoader::load(
            self.config.as_deref(),
            Environment::from_process(),
            &package,
            &paths,
        )?;

        let backend = if self.plain_logs {
            LogBackend::Plain
        } else {
            LogBackend::Structured
        };
        let mut logging = LoggingConfigurator::new(backend);
        logging.configure(&settings)?;

        match (self.running_version(), package.engine_range(&self.engine)) {
            (Some(version), Some(range)) => {
                check_compatibility(version, range);
            }
            (None, _) => debug!("running version unknown, skipping version check"),
            (_, None) => debug!(
                engine = %self.engine,
                "no engine range declared, skipping version check"
            ),
        }

        match self.command.unwrap_or(Commands::Show { json: false }) {
            Commands::Show { json } => Self::cmd_show(&settings, json),
            Commands::Get { key } => Self::cmd_get(&settings, &key),
        }
    }

    /// The version given on the command line, else the build compiler's.
    fn running_version(&self) -> Option<&str> {
        match self.runtime_version.as_deref() {
            Some(version) => Some(version),
            None => Some(env!("PRESTART_RUSTC_VERSION")).filter(|v| !v.is_empty()),
        }
    }

    /// Metadata of this binary, used when no package file is given.
    fn own_package() -> PackageMetadata {
        let package = PackageMetadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        match env!("CARGO_PKG_RUST_VERSION") {
            "" => package,
            msrv => package.with_engine("rust", format!(">={msrv}")),
        }
    }

    fn cmd_show(settings: &ResolvedSettings, json: bool) -> Result<()> {
        let value = serde_json::to_value(settings)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if let serde_json::Value::Object(map) = value {
            for (key, value) in map {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                println!("{} = {}", style(key).cyan(), rendered);
            }
        }
        Ok(())
    }

    fn cmd_get(settings: &ResolvedSettings, key: &str) -> Result<()> {
        match settings.get(key) {
            Some(value) => println!("{value}"),
            None => warn!(key, "setting is not defined"),
        }
        Ok(())
    }
}
