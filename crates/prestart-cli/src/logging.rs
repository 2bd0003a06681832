use chrono::Local;
use prestart_config::ResolvedSettings;
use prestart_core::{PrestartError, Result};
use std::fmt;
use std::sync::{Mutex, Once};
use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, reload};

/// One stage of the log formatting pipeline, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatStage {
    Colorize,
    Timestamp,
    Json,
    /// Human-readable timestamp, bound port and process id before the level.
    LevelPrefix { port: String, pid: u32 },
    /// Interpolate event fields into the message.
    Splat,
    Simple,
}

/// Where formatted lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSpec {
    /// Standard output. With `handle_exceptions`, panics are logged too.
    Console { handle_exceptions: bool },
}

/// A complete logging configuration, rebuilt from scratch on every call to
/// [`LogPipeline::from_settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPipeline {
    pub stages: Vec<FormatStage>,
    pub level: String,
    pub sink: SinkSpec,
}

impl LogPipeline {
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        let mut stages = Vec::new();
        if settings.get_str("log-colorize").as_deref() != Some("false") {
            stages.push(FormatStage::Colorize);
        }

        if settings
            .get("json-logging")
            .is_some_and(|v| !v.to_string().is_empty())
        {
            stages.push(FormatStage::Timestamp);
            stages.push(FormatStage::Json);
        } else {
            stages.push(FormatStage::LevelPrefix {
                port: settings.get_str("port").unwrap_or_default(),
                pid: std::process::id(),
            });
            stages.push(FormatStage::Splat);
            stages.push(FormatStage::Simple);
        }

        let level = match settings.get("log-level").filter(|v| v.is_truthy()) {
            Some(level) => level.to_string(),
            None if settings.is_production() => "info".to_string(),
            None => "verbose".to_string(),
        };

        Self {
            stages,
            level,
            sink: SinkSpec::Console {
                handle_exceptions: true,
            },
        }
    }

    pub fn colorize(&self) -> bool {
        self.stages.contains(&FormatStage::Colorize)
    }

    pub fn is_json(&self) -> bool {
        self.stages.contains(&FormatStage::Json)
    }

    pub fn level_filter(&self) -> LevelFilter {
        level_filter_for(&self.level)
    }

    fn format_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let SinkSpec::Console { .. } = self.sink;
        let ansi = self.colorize();
        if self.is_json() {
            return tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(ansi)
                .with_writer(std::io::stdout)
                .boxed();
        }

        let stamp = self
            .stages
            .iter()
            .find_map(|stage| match stage {
                FormatStage::LevelPrefix { port, pid } => Some(ProcessStamp {
                    port: port.clone(),
                    pid: *pid,
                }),
                _ => None,
            })
            .unwrap_or_else(|| ProcessStamp {
                port: String::new(),
                pid: std::process::id(),
            });
        tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_timer(stamp)
            .with_target(false)
            .with_writer(std::io::stdout)
            .boxed()
    }
}

/// Map level names onto `tracing` levels. Unknown names fall back to INFO.
pub fn level_filter_for(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "info" | "http" => LevelFilter::INFO,
        "verbose" | "debug" => LevelFilter::DEBUG,
        "silly" | "trace" => LevelFilter::TRACE,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// `Tue Mar 05 2024 14:02:11 GMT+0100 [4567/1234] -`
struct ProcessStamp {
    port: String,
    pid: u32,
}

impl FormatTime for ProcessStamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(
            w,
            "{} [{}/{}] -",
            Local::now().format("%a %b %d %Y %H:%M:%S GMT%z"),
            self.port,
            self.pid
        )
    }
}

// ── Installation ───────────────────────────────────────────────

type FilterLayer = reload::Layer<LevelFilter, Registry>;
type Base = Layered<FilterLayer, Registry>;
type FormatLayer = Box<dyn Layer<Base> + Send + Sync>;

struct Handles {
    filter: reload::Handle<LevelFilter, Registry>,
    format: reload::Handle<FormatLayer, Base>,
}

/// Reload handles of the process-wide subscriber, set by the first
/// successful install and shared by every configurator.
static HANDLES: Mutex<Option<Handles>> = Mutex::new(None);

/// Whether the process can install formatting pipelines. Chosen once at
/// startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBackend {
    Structured,
    /// `configure` is a no-op.
    Plain,
}

/// Installs and replaces the process-wide logging configuration. Any
/// number of configurators may exist; they all drive the same subscriber.
pub struct LoggingConfigurator {
    backend: LogBackend,
    active: Option<LogPipeline>,
}

impl LoggingConfigurator {
    pub fn new(backend: LogBackend) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    pub fn backend(&self) -> LogBackend {
        self.backend
    }

    /// The pipeline installed by this configurator's last successful
    /// `configure`.
    pub fn active(&self) -> Option<&LogPipeline> {
        self.active.as_ref()
    }

    /// Build a pipeline from `settings` and install it, fully replacing
    /// whatever the previous call installed.
    pub fn configure(&mut self, settings: &ResolvedSettings) -> Result<()> {
        if self.backend == LogBackend::Plain {
            return Ok(());
        }

        let pipeline = LogPipeline::from_settings(settings);
        let filter = pipeline.level_filter();
        let format: FormatLayer = pipeline.format_layer();

        let mut handles = HANDLES.lock().map_err(logging_error)?;
        match handles.as_ref() {
            Some(handles) => {
                handles.filter.reload(filter).map_err(logging_error)?;
                handles.format.reload(format).map_err(logging_error)?;
            }
            None => {
                let (filter_layer, filter) = reload::Layer::new(filter);
                let (format_layer, format) = reload::Layer::new(format);
                tracing_subscriber::registry()
                    .with(filter_layer)
                    .with(format_layer)
                    .try_init()
                    .map_err(logging_error)?;
                *handles = Some(Handles { filter, format });
            }
        }

        drop(handles);

        if let SinkSpec::Console {
            handle_exceptions: true,
        } = pipeline.sink
        {
            install_panic_hook();
        }

        self.active = Some(pipeline);
        Ok(())
    }
}

fn logging_error(e: impl fmt::Display) -> PrestartError {
    PrestartError::Logging(e.to_string())
}

static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(panic = %info, "uncaught panic");
            previous(info);
        }));
    });
}
