//! Installs the global subscriber, so this file holds a single test.
//! Every configurator in the process shares that subscriber.

#[cfg(test)]
mod tests {
    use prestart_cli::{FormatStage, LogBackend, LoggingConfigurator};
    use prestart_config::{Environment, InstallPaths, PackageMetadata, ResolvedSettings, resolve};
    use tracing::level_filters::LevelFilter;

    fn settings(env: Environment) -> ResolvedSettings {
        let package = PackageMetadata::new("forum", "1.0.0");
        resolve(None, env, &package, &InstallPaths::new("/srv/forum")).unwrap()
    }

    #[test]
    fn test_configure_replaces_previous_pipeline() {
        let mut logging = LoggingConfigurator::new(LogBackend::Structured);

        let json = settings(
            Environment::new()
                .with("json-logging", "1")
                .with("log-level", "error"),
        );
        logging.configure(&json).unwrap();
        let first = logging.active().unwrap().clone();
        assert!(first.is_json());
        assert_eq!(LevelFilter::current(), LevelFilter::ERROR);
        tracing::error!("json pipeline installed");

        let plain = settings(
            Environment::new()
                .with("log-colorize", "false")
                .with("log-level", "debug"),
        );
        logging.configure(&plain).unwrap();
        let second = logging.active().unwrap().clone();
        assert_ne!(first, second);
        assert!(!second.stages.contains(&FormatStage::Json));
        assert!(!second.stages.contains(&FormatStage::Timestamp));
        assert!(!second.stages.contains(&FormatStage::Colorize));
        assert_eq!(second.stages.last(), Some(&FormatStage::Simple));
        assert_eq!(LevelFilter::current(), LevelFilter::DEBUG);
        tracing::debug!("plain pipeline installed");

        // configuring again with the same settings is harmless
        logging.configure(&plain).unwrap();
        assert_eq!(logging.active(), Some(&second));

        // a fresh configurator drives the already-installed subscriber
        let mut other = LoggingConfigurator::new(LogBackend::Structured);
        assert!(other.active().is_none());
        let warn = settings(
            Environment::new()
                .with("json-logging", "yes")
                .with("log-level", "warn"),
        );
        other.configure(&warn).unwrap();
        assert!(other.active().unwrap().is_json());
        assert_eq!(LevelFilter::current(), LevelFilter::WARN);
        tracing::warn!("second configurator installed");

        // and the first one can still take it back
        logging.configure(&json).unwrap();
        assert_eq!(LevelFilter::current(), LevelFilter::ERROR);
    }
}
