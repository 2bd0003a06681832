#[cfg(test)]
mod tests {
    use prestart_config::*;
    use prestart_core::{PrestartError, Value};
    use std::path::{Path, PathBuf};

    fn package() -> PackageMetadata {
        PackageMetadata::new("forum", "3.2.1").with_engine("node", ">=18")
    }

    fn paths() -> InstallPaths {
        InstallPaths::new("/srv/forum")
    }

    fn resolve_env(env: Environment) -> ResolvedSettings {
        resolve(None, env, &package(), &paths()).unwrap()
    }

    fn resolve_toml(contents: &str, env: Environment) -> ResolvedSettings {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, contents).unwrap();
        resolve(Some(config_path.as_path()), env, &package(), &paths()).unwrap()
    }

    // ── Defaults ───────────────────────────────────────────────

    #[test]
    fn test_defaults_without_any_source() {
        let settings = resolve_env(Environment::new());
        assert_eq!(settings.base_dir, PathBuf::from("/srv/forum"));
        assert_eq!(settings.themes_path, PathBuf::from("/srv/forum/themes"));
        assert_eq!(settings.upload_path, PathBuf::from("/srv/forum/public/uploads"));
        assert_eq!(settings.upload_url, "/assets/uploads");
        assert_eq!(settings.views_dir, PathBuf::from("/srv/forum/build/public/templates"));
        assert_eq!(settings.version, "3.2.1");
        assert!(!settings.is_cluster);
        assert!(settings.is_primary);
        assert!(!settings.jobs_disabled);
        assert!(settings.run_jobs);
        assert_eq!(settings.core_templates_path, PathBuf::from("/srv/forum/src/views"));
        assert_eq!(
            settings.base_templates_path,
            PathBuf::from("/srv/forum/themes/nodebb-theme-persona/templates")
        );
        assert_eq!(settings.session_key, "express.sid");
    }

    #[test]
    fn test_session_key_kept_when_set() {
        let settings = resolve_toml("sessionKey = \"forum.sid\"\n", Environment::new());
        assert_eq!(settings.session_key, "forum.sid");
    }

    #[test]
    fn test_relative_paths_resolved() {
        let settings = resolve_toml(
            concat!(
                "themes_path = \"../shared/themes\"\n",
                "upload_path = \"data/uploads\"\n",
                "base_dir = \"/opt/forum\"\n",
            ),
            Environment::new(),
        );
        assert_eq!(settings.themes_path, PathBuf::from("/srv/shared/themes"));
        assert_eq!(
            settings.base_templates_path,
            PathBuf::from("/srv/shared/themes/nodebb-theme-persona/templates")
        );
        // upload_path resolves against the base_dir setting, not the install root
        assert_eq!(settings.upload_path, PathBuf::from("/opt/forum/data/uploads"));
        assert_eq!(settings.core_templates_path, PathBuf::from("/srv/forum/src/views"));
    }

    #[test]
    fn test_relative_base_dir_setting_yields_absolute_upload_path() {
        let settings = resolve_toml("base_dir = \"app\"\n", Environment::new());
        let cwd = std::env::current_dir().unwrap();
        assert!(settings.upload_path.is_absolute(), "{:?}", settings.upload_path);
        assert_eq!(settings.upload_path, cwd.join("app/public/uploads"));
    }

    #[test]
    fn test_relative_install_root_yields_absolute_paths() {
        let package = package();
        let paths = InstallPaths::new("forum");
        let settings = resolve(None, Environment::new(), &package, &paths).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(settings.themes_path, cwd.join("forum/themes"));
        assert_eq!(settings.upload_path, cwd.join("forum/public/uploads"));
        assert_eq!(settings.core_templates_path, cwd.join("forum/src/views"));
        assert!(settings.base_templates_path.is_absolute());
    }

    // ── Flag coercion ──────────────────────────────────────────

    #[test]
    fn test_flag_coercion_from_env_strings() {
        let truthy = ["1", "true"];
        let falsy = ["0", "false", "yes", ""];
        for raw in truthy {
            let settings = resolve_env(Environment::new().with("isCluster", raw));
            assert!(settings.is_cluster, "isCluster={raw:?}");
        }
        for raw in falsy {
            let settings = resolve_env(Environment::new().with("isPrimary", raw));
            assert!(!settings.is_primary, "isPrimary={raw:?}");
        }
    }

    #[test]
    fn test_flag_coercion_from_file_types() {
        let settings = resolve_toml(
            "isCluster = 1\nisPrimary = false\njobsDisabled = true\n",
            Environment::new(),
        );
        assert!(settings.is_cluster);
        assert!(!settings.is_primary);
        assert!(settings.jobs_disabled);

        let settings = resolve_toml("isCluster = 0\nisPrimary = \"true\"\n", Environment::new());
        assert!(!settings.is_cluster);
        assert!(settings.is_primary);
    }

    #[test]
    fn test_flags_are_real_booleans_and_env_relocked() {
        let settings = resolve_env(Environment::new().with("jobsDisabled", "1"));
        assert_eq!(settings.get("jobsDisabled"), Some(&Value::Bool(true)));
        assert_eq!(
            settings.store().layer(LayerKind::Env).get("jobsDisabled"),
            Some(&Value::Bool(true))
        );
        assert!(settings.store().is_env_read_only());
    }

    #[test]
    fn test_run_jobs_truth_table() {
        let cases = [
            ("true", "false", true),
            ("true", "true", false),
            ("false", "false", false),
            ("false", "true", false),
        ];
        for (primary, disabled, expected) in cases {
            let settings = resolve_env(
                Environment::new()
                    .with("isPrimary", primary)
                    .with("jobsDisabled", disabled),
            );
            assert_eq!(
                settings.run_jobs, expected,
                "isPrimary={primary} jobsDisabled={disabled}"
            );
        }
    }

    // ── URL derivation ─────────────────────────────────────────

    #[test]
    fn test_url_trailing_slash_stripped() {
        let settings = resolve_env(Environment::new().with("url", "http://example.com/forum/"));
        let url = settings.url.unwrap();
        assert_eq!(url.relative_path, "/forum");
        assert_eq!(url.asset_base_url, "/forum/assets");
        assert_eq!(url.base_url, "http://example.com");
        assert!(!url.secure);
        assert!(!url.use_port);
    }

    #[test]
    fn test_url_root_path_is_empty() {
        let settings = resolve_env(Environment::new().with("url", "http://example.com/"));
        let url = settings.url.unwrap();
        assert_eq!(url.relative_path, "");
        assert_eq!(url.asset_base_url, "/assets");
    }

    #[test]
    fn test_url_secure_and_base_url() {
        let settings = resolve_env(Environment::new().with("url", "https://example.com"));
        let url = settings.url.as_ref().unwrap();
        assert!(url.secure);
        assert_eq!(url.base_url, "https://example.com");
        assert_eq!(settings.get("secure"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_asset_base_url_left_untouched_when_set() {
        let settings = resolve_toml(
            concat!(
                "url = \"http://example.com/forum\"\n",
                "asset_base_url = \"https://cdn.example.com/assets\"\n",
            ),
            Environment::new(),
        );
        assert_eq!(settings.url.unwrap().asset_base_url, "https://cdn.example.com/assets");
    }

    #[test]
    fn test_socket_origins_from_hostname_or_cookie_domain() {
        let settings =
            resolve_env(Environment::new().with("url", "https://forum.example.com:8443/"));
        let url = settings.url.unwrap();
        assert_eq!(url.socket_origins, "https://forum.example.com:*");
        assert!(url.use_port);
        assert_eq!(url.base_url, "https://forum.example.com:8443");

        let settings = resolve_toml(
            "url = \"https://forum.example.com/\"\ncookieDomain = \".example.com\"\n",
            Environment::new(),
        );
        assert_eq!(settings.url.unwrap().socket_origins, "https://.example.com:*");
    }

    #[test]
    fn test_socket_origins_kept_when_set() {
        let settings = resolve_toml(
            concat!(
                "url = \"https://forum.example.com/\"\n\n",
                "[\"socket.io\"]\n",
                "origins = \"https://a.example.com:*\"\n",
            ),
            Environment::new(),
        );
        assert_eq!(settings.url.unwrap().socket_origins, "https://a.example.com:*");
    }

    #[test]
    fn test_missing_url_skips_derivation() {
        let settings = resolve_env(Environment::new());
        assert!(settings.url.is_none());
        assert!(settings.port().is_none());
        for key in [
            "base_url",
            "secure",
            "use_port",
            "relative_path",
            "asset_base_url",
            "socket.io:origins",
        ] {
            assert!(settings.get(key).is_none(), "{key} should be absent");
        }
        let json = serde_json::to_value(&settings).unwrap();
        assert!(json.get("base_url").is_none());
    }

    #[test]
    fn test_malformed_url_is_fatal() {
        let err = resolve(
            None,
            Environment::new().with("url", "://nope"),
            &package(),
            &paths(),
        )
        .unwrap_err();
        assert!(matches!(err, PrestartError::InvalidUrl { .. }));
    }

    // ── Port precedence ────────────────────────────────────────

    #[test]
    fn test_port_env_beats_setting() {
        let settings = resolve_toml(
            "url = \"http://example.com:3000\"\nport = 9090\n",
            Environment::new().with("PORT", "8080"),
        );
        assert_eq!(settings.port(), Some("8080"));
    }

    #[test]
    fn test_port_setting_beats_url() {
        let settings = resolve_toml(
            "url = \"http://example.com:3000\"\nport = 9090\n",
            Environment::new(),
        );
        assert_eq!(settings.port(), Some("9090"));
        assert_eq!(settings.get("port"), Some(&Value::Integer(9090)));
    }

    #[test]
    fn test_port_from_url() {
        let settings = resolve_env(Environment::new().with("url", "http://example.com:3000/"));
        assert_eq!(settings.port(), Some("3000"));
    }

    #[test]
    fn test_port_fallback() {
        let settings = resolve_env(Environment::new().with("url", "http://example.com/"));
        assert_eq!(settings.port(), Some("4567"));
    }

    #[test]
    fn test_port_falsy_values_are_absent() {
        let settings = resolve_toml(
            "url = \"http://example.com:3000\"\nport = 0\nPORT = \"\"\n",
            Environment::new(),
        );
        assert_eq!(settings.port(), Some("3000"));
    }

    #[test]
    fn test_port_env_var_indirection() {
        let settings = resolve_env(
            Environment::new()
                .with("url", "http://example.com/")
                .with("PORT_ENV_VAR", "APP_PORT")
                .with("APP_PORT", "5000"),
        );
        assert_eq!(settings.port(), Some("5000"));

        // the indirection only applies below an explicit URL port
        let settings = resolve_env(
            Environment::new()
                .with("url", "http://example.com:3000/")
                .with("PORT_ENV_VAR", "APP_PORT")
                .with("APP_PORT", "5000"),
        );
        assert_eq!(settings.port(), Some("3000"));

        // an indirection to an unset key falls through to the default
        let settings = resolve_env(
            Environment::new()
                .with("url", "http://example.com/")
                .with("PORT_ENV_VAR", "MISSING"),
        );
        assert_eq!(settings.port(), Some("4567"));
    }

    // ── Config files ───────────────────────────────────────────

    #[test]
    fn test_file_beats_env() {
        let settings = resolve_toml(
            "sessionKey = \"from-file\"\n",
            Environment::new().with("sessionKey", "from-env"),
        );
        assert_eq!(settings.session_key, "from-file");
    }

    #[test]
    fn test_json_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            concat!(
                r#"{"url": "https://example.com/forum", "port": 4568, "#,
                r#""socket.io": {"origins": "*:*"}, "secret": null}"#,
            ),
        )
        .unwrap();

        let settings =
            resolve(Some(config_path.as_path()), Environment::new(), &package(), &paths())
                .unwrap();
        let url = settings.url.unwrap();
        assert_eq!(url.port, "4568");
        assert_eq!(url.socket_origins, "*:*");
        assert_eq!(url.relative_path, "/forum");
    }

    #[test]
    fn test_unreadable_config_is_fatal() {
        let err = resolve(
            Some(Path::new("/nonexistent/config.json")),
            Environment::new(),
            &package(),
            &paths(),
        )
        .unwrap_err();
        assert!(matches!(err, PrestartError::ConfigNotFound(_)));
    }

    #[test]
    fn test_unparsable_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();
        let err = resolve(Some(config_path.as_path()), Environment::new(), &package(), &paths())
            .unwrap_err();
        assert!(matches!(err, PrestartError::ConfigParse { .. }));

        std::fs::write(&config_path, "[1, 2]").unwrap();
        let err = resolve(Some(config_path.as_path()), Environment::new(), &package(), &paths())
            .unwrap_err();
        assert!(matches!(err, PrestartError::ConfigParse { .. }));
    }

    // ── ConfigLoader ───────────────────────────────────────────

    #[test]
    fn test_resolve_path_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(dir.path());
        let env = Environment::new().with("PRESTART_CONFIG", "/etc/forum.toml");

        let explicit = ConfigLoader::resolve_path(Some(Path::new("/tmp/x.json")), &env, &paths);
        assert_eq!(explicit, Some(PathBuf::from("/tmp/x.json")));

        let from_env = ConfigLoader::resolve_path(None, &env, &paths);
        assert_eq!(from_env, Some(PathBuf::from("/etc/forum.toml")));

        assert_eq!(ConfigLoader::resolve_path(None, &Environment::new(), &paths), None);

        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        assert_eq!(
            ConfigLoader::resolve_path(None, &Environment::new(), &paths),
            Some(dir.path().join("config.json"))
        );
    }

    #[test]
    fn test_config_loader_load_default_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"url": "http://localhost:4567"}"#,
        )
        .unwrap();
        let paths = InstallPaths::new(dir.path());

        let settings = ConfigLoader::load(None, Environment::new(), &package(), &paths).unwrap();
        assert_eq!(settings.port(), Some("4567"));
        assert!(settings.url.unwrap().use_port);
    }

    #[test]
    fn test_production_flag() {
        assert!(resolve_env(Environment::new().with("APP_ENV", "production")).is_production());
        assert!(!resolve_env(Environment::new()).is_production());
    }

    // ── JSON output ────────────────────────────────────────────

    #[test]
    fn test_settings_serialize_with_host_keys() {
        let settings = resolve_env(Environment::new().with("url", "http://example.com/"));
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["isPrimary"], true);
        assert_eq!(json["runJobs"], true);
        assert_eq!(json["sessionKey"], "express.sid");
        assert_eq!(json["socket.io:origins"], "http://example.com:*");
        assert_eq!(json["port"], "4567");
    }
}
