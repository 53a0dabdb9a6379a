use alertcast::{cli::Cli, config::Config};
use clap::Parser;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

fn cli_for(path: &PathBuf, extra: &[&str]) -> Cli {
    let mut args = vec!["alertcast", "--config", path.to_str().unwrap()];
    args.extend_from_slice(extra);
    Cli::try_parse_from(args).unwrap()
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        [server]
        listen_address = "127.0.0.1:8081"
        [firebase]
        credentials_path = "/etc/alertcast/service-account.json"
        project_id = "disaster-alerts"
        [directory]
        base_url = "http://localhost:8080"
        database = "alerts"
        collection = "residents"
        city_field = "town"
        token_field = "deviceToken"
        [gateway]
        base_url = "http://localhost:9099"
        max_concurrent_sends = 16
        [dispatch]
        batch_size = 250
        [http]
        request_timeout_seconds = 30
        [metrics]
        enabled = true
        listen_address = "127.0.0.1:9191"
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli_for(&path, &[])).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.listen_address, "127.0.0.1:8081".parse().unwrap());
        assert_eq!(
            config.firebase.credentials_path,
            Some(PathBuf::from("/etc/alertcast/service-account.json"))
        );
        assert_eq!(config.firebase.project_id.as_deref(), Some("disaster-alerts"));
        assert_eq!(config.firebase.access_token, None);
        assert_eq!(config.directory.base_url, "http://localhost:8080");
        assert_eq!(config.directory.database, "alerts");
        assert_eq!(config.directory.collection, "residents");
        assert_eq!(config.directory.city_field, "town");
        assert_eq!(config.directory.token_field, "deviceToken");
        assert_eq!(config.gateway.base_url, "http://localhost:9099");
        assert_eq!(config.gateway.max_concurrent_sends, 16);
        assert_eq!(config.dispatch.batch_size, 250);
        assert_eq!(config.http.request_timeout_seconds, Some(30));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_address, "127.0.0.1:9191".parse().unwrap());
    });
}

#[test]
#[serial]
fn test_empty_file_yields_defaults() {
    with_config_file("", |path| {
        let config = Config::load(&cli_for(&path, &[])).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.dispatch.batch_size, 500);
        assert_eq!(config.directory.collection, "users");
        assert_eq!(config.directory.token_field, "fcmToken");
    });
}

#[test]
#[serial]
fn test_missing_config_file_is_not_an_error() {
    let cli = Cli::try_parse_from(["alertcast", "--config", "/nonexistent/alertcast.toml"]).unwrap();

    let config = Config::load(&cli).unwrap();

    assert_eq!(config, Config::default());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    with_config_file("[dispatch]\nbatch_size = 250\n", |path| {
        std::env::set_var("ALERTCAST_DISPATCH__BATCH_SIZE", "100");
        std::env::set_var("ALERTCAST_FIREBASE__PROJECT_ID", "from-env");

        let result = Config::load(&cli_for(&path, &[]));

        std::env::remove_var("ALERTCAST_DISPATCH__BATCH_SIZE");
        std::env::remove_var("ALERTCAST_FIREBASE__PROJECT_ID");
        let config = result.unwrap();
        assert_eq!(config.dispatch.batch_size, 100);
        assert_eq!(config.firebase.project_id.as_deref(), Some("from-env"));
    });
}

#[test]
#[serial]
fn test_cli_overrides_environment_and_file() {
    let toml_content = r#"
        log_level = "warn"
        [server]
        listen_address = "127.0.0.1:8081"
        [dispatch]
        batch_size = 250
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("ALERTCAST_DISPATCH__BATCH_SIZE", "100");

        let result = Config::load(&cli_for(
            &path,
            &[
                "--batch-size",
                "42",
                "--listen",
                "127.0.0.1:9000",
                "--log-level",
                "trace",
                "--credentials",
                "/tmp/key.json",
                "--project-id",
                "from-cli",
            ],
        ));

        std::env::remove_var("ALERTCAST_DISPATCH__BATCH_SIZE");
        let config = result.unwrap();
        assert_eq!(config.dispatch.batch_size, 42);
        assert_eq!(config.server.listen_address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.firebase.credentials_path, Some(PathBuf::from("/tmp/key.json")));
        assert_eq!(config.firebase.project_id.as_deref(), Some("from-cli"));
    });
}

#[test]
#[serial]
fn test_batch_size_above_gateway_limit_is_rejected() {
    with_config_file("[dispatch]\nbatch_size = 501\n", |path| {
        let err = Config::load(&cli_for(&path, &[])).unwrap_err();

        assert!(err.to_string().contains("dispatch.batch_size"));
    });
}

#[test]
#[serial]
fn test_zero_concurrency_is_rejected() {
    with_config_file("[gateway]\nmax_concurrent_sends = 0\n", |path| {
        assert!(Config::load(&cli_for(&path, &[])).is_err());
    });
}

#[test]
#[serial]
fn test_invalid_type_is_rejected() {
    with_config_file("[dispatch]\nbatch_size = \"many\"\n", |path| {
        assert!(Config::load(&cli_for(&path, &[])).is_err());
    });
}
