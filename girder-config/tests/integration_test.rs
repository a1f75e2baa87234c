//! Integration tests for girder-config

use girder_config::*;
use girder_core::logging::LogLevel;
use girder_core::{Container, Registry};
use std::env;
use std::io::Write;

// Every test uses its own variable names; the environment is process-wide.

#[test]
fn test_manager_with_prefix_loads_env() {
    unsafe {
        env::set_var("ITEST_A_TEST_KEY", "test_value");
        env::set_var("ITEST_AX_OTHER", "ignored");
    }

    let manager = ConfigManager::with_prefix("ITEST_A");
    manager.load_env().unwrap();

    assert_eq!(manager.get_string("test_key").unwrap(), "test_value");
    assert!(!manager.has("x_other"));
    assert!(!manager.has("other"));

    unsafe {
        env::remove_var("ITEST_A_TEST_KEY");
        env::remove_var("ITEST_AX_OTHER");
    }
}

#[test]
fn test_env_loader_with_prefix() {
    unsafe {
        env::set_var("ITEST_B_DATABASE_URL", "postgres://localhost");
    }

    let loader = EnvLoader::new(Some("ITEST_B".to_string()));
    assert_eq!(loader.load_var("database_url").unwrap(), "postgres://localhost");
    assert_eq!(
        loader.load().get("database_url").map(String::as_str),
        Some("postgres://localhost")
    );

    unsafe {
        env::remove_var("ITEST_B_DATABASE_URL");
    }
}

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "hostname = \"127.0.0.1\"\nport = 3000\nlog_level = \"warn\"").unwrap();

    unsafe {
        env::set_var("ITEST_C_PORT", "4000");
    }

    let service = ConfigService::builder()
        .with_prefix("ITEST_C")
        .add_file(file.path())
        .load_env()
        .build()
        .unwrap();
    let server = service.server().unwrap();

    assert_eq!(server.hostname, "127.0.0.1");
    assert_eq!(server.port, 4000);
    assert_eq!(server.log_level, Some(LogLevel::Warn));

    unsafe {
        env::remove_var("ITEST_C_PORT");
    }
}

#[test]
fn test_server_config_load_from_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"hostname": "localhost", "port": 9000}}"#).unwrap();

    let config = ServerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.listen_options().hostname, "localhost");
    assert_eq!(config.listen_options().port, 9000);
}

#[test]
fn test_unsupported_file_format() {
    let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    let err = ConfigManager::new().load_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Unsupported format: yaml"));
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::InvalidValue {
        key: "port".to_string(),
        message: "invalid digit found in string".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid value for 'port': invalid digit found in string"
    );
}

#[test]
fn test_config_file_checked_at_registration() {
    use girder_core::Injectable;

    // Without GIRDER_CONFIG_FILE there is nothing to check.
    if env::var_os("GIRDER_CONFIG_FILE").is_none() {
        let deps = tokio_test::block_on(ConfigService::register()).unwrap();
        assert!(deps.is_empty());
    }
}

#[tokio::test]
async fn test_config_service_is_injectable() {
    let registry = Registry::new();
    registry.register_service::<ConfigService>().unwrap();

    let container = Container::new(registry);
    container.build().await.unwrap();

    let first = container.resolve::<ConfigService>().unwrap();
    let second = container.resolve::<ConfigService>().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(first.server().is_ok());
}
