//! Layered configuration loading.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use nev_client::config::{ClientConfig, LogFormat};
use serial_test::serial;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn file_values_override_defaults() {
    let file = write_config(
        r#"
[server]
host = "10.0.0.5"
port = 9100
read_timeout = "2s"

[sweep]
poll_interval = "250ms"
sampling_hz = 100000

[logging]
level = "debug"
format = "json"
"#,
    );

    let config = ClientConfig::load_from(file.path()).unwrap();
    assert_ok!(config.validate());
    assert_eq!(config.server.host, "10.0.0.5");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.server.read_timeout, Duration::from_secs(2));
    assert_eq!(config.sweep.poll_interval, Duration::from_millis(250));
    assert_eq!(config.sweep.timing().unwrap().sampling.hz(), 100_000);
    assert_eq!(config.sweep.union_id, 0);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
#[serial]
fn environment_overrides_file() {
    let file = write_config("[server]\nport = 9100\n");
    std::env::set_var("NEV_CLIENT_SERVER__PORT", "9200");
    std::env::set_var("NEV_CLIENT_SERVER__SIMULATE", "true");
    let loaded = ClientConfig::load_from(file.path());
    std::env::remove_var("NEV_CLIENT_SERVER__PORT");
    std::env::remove_var("NEV_CLIENT_SERVER__SIMULATE");

    let config = loaded.unwrap();
    assert_eq!(config.server.port, 9200);
    assert!(config.server.simulate);
}

#[test]
#[serial]
fn unsupported_sampling_rate_fails_validation() {
    let file = write_config("[sweep]\nsampling_hz = 75000\n");
    let config = ClientConfig::load_from(file.path()).unwrap();
    assert_err!(config.validate());
}

#[test]
#[serial]
fn malformed_duration_fails_to_load() {
    let file = write_config("[sweep]\npoll_interval = \"soon\"\n");
    assert_err!(ClientConfig::load_from(file.path()));
}

#[test]
#[serial]
fn shipped_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/nev_client.toml");
    let config = ClientConfig::load_from(path).unwrap();
    assert_ok!(config.validate());
    assert_eq!(config, ClientConfig::default());
}
