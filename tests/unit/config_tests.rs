//! Configuration parsing and validation.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use torino::config::ControlEndpoint;
use torino::{AppError, EventKind, TorinoConfig};

const SAMPLE: &str = r#"
[control]
address = "127.0.0.1:9151"
password = "hunter2"
command_timeout_seconds = 5

[launch]
executable = "/usr/local/bin/tor"
startup_timeout_seconds = 60
take_ownership = false

[launch.extra_args]
SocksPort = "9250"

[watch]
events = ["circ", " BW "]
"#;

#[test]
fn empty_document_uses_defaults() {
    let config = TorinoConfig::from_toml_str("").expect("defaults");

    assert_eq!(
        config.endpoint(),
        Ok(ControlEndpoint::Tcp(
            "127.0.0.1:9051".parse::<SocketAddr>().expect("addr")
        ))
    );
    assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
    assert!(config.watch_kinds().expect("kinds").is_empty());
    assert!(config.launch.take_ownership);
}

#[test]
fn full_document_is_parsed() {
    let config = TorinoConfig::from_toml_str(SAMPLE).expect("config");

    assert_eq!(config.password().as_deref(), Some("hunter2"));
    assert_eq!(config.command_timeout(), Some(Duration::from_secs(5)));
    assert_eq!(
        config.watch_kinds(),
        Ok(vec![EventKind::Circ, EventKind::Bw])
    );

    let launch = config.launch_config();
    assert_eq!(launch.executable, Some(PathBuf::from("/usr/local/bin/tor")));
    assert_eq!(launch.startup_timeout, Duration::from_secs(60));
    assert!(!launch.take_ownership);
    assert_eq!(
        launch.extra_args.get("SocksPort").map(String::as_str),
        Some("9250")
    );
}

#[test]
fn socket_path_takes_precedence() {
    let config = TorinoConfig::from_toml_str(
        "[control]\nsocket_path = \"/run/tor/control\"\nport_file = \"/tmp/port\"\n",
    )
    .expect("config");

    assert_eq!(
        config.endpoint(),
        Ok(ControlEndpoint::Local(PathBuf::from("/run/tor/control")))
    );
}

#[test]
fn port_file_beats_address() {
    let config = TorinoConfig::from_toml_str("[control]\nport_file = \"/tmp/port\"\n")
        .expect("config");

    assert_eq!(
        config.endpoint(),
        Ok(ControlEndpoint::PortFile(PathBuf::from("/tmp/port")))
    );
}

#[test]
fn zero_timeout_disables_command_timeout() {
    let config = TorinoConfig::from_toml_str("[control]\ncommand_timeout_seconds = 0\n")
        .expect("config");

    assert_eq!(config.command_timeout(), None);
}

#[test]
fn invalid_values_are_rejected() {
    for raw in [
        "[control]\naddress = \"not-an-address\"\n",
        "[launch]\nstartup_timeout_seconds = 0\n",
        "[watch]\nevents = [\"NOPE\"]\n",
        "[control\n",
    ] {
        assert!(
            matches!(TorinoConfig::from_toml_str(raw), Err(AppError::Config(_))),
            "{raw:?} must be rejected"
        );
    }
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SAMPLE.as_bytes()).expect("write config");

    let config = TorinoConfig::load_from_path(file.path()).expect("load");

    assert_eq!(config.control.address, "127.0.0.1:9151");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");

    assert!(matches!(
        TorinoConfig::load_from_path(dir.path().join("absent.toml")),
        Err(AppError::Config(_))
    ));
}
