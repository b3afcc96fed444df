// MCP server registry loading: defaults, lookups, and failure modes.

use astrolabe::{ConfigError, McpConfig, TransportKind};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_registry(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mcp_servers.json");
    fs::write(&path, content).expect("write registry");
    (dir, path)
}

#[test]
fn loads_registry_with_defaults() {
    let (_dir, path) = write_registry(
        r#"{
            "mcpServers": {
                "clock": {"command": "clock-server"},
                "files": {
                    "command": "files-server",
                    "args": ["--root", "/tmp"],
                    "transport": "http-stream",
                    "enabled": false,
                    "tools": ["read_file", "write_file"]
                }
            }
        }"#,
    );

    let config = McpConfig::load(&path).expect("load config");

    let clock = config.get_server_metadata("clock").unwrap();
    assert_eq!(clock.command, "clock-server");
    assert!(clock.args.is_empty());
    assert_eq!(clock.transport, TransportKind::Stdio);
    assert!(clock.enabled);
    assert!(clock.tools.is_none());

    let files = config.get_server_metadata("files").unwrap();
    assert_eq!(files.args, vec!["--root".to_string(), "/tmp".to_string()]);
    assert_eq!(files.transport, TransportKind::HttpStream);
    assert!(!files.enabled);
    assert_eq!(
        files.tools.as_deref(),
        Some(&["read_file".to_string(), "write_file".to_string()][..])
    );
}

#[test]
fn enabled_servers_exclude_disabled_entries() {
    let (_dir, path) = write_registry(
        r#"{
            "mcpServers": {
                "on": {"command": "a"},
                "off": {"command": "b", "enabled": false}
            }
        }"#,
    );

    let config = McpConfig::load(&path).unwrap();
    assert_eq!(config.get_enabled_servers(), vec!["on".to_string()]);
    assert!(config.is_server_enabled("on"));
    assert!(!config.is_server_enabled("off"));
    assert!(!config.is_server_enabled("missing"));
}

#[test]
fn missing_file_is_a_distinct_error() {
    let dir = tempdir().unwrap();
    let err = McpConfig::load(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Missing { .. }));
}

#[test]
fn invalid_json_is_malformed() {
    let (_dir, path) = write_registry("{not json");
    let err = McpConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Malformed { .. }));
}

#[test]
fn missing_top_level_key_is_malformed() {
    let (_dir, path) = write_registry(r#"{"servers": {}}"#);
    let err = McpConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Malformed { .. }));
}

#[test]
fn missing_command_is_malformed() {
    let (_dir, path) = write_registry(r#"{"mcpServers": {"clock": {"args": []}}}"#);
    let err = McpConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Malformed { .. }));
}

#[test]
fn unknown_fields_are_ignored() {
    let (_dir, path) = write_registry(
        r#"{
            "version": 2,
            "mcpServers": {
                "clock": {"command": "clock-server", "owner": "ops"}
            }
        }"#,
    );
    let config = McpConfig::load(&path).unwrap();
    assert!(config.get_server_metadata("clock").is_some());
}
