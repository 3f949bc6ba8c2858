use std::ffi::OsString;
use std::fs;

use tempfile::TempDir;
use ortho_config::OrthoConfig;
use telstack_config::Config;

#[test]
fn malformed_file_fails_to_load() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("telstack.toml");
    fs::write(&path, "command_timeout_ms = \"soon\"\n").expect("write malformed config");

    let args = vec![
        OsString::from("telstack"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ];

    let error = Config::load_from_iter(args).expect_err("loading must fail");
    assert!(
        !error.to_string().is_empty(),
        "expected a descriptive configuration error"
    );
}

#[test]
fn unparseable_log_format_flag_fails_to_load() {
    let args = vec![
        OsString::from("telstack"),
        OsString::from("--log-format"),
        OsString::from("xml"),
    ];
    assert!(Config::load_from_iter(args).is_err());
}
