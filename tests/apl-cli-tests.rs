use assert_cmd::prelude::*;
use camino::Utf8Path;
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::process::Command;
use tempfile::Builder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};
use tracing_texray::TeXRayLayer;

fn apl_cmd() -> Command {
    Command::cargo_bin("apl").unwrap()
}

fn run_file(contents: &str, args: &[&str]) -> (bool, String) {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let apl_file = tmp_dir.join("script.apl");
    let mut file = File::create(&apl_file).unwrap();
    file.write_all(contents.as_bytes()).unwrap();

    let mut cmd = apl_cmd();
    cmd.arg("load");
    cmd.arg(apl_file.as_str());
    cmd.args(args);
    let output = cmd.output().unwrap();
    (
        output.status.success(),
        String::from_utf8(output.stdout).unwrap(),
    )
}

#[test]
fn test_help_subcommand() {
    let mut cmd = apl_cmd();

    cmd.arg("help");
    cmd.assert().success();
}

#[test]
fn test_help_flag_command() {
    let mut cmd = apl_cmd();

    cmd.arg("--help");
    cmd.assert().success();
}

#[test]
fn test_repl_command() {
    let mut cmd = apl_cmd();

    cmd.arg("repl");
    cmd.assert().success();
}

#[test]
fn test_bad_command() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let bad_file = tmp_dir.path().join("uiop");

    let mut cmd = apl_cmd();
    cmd.arg(bad_file.to_str().unwrap());
    cmd.assert().failure();
}

#[test]
fn test_load_file() {
    let (ok, stdout) = run_file("∇Z←A PLUS B\nZ←A+B\n∇\nPLUS/⍳10\n+/⍳4\n", &[]);
    assert!(ok);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["55", "10"]);
}

#[test]
fn test_load_continues_after_errors() {
    let (ok, stdout) = run_file("1+NOPE\n2+2\n", &[]);
    assert!(ok);
    assert!(stdout.contains("VALUE ERROR"));
    assert_eq!(stdout.lines().last(), Some("4"));
}

#[test]
fn test_load_stops_at_off() {
    let (ok, stdout) = run_file("1\n)OFF\n2\n", &[]);
    assert!(ok);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["1"]);
}

#[test]
fn test_unterminated_definition() {
    let (ok, _) = run_file("∇Z←F B\nZ←B\n", &[]);
    assert!(!ok);
}

#[test]
fn test_index_origin_flag() {
    let (ok, stdout) = run_file("⍳3\n", &["--index-origin", "0"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "0 1 2");
}

#[test]
fn test_config_file() {
    let subscriber = Registry::default()
        .with(fmt::layer().pretty().with_test_writer())
        .with(EnvFilter::from_default_env())
        // nothing is examined below; the layer only has to install cleanly
        .with(TeXRayLayer::new());

    tracing::subscriber::set_global_default(subscriber).unwrap();

    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let config_path = tmp_dir.join("apl.toml");

    let mut config_file = File::create(&config_path).unwrap();
    config_file.write_all(b"max_depth = 7\n").unwrap();
    config_file.write_all(b"print_precision = 4\n").unwrap();
    config_file.write_all(b"index_origin = 1\n").unwrap();

    // env vars win over the file
    std::env::set_var("APL_PRINT_PRECISION", "6");
    // and command line overrides win over both
    let overrides = HashMap::from([("index_origin", "0".to_string())]);

    let settings =
        apl::config::Settings::from_config(&config_path.to_path_buf(), Some(&overrides)).unwrap();

    assert_eq!(settings.max_depth, 7);
    assert_eq!(settings.print_precision, 6);
    assert_eq!(settings.index_origin, 0);
    assert_eq!(settings.max_symbols, 65536);
}
