//! `birtool` commands and config loading against files on disk.

mod common;

use std::path::Path;

use bir::cli::{parse_args, run};
use bir::config::{BirConfig, LowerConfig};
use bir::error::{Error, FormatError};
use bir::ir::package::Package;
use bir::lower::lower;
use bir::printer::print_package;
use bir::encode;

use common::increment_package;

fn lowered() -> Package {
    lower(&increment_package(), &LowerConfig::default()).unwrap()
}

fn write_bir(dir: &Path, name: &str, pkg: &Package) -> String {
    let path = dir.join(name);
    std::fs::write(&path, encode(pkg).unwrap()).unwrap();
    path.display().to_string()
}

#[test]
fn test_dump_prints_package() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = lowered();
    let file = write_bir(dir.path(), "f.bir", &pkg);

    let cli = parse_args(["birtool", "dump", file.as_str()]).unwrap();
    let report = run(&cli).unwrap();
    assert!(report.success);
    assert_eq!(report.text, print_package(&pkg));
}

#[test]
fn test_check_summarizes_functions() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_bir(dir.path(), "f.bir", &lowered());

    let cli = parse_args(["birtool", "check", file.as_str()]).unwrap();
    let report = run(&cli).unwrap();
    assert!(report.success);
    assert!(report.text.starts_with("acme/demo:0.1.0: ok\n"), "{}", report.text);
    assert!(report.text.contains("  f: 1 blocks, 4 instructions, 4 locals\n"), "{}", report.text);
    assert!(report.text.contains("1 functions, 1 blocks, 4 instructions\n"), "{}", report.text);
}

#[test]
fn test_roundtrip_writes_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_bir(dir.path(), "in.bir", &lowered());
    let out = dir.path().join("out.bir");
    let out_arg = out.display().to_string();

    let cli = parse_args(["birtool", "roundtrip", file.as_str(), "-o", out_arg.as_str()]).unwrap();
    let report = run(&cli).unwrap();
    assert!(report.success, "{}", report.text);
    assert!(report.text.contains("round-trip ok"));
    assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&file).unwrap());
}

#[test]
fn test_strict_version_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("old.bir");
    let mut bytes = encode(&lowered()).unwrap();
    bytes[4..8].copy_from_slice(&70i32.to_be_bytes());
    std::fs::write(&file, bytes).unwrap();
    let file = file.display().to_string();

    // Lenient by default.
    let cli = parse_args(["birtool", "dump", file.as_str()]).unwrap();
    assert!(run(&cli).is_ok());

    let config = dir.path().join("strict.json");
    std::fs::write(&config, r#"{ "codec": { "strict_version": true } }"#).unwrap();
    let config = config.display().to_string();
    let cli = parse_args(["birtool", "--config", config.as_str(), "dump", file.as_str()]).unwrap();
    let err = run(&cli).unwrap_err();
    assert!(matches!(
        err,
        Error::FormatValidation(FormatError::UnsupportedVersion { found: 70, expected: 75 })
    ));
    assert_eq!(err.diagnostic_code(), "E0002");
}

#[test]
fn test_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    assert!(BirConfig::load(&bad).is_err());
    assert!(BirConfig::load(dir.path().join("missing.json")).is_err());

    let file = write_bir(dir.path(), "f.bir", &lowered());
    let bad = bad.display().to_string();
    let cli = parse_args(["birtool", "--config", bad.as_str(), "check", file.as_str()]).unwrap();
    let err = run(&cli).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.diagnostic_code(), "E0300");
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.bir").display().to_string();
    let cli = parse_args(["birtool", "dump", missing.as_str()]).unwrap();
    assert!(matches!(run(&cli), Err(Error::Io(_))));
}
