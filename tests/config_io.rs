// tests/config_io.rs
//! Config loading from TOML files and defaults.

use std::io::Write;

use arqon::Config;

#[test]
fn explicit_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "seed = 42\n\n[dialect]\nname = \"openqasm\"\nversion = \"2.0\"\n\n[shots]\nread = 512\nstatement = 256\n"
    )
    .unwrap();

    let cfg = Config::load(Some(&path)).unwrap();
    assert_eq!(cfg.seed, Some(42));
    assert_eq!(cfg.shots.read, 512);
    assert_eq!(cfg.shots.statement, 256);
    assert_eq!(cfg.dialect.name, "openqasm");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "shots = \"many\"").unwrap();
    assert!(Config::load(Some(&path)).is_err());
}
