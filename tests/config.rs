use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use seqbins::catalog::Catalog;
use seqbins::config::{Config, ConfigLoader};
use seqbins::error::SeqError;

#[test]
fn resolve_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seqbins.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "data_dir": "/srv/seqs",
            "catalog_file": "catalog.sqlite",
            "bin_sizes": [4096, 64, 1024],
            "pair_timeout_ms": 250,
            "workers": 2
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.data_dir, Utf8PathBuf::from("/srv/seqs"));
    assert_eq!(
        resolved.catalog_path,
        Utf8PathBuf::from("/srv/seqs/catalog.sqlite")
    );
    assert_eq!(resolved.ladder.sizes(), &[64, 1024, 4096]);
    assert_eq!(resolved.pair_timeout, Duration::from_millis(250));
    assert_eq!(resolved.workers, 2);

    let catalog = Catalog::from_config(&resolved);
    assert_eq!(catalog.catalog_path(), resolved.catalog_path.as_path());
}

#[test]
fn relative_data_dir_follows_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let conf_dir = dir.path().join("conf");
    std::fs::create_dir_all(&conf_dir).unwrap();
    let path = conf_dir.join("seqbins.json");
    std::fs::write(&path, r#"{"data_dir": "store"}"#).unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    let expected = Utf8PathBuf::from_path_buf(conf_dir.join("store")).unwrap();
    assert_eq!(resolved.data_dir, expected);
    assert_eq!(resolved.catalog_path, expected.join("samples.db"));
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, SeqError::ConfigRead(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seqbins.json");
    std::fs::write(&path, "{ data_dir: nope").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, SeqError::ConfigParse(_));
}

#[test]
fn rejects_unknown_schema_version() {
    let config = Config {
        schema_version: Some(2),
        data_dir: "/srv/seqs".to_string(),
        catalog_file: None,
        bin_sizes: None,
        pair_timeout_ms: None,
        workers: None,
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SeqError::ConfigParse(_))
    );
}

#[test]
fn rejects_blank_data_dir() {
    let config = Config {
        schema_version: None,
        data_dir: "  ".to_string(),
        catalog_file: None,
        bin_sizes: None,
        pair_timeout_ms: None,
        workers: None,
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(SeqError::ConfigParse(_))
    );
}

#[test]
fn zero_workers_still_runs_one() {
    let config = Config {
        schema_version: None,
        data_dir: "/srv/seqs".to_string(),
        catalog_file: None,
        bin_sizes: Some(vec![16]),
        pair_timeout_ms: Some(0),
        workers: Some(0),
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.workers, 1);
    assert_eq!(resolved.pair_timeout, Duration::from_millis(1));
    assert_eq!(resolved.ladder.sizes(), &[16]);
}
