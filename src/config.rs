use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{BinSizeLadder, DEFAULT_BIN_SIZES};
use crate::error::SeqError;

pub const DEFAULT_CONFIG_FILE: &str = "seqbins.json";
pub const DEFAULT_CATALOG_FILE: &str = "samples.db";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub data_dir: String,
    #[serde(default)]
    pub catalog_file: Option<String>,
    #[serde(default)]
    pub bin_sizes: Option<Vec<u32>>,
    #[serde(default)]
    pub pair_timeout_ms: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub catalog_path: Utf8PathBuf,
    pub ladder: BinSizeLadder,
    pub pair_timeout: Duration,
    pub workers: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SeqError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(SeqError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SeqError::ConfigRead(config_path.clone()))?;
        let mut config: Config = serde_json::from_str(&content)
            .map_err(|err| SeqError::ConfigParse(err.to_string()))?;

        // relative data_dir is taken from the config file's directory
        if let Some(base) = config_path.parent().and_then(Utf8Path::from_path) {
            let data_dir = Utf8Path::new(config.data_dir.trim());
            if data_dir.is_relative() && !data_dir.as_str().is_empty() {
                config.data_dir = base.join(data_dir).into_string();
            }
        }

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SeqError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(SeqError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let data_dir = Utf8PathBuf::from(config.data_dir.trim());
        if data_dir.as_str().is_empty() {
            return Err(SeqError::ConfigParse("data_dir must not be empty".to_string()));
        }
        let catalog_path = data_dir.join(
            config
                .catalog_file
                .as_deref()
                .unwrap_or(DEFAULT_CATALOG_FILE),
        );

        let ladder = BinSizeLadder::new(
            config
                .bin_sizes
                .unwrap_or_else(|| DEFAULT_BIN_SIZES.to_vec()),
        )?;

        let pair_timeout = Duration::from_millis(config.pair_timeout_ms.unwrap_or(5_000).max(1));
        let workers = config.workers.unwrap_or(4).max(1);

        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            catalog_path,
            ladder,
            pair_timeout,
            workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolve_defaults() {
        let config: Config = serde_json::from_str(r#"{"data_dir": "/data/seqs"}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.catalog_path, Utf8PathBuf::from("/data/seqs/samples.db"));
        assert_eq!(resolved.ladder.sizes(), &DEFAULT_BIN_SIZES);
        assert_eq!(resolved.pair_timeout, Duration::from_secs(5));
        assert_eq!(resolved.workers, 4);
    }

    #[test]
    fn resolve_rejects_empty_ladder() {
        let config: Config =
            serde_json::from_str(r#"{"data_dir": "/data", "bin_sizes": []}"#).unwrap();
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SeqError::ConfigParse(_))
        );
    }
}
