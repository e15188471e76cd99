use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{SchemaContract, WriteDisposition};
use crate::error::PipelineError;

/// On-disk run configuration, read from `efo-ingest.json` in the working
/// directory. Every field is optional; absent fields take the defaults below.
///
/// `limit` counts terms to ingest; `0` means unbounded.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub terms_path: Option<String>,
    #[serde(default)]
    pub data_selector: Option<String>,
    #[serde(default)]
    pub next_link_path: Option<String>,
    #[serde(default)]
    pub terms_table: Option<String>,
    #[serde(default)]
    pub parents_table: Option<String>,
    #[serde(default)]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(default)]
    pub schema_contract: Option<SchemaContract>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub parallel_fanout: Option<bool>,
    #[serde(default)]
    pub fanout_workers: Option<usize>,
    #[serde(default)]
    pub warehouse_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub terms_path: String,
    pub data_selector: String,
    pub next_link_path: String,
    pub terms_table: String,
    pub parents_table: String,
    pub write_disposition: WriteDisposition,
    pub schema_contract: SchemaContract,
    pub limit: Option<u64>,
    pub parallel_fanout: bool,
    pub fanout_workers: usize,
    pub warehouse_dir: Utf8PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

impl ResolvedConfig {
    /// Absolute listing URL for the first page of the term feed.
    pub fn first_page_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.terms_path.trim_start_matches('/')
        )
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("efo-ingest.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let limit = match config.limit {
            Some(0) => None,
            Some(value) => Some(value),
            None => Some(default_limit()),
        };

        ResolvedConfig {
            base_url: config.base_url.unwrap_or_else(default_base_url),
            terms_path: config.terms_path.unwrap_or_else(|| "/terms".to_string()),
            data_selector: config
                .data_selector
                .unwrap_or_else(|| "_embedded.terms".to_string()),
            next_link_path: config
                .next_link_path
                .unwrap_or_else(|| "_links.next.href".to_string()),
            terms_table: config.terms_table.unwrap_or_else(|| "terms".to_string()),
            parents_table: config
                .parents_table
                .unwrap_or_else(|| "terms_parents".to_string()),
            write_disposition: config.write_disposition.unwrap_or(WriteDisposition::Merge),
            schema_contract: config.schema_contract.unwrap_or(SchemaContract::Evolve),
            limit,
            parallel_fanout: config.parallel_fanout.unwrap_or(true),
            fanout_workers: config.fanout_workers.unwrap_or(default_fanout_workers()).max(1),
            warehouse_dir: config
                .warehouse_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(default_warehouse_dir),
        }
    }
}

pub fn default_base_url() -> String {
    "https://www.ebi.ac.uk/ols4/api/ontologies/efo".to_string()
}

pub fn default_limit() -> u64 {
    1000
}

pub fn default_fanout_workers() -> usize {
    8
}

pub fn default_warehouse_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".efo-ingest/warehouse")
}
