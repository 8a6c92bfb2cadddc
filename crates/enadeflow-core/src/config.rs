//! Pipeline configuration.
//!
//! Loaded from a TOML file by the CLI; every field has a default so an empty
//! file (or none at all) still yields a working configuration. Storage
//! credentials can be overridden from the environment so they never have to
//! live in the file.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding `storage_url`.
pub const STORAGE_URL_VAR: &str = "ENADEFLOW_STORAGE_URL";

/// Environment variable overriding `storage_token`.
pub const STORAGE_TOKEN_VAR: &str = "ENADEFLOW_STORAGE_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// URL of the remote microdata archive.
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Local working directory for the archive, extraction and output.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Archive filename under `work_dir`.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Path of the data file inside the archive.
    #[serde(default = "default_inner_path")]
    pub inner_path: PathBuf,

    /// Output CSV filename under `work_dir`.
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Destination bucket.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Destination object key.
    #[serde(default = "default_destination_key")]
    pub destination_key: String,

    /// Object storage endpoint.
    #[serde(default)]
    pub storage_url: String,

    /// Object storage bearer token.
    #[serde(default)]
    pub storage_token: String,

    /// Seconds between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Parallelism bound for the executor.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-attempt cap for I/O tasks, in seconds. 0 disables the cap.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

fn default_source_url() -> String {
    "http://download.inep.gov.br/microdados/Enade_Microdados/microdados_enade_2019.zip".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_archive_name() -> String {
    "microdados_enade_2019.zip".to_string()
}

fn default_inner_path() -> PathBuf {
    PathBuf::from("microdados_enade_2019/2019/3.DADOS/microdados_enade_2019.txt")
}

fn default_output_name() -> String {
    "enade2019.csv".to_string()
}

fn default_bucket() -> String {
    "etl-demo-fractal".to_string()
}

fn default_destination_key() -> String {
    "enade2019-blob".to_string()
}

// Daily.
fn default_interval_secs() -> u64 {
    86_400
}

fn default_max_parallel() -> usize {
    4
}

fn default_io_timeout_secs() -> u64 {
    900
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            work_dir: default_work_dir(),
            archive_name: default_archive_name(),
            inner_path: default_inner_path(),
            output_name: default_output_name(),
            bucket: default_bucket(),
            destination_key: default_destination_key(),
            storage_url: String::new(),
            storage_token: String::new(),
            interval_secs: default_interval_secs(),
            max_parallel: default_max_parallel(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(&self.archive_name)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.work_dir.join("extracted")
    }

    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_name)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_secs > 0).then(|| Duration::from_secs(self.io_timeout_secs))
    }

    /// The environment takes precedence over the file for credentials.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(STORAGE_URL_VAR)
            && !url.is_empty()
        {
            self.storage_url = url;
        }
        if let Some(token) = lookup(STORAGE_TOKEN_VAR)
            && !token.is_empty()
        {
            self.storage_token = token;
        }
    }
}
