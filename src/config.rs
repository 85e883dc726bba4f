//! Configuration
//!
//! Layers, highest precedence first: command-line flags, `DOCS_*` environment
//! variables (both handled by clap), a TOML file, built-in defaults.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::context::{DEFAULT_ENCODING, DEFAULT_MAX_TOKENS};
use crate::extract::DEFAULT_EXTRACT_LIMIT;
use crate::llm::DEFAULT_API_BASE;
use crate::pipeline::{PipelineConfig, DEFAULT_FILE_TIMEOUT, DEFAULT_WORKERS};

pub const DEFAULT_MODEL: &str = "mlx-community/Llama-3.2-1B-Instruct-4bit";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "docsort.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "docsort")]
#[command(about = "Sort documents into category folders using a local language model", long_about = None)]
#[command(version)]
pub struct Args {
    /// Source directory to scan for files
    #[arg(long, env = "DOCS_SRC")]
    pub src: Option<PathBuf>,

    /// Destination directory to move files into
    #[arg(long, env = "DOCS_DST")]
    pub dst: Option<PathBuf>,

    /// Base URL of the OpenAI-compatible server
    #[arg(long, env = "DOCS_API")]
    pub api: Option<String>,

    /// Model name sent with each request
    #[arg(long, env = "DOCS_MODEL")]
    pub model: Option<String>,

    /// Model context window in tokens
    #[arg(long, env = "DOCS_CTX")]
    pub ctx: Option<usize>,

    /// Tokenizer encoding or model name
    #[arg(long, env = "DOCS_ENCODING")]
    pub encoding: Option<String>,

    /// Number of concurrent workers
    #[arg(long, env = "DOCS_WORKERS")]
    pub workers: Option<usize>,

    /// Maximum characters extracted per file
    #[arg(long, env = "DOCS_LIMIT")]
    pub limit: Option<usize>,

    /// Comma-separated categories; skips folder discovery
    #[arg(long, env = "DOCS_CATEGORIES", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Per-file timeout in seconds
    #[arg(long, env = "DOCS_FILE_TIMEOUT")]
    pub file_timeout: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "DOCS_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Config file (default: ./docsort.toml, then the user config dir)
    #[arg(long, env = "DOCS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long)]
    pub verbose: bool,
}

/// Contents of a TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub src: Option<PathBuf>,
    pub dst: Option<PathBuf>,
    pub api: Option<String>,
    pub model: Option<String>,
    pub ctx: Option<usize>,
    pub encoding: Option<String>,
    pub workers: Option<usize>,
    pub limit: Option<usize>,
    pub categories: Option<Vec<String>>,
    pub file_timeout: Option<u64>,
    pub request_timeout: Option<u64>,
}

impl FileConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load an explicitly named file, which must exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }

    /// Load the first default file that exists, or an empty config
    pub fn load_default() -> Result<Self, ConfigError> {
        for path in default_config_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "Loading config file");
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("docsort").join("config.toml"));
    }
    paths
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub api: String,
    pub model: String,
    pub ctx: usize,
    pub encoding: String,
    pub workers: usize,
    pub limit: usize,
    pub categories: Vec<String>,
    pub file_timeout: Duration,
    pub request_timeout: Duration,
    pub verbose: bool,
}

impl Config {
    /// Read the config file named by `args` (or the default one) and merge
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::load_default()?,
        };
        Self::resolve(args, file)
    }

    /// Merge flags/env over file values over defaults, then validate
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let categories = if args.categories.is_empty() {
            file.categories.unwrap_or_default()
        } else {
            args.categories
        };

        let config = Self {
            src: args.src.or(file.src).unwrap_or_default(),
            dst: args.dst.or(file.dst).unwrap_or_default(),
            api: args.api.or(file.api).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: args.model.or(file.model).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ctx: args.ctx.or(file.ctx).unwrap_or(DEFAULT_MAX_TOKENS),
            encoding: args.encoding.or(file.encoding).unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            workers: args.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS),
            limit: args.limit.or(file.limit).unwrap_or(DEFAULT_EXTRACT_LIMIT),
            categories: categories
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            file_timeout: seconds_or(args.file_timeout.or(file.file_timeout), DEFAULT_FILE_TIMEOUT),
            request_timeout: seconds_or(args.request_timeout.or(file.request_timeout), DEFAULT_REQUEST_TIMEOUT),
            verbose: args.verbose,
        };
        config.validate()
    }

    /// Reject missing directories and replace zeros with defaults
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.src.as_os_str().is_empty() {
            return Err(ConfigError::Missing("src"));
        }
        if self.dst.as_os_str().is_empty() {
            return Err(ConfigError::Missing("dst"));
        }
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.limit == 0 {
            self.limit = DEFAULT_EXTRACT_LIMIT;
        }
        if self.ctx == 0 {
            self.ctx = DEFAULT_MAX_TOKENS;
        }
        Ok(self)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            src: self.src.clone(),
            dest: self.dst.clone(),
            workers: self.workers,
            extract_limit: self.limit,
            file_timeout: self.file_timeout,
            manual_categories: self.categories.clone(),
        }
    }
}

fn seconds_or(secs: Option<u64>, default: Duration) -> Duration {
    match secs {
        Some(0) | None => default,
        Some(secs) => Duration::from_secs(secs),
    }
}
