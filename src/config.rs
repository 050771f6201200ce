//! Application configuration from the environment
//!
//! Values come from a `.env` file if present, then from process environment
//! variables. Command-line flags override both.
//!
//! | Variable                      | Default | Meaning                               |
//! |-------------------------------|---------|---------------------------------------|
//! | `AGENCY_MAX_STEPS`            | 20      | Global step limit per run             |
//! | `AGENCY_MAX_REVISIONS`        | 3       | Drafts before escalation              |
//! | `AGENCY_CHECKPOINT_DIR`       | unset   | Durable checkpoints (memory if unset) |
//! | `AGENCY_COMPRESS_CHECKPOINTS` | true    | zstd-compress checkpoint files        |
//! | `AGENCY_LOG_LEVEL`            | info    | Tracing filter directive              |

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub max_steps: usize,
    pub max_revisions: u64,
    /// Directory for file checkpoints; in-memory checkpoints when `None`
    pub checkpoint_dir: Option<PathBuf>,
    pub compress_checkpoints: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_revisions: 3,
            checkpoint_dir: None,
            compress_checkpoints: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("AGENCY_MAX_STEPS") {
            config.max_steps = val
                .parse()
                .context("AGENCY_MAX_STEPS must be a positive integer")?;
        }

        if let Some(val) = lookup("AGENCY_MAX_REVISIONS") {
            config.max_revisions = val
                .parse()
                .context("AGENCY_MAX_REVISIONS must be a positive integer")?;
        }

        if let Some(val) = lookup("AGENCY_CHECKPOINT_DIR").filter(|v| !v.is_empty()) {
            config.checkpoint_dir = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("AGENCY_COMPRESS_CHECKPOINTS") {
            config.compress_checkpoints = parse_flag(&val)
                .with_context(|| format!("AGENCY_COMPRESS_CHECKPOINTS must be true or false, got '{val}'"))?;
        }

        if let Some(val) = lookup("AGENCY_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Fail fast on values the engine would reject later.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            anyhow::bail!("AGENCY_MAX_STEPS must be at least 1");
        }
        if self.max_revisions == 0 {
            anyhow::bail!("AGENCY_MAX_REVISIONS must be at least 1");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("AGENCY_LOG_LEVEL cannot be empty");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
