use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{CleanerError, Result};
use crate::models::{CleanupSelection, CollectionPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Matched case-insensitively: entries are trimmed and lowercased, so
    /// `Spam.COM` excludes `spam.com`
    #[serde(default)]
    pub excluded_domains: Vec<String>,
    #[serde(default = "default_use_label_protection")]
    pub use_label_protection: bool,
    #[serde(default)]
    pub protected_label_ids: Option<Vec<String>>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            limit: None,
            excluded_domains: Vec::new(),
            use_label_protection: default_use_label_protection(),
            protected_label_ids: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_use_label_protection() -> bool {
    true
}

fn default_dry_run() -> bool {
    true
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrent() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CleanerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CleanerError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CleanerError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CleanerError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| CleanerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.collection.limit == Some(0) {
            return Err(CleanerError::ConfigError(
                "collection.limit must be at least 1 when set".to_string(),
            ));
        }

        for domain in &self.collection.excluded_domains {
            if domain.trim().is_empty() {
                return Err(CleanerError::ConfigError(
                    "collection.excluded_domains cannot contain empty strings".to_string(),
                ));
            }
            if domain.contains('@') {
                return Err(CleanerError::ConfigError(format!(
                    "collection.excluded_domains entry '{}' must be a domain, not an address",
                    domain
                )));
            }
        }

        if self.cleanup.limit == Some(0) {
            return Err(CleanerError::ConfigError(
                "cleanup.limit must be at least 1 when set".to_string(),
            ));
        }

        // threads.list accepts at most 500 results per page
        if self.client.page_size == 0 || self.client.page_size > 500 {
            return Err(CleanerError::ConfigError(
                "client.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.client.max_concurrent_requests == 0 {
            return Err(CleanerError::ConfigError(
                "client.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.client.max_concurrent_requests > 50 {
            return Err(CleanerError::ConfigError(
                "client.max_concurrent_requests cannot exceed 50 (to stay under Gmail API rate limits of 250 units/sec)".to_string(),
            ));
        }

        if self.client.request_timeout_secs == 0 {
            return Err(CleanerError::ConfigError(
                "client.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.client.max_retries > 10 {
            return Err(CleanerError::ConfigError(
                "client.max_retries cannot exceed 10".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }

    /// Collection policy described by the `[collection]` section
    ///
    /// Excluded domains are lowercased so they compare against extracted domains.
    pub fn collection_policy(&self) -> CollectionPolicy {
        CollectionPolicy {
            limit: self.collection.limit,
            excluded_domains: self
                .collection
                .excluded_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect(),
            use_label_protection: self.collection.use_label_protection,
            protected_label_ids: self
                .collection
                .protected_label_ids
                .as_ref()
                .map(|ids| ids.iter().cloned().collect::<HashSet<_>>()),
        }
    }

    pub fn cleanup_selection(&self) -> CleanupSelection {
        CleanupSelection {
            dry_run: self.cleanup.dry_run,
            limit: self.cleanup.limit,
        }
    }
}
