use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::filter::KeywordRules;

const MISSING_HINT: &str = "Set it as an environment variable or create ~/.config/job-sync/.env with:\n  \
    OPENAI_API_KEY=your_key_here\n  \
    AIRTABLE_TOKEN=your_token_here\n  \
    AIRTABLE_BASE_ID=appXXXXXXXXXXXXXX\n  \
    AIRTABLE_TABLE_ID=tblXXXXXXXXXXXXXX";

/// Credentials for the external collaborators
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub airtable_token: String,
    pub airtable_base_id: String,
    pub airtable_table_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Ok(Self {
            openai_api_key: Self::required("OPENAI_API_KEY")?,
            airtable_token: Self::required("AIRTABLE_TOKEN")?,
            airtable_base_id: Self::required("AIRTABLE_BASE_ID")?,
            airtable_table_id: Self::required("AIRTABLE_TABLE_ID")?,
        })
    }

    fn required(name: &str) -> Result<String> {
        env::var(name).with_context(|| format!("{} not found.\n\n{}", name, MISSING_HINT))
    }

    fn try_load_dotenv() {
        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/job-sync/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("job-sync").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_page_timeout_secs() -> u64 {
    30
}

/// Per-run settings read from a JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub banned_terms: Vec<String>,
    pub allowed_terms: Vec<String>,
    /// Context handed to the judge on every call, typically a CV summary
    pub profile: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(content).context("Failed to parse settings JSON")?;

        if settings.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }

        Ok(settings)
    }

    pub fn rules(&self) -> KeywordRules {
        KeywordRules::new(self.banned_terms.clone(), self.allowed_terms.clone())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

/// Load the list of source page URLs (a JSON array of strings)
pub fn load_sources(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source list: {}", path.display()))?;
    let sources: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Source list {} is not a JSON array of URLs", path.display()))?;
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::parse(
            r#"{"banned_terms": ["VP"], "allowed_terms": ["Vienna"], "profile": "CV"}"#,
        )
        .unwrap();
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.request_delay(), Duration::from_millis(250));
        assert_eq!(settings.page_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_settings_rejects_zero_batch_size() {
        let result = Settings::parse(
            r#"{"banned_terms": [], "allowed_terms": [], "profile": "", "batch_size": 0}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_requires_terms() {
        assert!(Settings::parse(r#"{"profile": "CV"}"#).is_err());
    }
}
