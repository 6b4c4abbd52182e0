use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the default directory for storing stage snapshots
pub fn get_default_snapshot_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine local data directory")?
        .join("job-sync")
        .join("snapshots");

    fs::create_dir_all(&data_dir).context("Failed to create snapshot directory")?;

    Ok(data_dir)
}

/// Save a stage's output as a pretty-printed JSON array
pub fn save_snapshot<T: Serialize>(dir: &Path, filename: &str, items: &[T]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;

    let filepath = dir.join(filename);
    let json = serde_json::to_string_pretty(items).context("Failed to serialize snapshot")?;

    fs::write(&filepath, json)
        .with_context(|| format!("Failed to write snapshot: {}", filepath.display()))?;

    Ok(filepath)
}

/// Load a stage snapshot written by [`save_snapshot`]
pub fn load_snapshot<T: DeserializeOwned>(dir: &Path, filename: &str) -> Result<Vec<T>> {
    let filepath = dir.join(filename);

    if !filepath.exists() {
        anyhow::bail!("Snapshot not found: {}", filepath.display());
    }

    let content = fs::read_to_string(&filepath)
        .with_context(|| format!("Failed to read snapshot: {}", filepath.display()))?;

    serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse snapshot {}. The file may be corrupted or from a different stage.",
            filepath.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawListing;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("job-sync-io-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let dir = temp_dir("order");
        let listings: Vec<RawListing> = (0..3)
            .map(|i| RawListing {
                source_id: "s".to_string(),
                company: "Acme".to_string(),
                position: format!("Role {}", i),
                department: "Vienna".to_string(),
                location: "AT".to_string(),
                external_link: format!("https://x/{}", i),
            })
            .collect();

        let path = save_snapshot(&dir, "raw_listings.json", &listings).unwrap();
        assert!(path.exists());

        let loaded: Vec<RawListing> = load_snapshot(&dir, "raw_listings.json").unwrap();
        assert_eq!(loaded, listings);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let dir = temp_dir("missing");
        let result: Result<Vec<RawListing>> = load_snapshot(&dir, "raw_listings.json");
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Snapshot not found"));
    }

    #[test]
    fn test_snapshot_of_wrong_shape_is_an_error() {
        let dir = temp_dir("shape");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("raw_listings.json"), r#"{"not": "a list"}"#).unwrap();

        let result: Result<Vec<RawListing>> = load_snapshot(&dir, "raw_listings.json");
        assert!(result.is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
