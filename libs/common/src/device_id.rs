//! Persisted device identity
//!
//! A device keeps one UUID across restarts; it is stored as a single line
//! in a plain text file.

use std::io::ErrorKind;
use std::path::Path;

use errors::LinkResult;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default location of the device ID file
pub const DEFAULT_DEVICE_ID_FILE: &str = "data/device_id";

/// Read the device ID stored at `path`, generating and persisting one if
/// the file is missing, empty or does not hold a valid UUID.
pub async fn load_or_create(path: impl AsRef<Path>) -> LinkResult<String> {
    let path = path.as_ref();

    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let trimmed = contents.trim();
            if Uuid::parse_str(trimmed).is_ok() {
                debug!("Device ID loaded from {}", path.display());
                return Ok(trimmed.to_string());
            }
            warn!(
                "Device ID file {} is empty or invalid, regenerating",
                path.display()
            );
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No device ID at {}, generating", path.display());
        },
        Err(e) => return Err(e.into()),
    }

    let id = Uuid::new_v4().to_string();
    store(path, &id).await?;
    Ok(id)
}

async fn store(path: &Path, id: &str) -> LinkResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, format!("{}\n", id)).await?;
    info!("Device ID {} written to {}", id, path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_file_and_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("device_id");

        let id = load_or_create(&path).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.trim(), id);
    }

    #[tokio::test]
    async fn test_id_is_stable_across_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device_id");

        let first = load_or_create(&path).await.unwrap();
        let second = load_or_create(&path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_whitespace_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device_id");
        let known = Uuid::new_v4().to_string();
        std::fs::write(&path, format!("  {}\n\n", known)).unwrap();

        assert_eq!(load_or_create(&path).await.unwrap(), known);
    }

    #[tokio::test]
    async fn test_invalid_contents_are_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device_id");
        std::fs::write(&path, "not-a-uuid").unwrap();

        let id = load_or_create(&path).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), id);
    }
}
