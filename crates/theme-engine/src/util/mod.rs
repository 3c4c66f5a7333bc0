pub mod consts;
pub mod error;
pub mod request_channel;

use std::path::Path;

use error::{
    ErrorContext as _,
    UtilError,
};
use serde::de::DeserializeOwned;

/// Reads and deserializes a JSON file, attaching the path to any error.
pub async fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, UtilError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Serializes `value` as pretty JSON and writes it to `path`, creating parent directories.
pub async fn write_json_file<T: serde::Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), UtilError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(value).context("failed to serialize json")?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
