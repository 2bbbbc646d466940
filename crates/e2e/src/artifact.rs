//! Screenshot artifacts produced at scenario checkpoints

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{E2eError, E2eResult};

/// A verified screenshot on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
}

/// Check that a screenshot exists, is non-empty and decodes as an image
pub fn verify_screenshot(name: &str, path: &Path) -> E2eResult<Artifact> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        E2eError::Artifact(format!(
            "screenshot '{}' missing at {}: {}",
            name,
            path.display(),
            e
        ))
    })?;

    if metadata.len() == 0 {
        return Err(E2eError::Artifact(format!(
            "screenshot '{}' is empty: {}",
            name,
            path.display()
        )));
    }

    let (width, height) = image::image_dimensions(path)?;
    if width == 0 || height == 0 {
        return Err(E2eError::Artifact(format!(
            "screenshot '{}' has no pixels: {}x{}",
            name, width, height
        )));
    }

    let sha256 = hash_file(path)?;
    info!(
        "Screenshot '{}' ok: {}x{}, {} bytes, sha256 {}",
        name,
        width,
        height,
        metadata.len(),
        &sha256[..12]
    );

    Ok(Artifact {
        name: name.to_string(),
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        width,
        height,
        sha256,
    })
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
