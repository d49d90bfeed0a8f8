//! Where finished composites go.

use crate::{OutputFormat, Result};
use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A delivered composite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name offered to the user, e.g. `fullpage-screenshot-1700000000000.png`
    pub file_name: String,
    /// Where it ended up, when the sink writes to disk
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

impl Artifact {
    pub fn location(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => self.file_name.clone(),
        }
    }
}

/// Timestamped file name: `<prefix>-<unix millis>.<ext>`
pub fn artifact_file_name(prefix: &str, format: OutputFormat) -> String {
    format!("{}-{}.{}", prefix, Utc::now().timestamp_millis(), format.extension())
}

/// Receives the encoded composite ("offer as a download").
pub trait ArtifactSink: Send + Sync {
    fn deliver(&self, file_name: &str, data: &[u8], width: u32, height: u32) -> Result<Artifact>;
}

/// Writes artifacts into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DownloadDir {
    dir: PathBuf,
}

impl DownloadDir {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }
}

impl ArtifactSink for DownloadDir {
    fn deliver(&self, file_name: &str, data: &[u8], width: u32, height: u32) -> Result<Artifact> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, data)?;
        info!("Saved {}x{} screenshot to {}", width, height, path.display());
        Ok(Artifact {
            file_name: file_name.to_string(),
            path: Some(path),
            width,
            height,
            bytes: data.len(),
        })
    }
}

/// Keeps artifacts in memory; handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, as `(file name, encoded bytes)`.
    pub fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.items.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|v| v.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&self, file_name: &str, data: &[u8], width: u32, height: u32) -> Result<Artifact> {
        self.items
            .lock()
            .map_err(|e| crate::Error::Other(format!("memory sink poisoned: {}", e)))?
            .push((file_name.to_string(), data.to_vec()));
        Ok(Artifact { file_name: file_name.to_string(), path: None, width, height, bytes: data.len() })
    }
}
