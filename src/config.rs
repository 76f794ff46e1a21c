//! Engine configuration and scenario file loading.

use crate::error::EventError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default number of concurrently processed runs.
pub const DEFAULT_PARALLELISM: usize = 25;

/// Options of a local consumer and its worker pool.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Number of workers processing jobs concurrently.
    pub parallelism: usize,
    /// Capacity of the producer → consumer channel. With the default of 1
    /// a producer waits until the consumer has taken the previous id.
    pub channel_capacity: usize,
    /// How long [`crate::events::Consumer::shutdown`] waits for the pool
    /// to drain.
    pub close_timeout: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            channel_capacity: 1,
            close_timeout: Duration::from_secs(10),
        }
    }
}

impl ConsumerOptions {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if self.parallelism == 0 {
            return Err(EventError::InvalidOptions(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(EventError::InvalidOptions(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options of the scenario executor.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Transport timeout of a single HTTP call.
    pub request_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A scenario document read from disk.
#[derive(Debug, Clone)]
pub struct ScenarioFile {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

/// Loads scenario documents from files and directories.
#[derive(Debug)]
pub struct ScenarioFileLoader {
    pub paths: Vec<PathBuf>,
}

impl ScenarioFileLoader {
    pub fn new() -> Self {
        Self { paths: Vec::new() }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Read a single scenario file. The scenario is named after the file
    /// stem.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<ScenarioFile> {
        let path = path.as_ref();
        info!("Loading scenario from {}", path.display());

        let content = fs::read_to_string(path).context(format!(
            "Failed to read scenario file: {}",
            path.display()
        ))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scenario")
            .to_string();

        Ok(ScenarioFile {
            name,
            path: path.to_path_buf(),
            content,
        })
    }

    /// Read every scenario file directly inside `dir`, sorted by name.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<ScenarioFile>> {
        let dir = dir.as_ref();
        info!("Loading scenarios from directory: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).context(format!(
            "Failed to read directory: {}",
            dir.display()
        ))? {
            let path = entry?.path();
            if path.is_file() && is_scenario_file(&path) {
                paths.push(path);
            } else {
                debug!("Skipping {}", path.display());
            }
        }
        paths.sort();

        let files = paths
            .iter()
            .map(|p| self.load_file(p))
            .collect::<Result<Vec<_>>>()?;
        info!("Loaded {} scenarios from {}", files.len(), dir.display());
        Ok(files)
    }

    /// Load every configured path, file or directory.
    pub fn load_all(&self) -> Result<Vec<ScenarioFile>> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                files.extend(self.load_dir(path)?);
            } else {
                files.push(self.load_file(path)?);
            }
        }
        Ok(files)
    }
}

impl Default for ScenarioFileLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
