//! Step outputs reported to the pipeline

use crate::error::{BuildCacheError, BuildCacheResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Output carrying the exact-hit signal
pub const CACHE_HIT_OUTPUT: &str = "cache-hit";

/// Sink for `name=value` step outputs
///
/// Values are echoed to stdout and, when an output file is configured
/// (`GITHUB_OUTPUT`), appended to it. Every value is also kept in memory.
#[derive(Debug, Default)]
pub struct OutputSink {
    file: Option<PathBuf>,
    echo: bool,
    values: Mutex<HashMap<String, String>>,
}

impl OutputSink {
    /// Echo to stdout and append to `file` if given
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            echo: true,
            values: Mutex::new(HashMap::new()),
        }
    }

    /// Keep values in memory only
    pub fn capture() -> Self {
        Self::default()
    }

    /// Report an output value
    pub async fn set(&self, name: &str, value: &str) -> BuildCacheResult<()> {
        if let Some(path) = &self.file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| BuildCacheError::io(format!("opening {}", path.display()), e))?;
            file.write_all(format!("{}={}\n", name, value).as_bytes())
                .await
                .map_err(|e| BuildCacheError::io(format!("writing {}", path.display()), e))?;
        }

        if self.echo {
            println!("{}={}", name, value);
        }

        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Report the cache-hit signal
    pub async fn set_cache_hit(&self, hit: bool) -> BuildCacheResult<()> {
        self.set(CACHE_HIT_OUTPUT, if hit { "true" } else { "false" })
            .await
    }

    /// Value reported for `name`, if any
    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Reported cache-hit signal, if any
    pub fn cache_hit(&self) -> Option<bool> {
        self.get(CACHE_HIT_OUTPUT).map(|v| v == "true")
    }
}
