use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cap on retained results per check type; oldest entries are evicted first.
pub const MAX_ENTRIES: usize = 15;

/// On-disk shape: `{"results": [entry, …]}`, most-recent-last.
#[derive(Debug, Serialize, Deserialize)]
pub struct History<T> {
    pub results: Vec<T>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

/// Loads the history at `path`. A missing or corrupt file is an empty
/// history, not an error.
pub fn load<T: DeserializeOwned>(path: &Path) -> History<T> {
    match std::fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
        Err(_) => History::default(),
    }
}

/// Appends one entry with read-modify-write semantics and rewrites the whole
/// document. Not safe for concurrent writers; each check type owns its own
/// file and a single loop writes to it.
pub fn append_entry<T>(path: &Path, entry: T) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let mut history = load::<T>(path);
    history.results.push(entry);

    let len = history.results.len();
    if len > MAX_ENTRIES {
        history.results.drain(..len - MAX_ENTRIES);
    }

    let data = serde_json::to_vec_pretty(&history).context("failed to serialize history")?;
    std::fs::write(path, data)
        .with_context(|| format!("failed to write history file {}", path.display()))?;
    Ok(())
}
