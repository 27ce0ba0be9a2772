//! Default DLP sample fixtures, generated next to the agent when no
//! `--file` flags are given.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_FILES: [&str; 3] = [
    "test_credit_card.txt",
    "test_passport.txt",
    "test_dlp_data.csv",
];

const CREDIT_CARD_CONTENT: &str = "John Doe\n\
12345\n\
$50000\n\
john.doe@example.com\n\
4532-1234-5678-9010\n\
123-45-6789\n\
01/15/1980\n";

const PASSPORT_CONTENT: &str = "John Doe\n\
AB1234567\n\
01/15/1980\n\
USA\n";

const CSV_CONTENT: &str = "Card Number,Expiry,CVV,Name\n\
4532-1234-5678-9010,12/27,123,John Doe\n";

/// Returns the DLP sample files to cycle through. Explicit paths win;
/// otherwise the default fixture set under `dir` is used, regenerating all
/// of it when any piece is missing.
pub fn prepare_files(files: Vec<PathBuf>, dir: &Path) -> Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files);
    }

    let defaults: Vec<PathBuf> = DEFAULT_FILES.iter().map(|name| dir.join(name)).collect();
    if defaults.iter().all(|path| path.exists()) {
        return Ok(defaults);
    }

    info!(dir = %dir.display(), "generating default DLP sample files");
    write_fixture(&defaults[0], CREDIT_CARD_CONTENT)?;
    write_fixture(&defaults[1], PASSPORT_CONTENT)?;
    write_fixture(&defaults[2], CSV_CONTENT)?;
    Ok(defaults)
}

fn write_fixture(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("failed to create sample file {}", path.display()))
}
