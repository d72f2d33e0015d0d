use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Resolve the directory holding `snapsecret.db`.
///
/// Priority:
/// 1. an explicit path (from `--data-dir`)
/// 2. `SNAPSECRET_DATA_DIR` environment variable
/// 3. Platform-specific app data dir (`~/.local/share/snapsecret/`, etc.)
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(p) => p.to_owned(),
        None => match std::env::var("SNAPSECRET_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => ProjectDirs::from("", "", "snapsecret")
                .context("could not determine platform data directory")?
                .data_dir()
                .to_owned(),
        },
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir: {}", path.display()))?;
    Ok(path)
}
