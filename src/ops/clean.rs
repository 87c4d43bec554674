//! Implementation of `cmext clean`.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::Workspace;
use crate::util::fs::remove_dir_all_if_exists;

/// Options for the clean command.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Only remove these extensions' build trees (empty = whole target dir)
    pub extensions: Vec<String>,
}

/// Remove build outputs. Returns the directories that existed and were removed.
///
/// Without a filter the whole target directory goes. With one, only the
/// selected extensions' CMake build trees are removed; built modules in a
/// shared output directory are left alone.
pub fn clean(ws: &Workspace, opts: &CleanOptions) -> Result<Vec<PathBuf>> {
    let dirs = if opts.extensions.is_empty() {
        vec![ws.target_dir().to_path_buf()]
    } else {
        ws.select_targets(&opts.extensions)?
            .iter()
            .map(|t| ws.build_root().join(t.name()))
            .collect()
    };

    let mut removed = Vec::new();
    for dir in dirs {
        if dir.exists() {
            remove_dir_all_if_exists(&dir)?;
            tracing::debug!("removed {}", dir.display());
            removed.push(dir);
        }
    }

    Ok(removed)
}
