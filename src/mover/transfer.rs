//! File transfer helpers

use crate::core::config::TransferMode;
use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// First name in `folder` that does not exist yet
///
/// `IMG.jpg` becomes `IMG-1.jpg`, `IMG-2.jpg`, ... until free.
pub fn unique_name(folder: &Path, name: &str) -> String {
    if !folder.join(name).exists() {
        return name.to_string();
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let suffix = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut i = 1;
    loop {
        let candidate = format!("{}-{}{}", stem, i, suffix);
        if !folder.join(&candidate).exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Copy or move `source` to `target`, creating the target folder
pub fn transfer(source: &Path, target: &Path, mode: TransferMode) -> io::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    match mode {
        TransferMode::Copy => {
            fs::copy(source, target)?;
        }
        TransferMode::Move => {
            // rename fails across filesystems (card -> disk)
            if fs::rename(source, target).is_err() {
                copy_then_remove(source, target, |p: &Path| fs::remove_file(p))?;
            }
        }
    }
    Ok(target.to_path_buf())
}

/// Move fallback: once the copy succeeded the image is downloaded, a source
/// that cannot be removed only leaves a duplicate behind on the card
fn copy_then_remove(
    source: &Path,
    target: &Path,
    remove: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<()> {
    fs::copy(source, target)?;
    if let Err(e) = remove(source) {
        warn!(
            "Copied {} to {} but cannot remove the source: {}",
            source.display(),
            target.display(),
            e
        );
    }
    Ok(())
}
