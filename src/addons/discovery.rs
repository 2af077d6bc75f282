//! Enumerates installed add-ons under a discovery root.

use std::fs;
use std::io;
use std::path::Path;

use super::loader::manifest_path;

/// Default discovery root, relative to the working directory.
pub const DEFAULT_ADDONS_DIR: &str = "Addons";

/// Names of directories under `root` that contain a loadable unit named after
/// themselves, sorted. A missing root yields an empty list.
pub fn discover_addons(root: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("add-on root {} does not exist", root.display());
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::debug!("skipping unreadable entry in {}: {err}", root.display());
                continue;
            }
        };
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if manifest_path(root, &name).is_file() {
            names.push(name);
        } else {
            log::debug!("skipping {}: no {name}.json", entry.path().display());
        }
    }

    names.sort();
    Ok(names)
}
