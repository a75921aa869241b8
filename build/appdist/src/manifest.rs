// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The application manifest read by the kernel build.
//!
//! The kernel's `build.rs` splits this file on whitespace to decide which
//! binaries to embed. The format is one line of names separated by a single
//! space, with nothing after the last name.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ManifestError;

pub fn render<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().collect::<Vec<_>>().join(" ")
}

/// Replaces the manifest at `path` with `names`, in order.
pub fn write<'a>(
    path: &Path,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ManifestError> {
    let contents = render(names);
    write_atomic(path, contents.as_bytes()).map_err(|source| ManifestError {
        path: path.to_owned(),
        source,
    })?;
    log::info!("wrote {}: {}", path.display(), contents);
    Ok(())
}

/// Writes `contents` to a temporary file next to `path` and renames it into
/// place, so a reader sees either the old file or the complete new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    // NamedTempFile is created private; keep whatever the old file had.
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_space_separated_without_trailer() {
        assert_eq!(render(["fs", "init"]), "fs init");
        assert_eq!(render(["init"]), "init");
        assert_eq!(render(Vec::<&str>::new()), "");
    }

    #[test]
    fn write_replaces_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.txt");
        fs::write(&path, "old stale list of apps").unwrap();

        write(&path, ["fs", "init", "shell"]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fs init shell");

        // No temporary files are left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(leftovers, ["application.txt"]);
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("os").join("application.txt");
        let err = write(&path, ["init"]).unwrap_err();
        assert_eq!(err.path, path);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_replacement() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.txt");
        fs::write(&path, "init").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write(&path, ["fs"]).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
