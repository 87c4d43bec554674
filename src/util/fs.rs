//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::{is_separator, Path, PathBuf, MAIN_SEPARATOR_STR};

use anyhow::{Context, Result};

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it and any missing ancestors.
///
/// Safe to race: a directory created concurrently by another worker is not an
/// error.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Return `path` ending in exactly one path separator.
///
/// Repeated separators and interior `.` components are dropped. Works on the
/// raw `OsStr`, so non-UTF-8 paths pass through unchanged.
pub fn with_trailing_separator(path: &Path) -> PathBuf {
    let mut out = path.components().collect::<PathBuf>().into_os_string();

    let ends_in_separator = out
        .as_encoded_bytes()
        .last()
        .is_some_and(|&b| is_separator(char::from(b)));
    if !ends_in_separator {
        out.push(MAIN_SEPARATOR_STR);
    }

    PathBuf::from(out)
}

/// Resolve `path` against `base` when it is relative.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Canonicalize a path, but don't fail if it doesn't exist yet.
/// Returns the path as-is if canonicalization fails.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_trailing_separator_appended() {
        let out = with_trailing_separator(Path::new("/out/lib"));
        let s = out.to_string_lossy();
        assert!(s.ends_with(MAIN_SEPARATOR_STR));
        assert!(!s.ends_with(&format!("{0}{0}", MAIN_SEPARATOR_STR)));
    }

    #[test]
    fn test_trailing_separator_idempotent() {
        let once = with_trailing_separator(Path::new("/out/lib"));
        let twice = with_trailing_separator(&once);
        assert_eq!(once, twice);
    }

    #[cfg(unix)]
    #[test]
    fn test_trailing_separator_collapses_duplicates() {
        assert_eq!(
            with_trailing_separator(Path::new("/out/lib///")),
            PathBuf::from("/out/lib/")
        );
        assert_eq!(with_trailing_separator(Path::new("/")), PathBuf::from("/"));
    }

    #[cfg(unix)]
    #[test]
    fn test_trailing_separator_keeps_non_utf8_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = Path::new(OsStr::from_bytes(b"/out/caf\xe9//"));
        let out = with_trailing_separator(raw);
        assert_eq!(out.as_os_str().as_bytes(), b"/out/caf\xe9/");
    }

    #[test]
    fn test_ensure_dir_creates_ancestors_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");

        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        // Second call on an existing directory is fine
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_concurrent() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("shared").join("lib");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| ensure_dir(&shared).unwrap());
            }
        });

        assert!(shared.is_dir());
    }

    #[test]
    fn test_absolutize() {
        let base = Path::new("/project");
        assert_eq!(absolutize(base, Path::new("out")), PathBuf::from("/project/out"));
        #[cfg(unix)]
        assert_eq!(absolutize(base, Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn test_remove_dir_all_if_exists() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("target");
        std::fs::create_dir_all(dir.join("build")).unwrap();

        remove_dir_all_if_exists(&dir).unwrap();
        assert!(!dir.exists());

        // Missing directory is not an error
        remove_dir_all_if_exists(&dir).unwrap();
    }
}
