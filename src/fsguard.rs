//! Guarded reads below a declared base directory.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes `path`, dropping `.` and folding `..`.
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|error| Error::io(path, error))?;
        cwd.join(path)
    };
    Ok(clean(&path))
}

/// Resolves `path` and checks that it sits strictly under `base` with one of
/// the allowed extensions.
pub fn check(base: &Path, path: &Path, extensions: &[&str]) -> Result<PathBuf> {
    let base = absolute(base)?;
    let resolved = absolute(path)?;

    if resolved == base || !resolved.starts_with(&base) {
        return Err(Error::PathEscape {
            path: resolved,
            base,
        });
    }

    let allowed = resolved
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)));
    if !allowed {
        return Err(Error::ExtensionNotAllowed { path: resolved });
    }

    Ok(resolved)
}

pub fn read_to_string(base: &Path, path: &Path, extensions: &[&str]) -> Result<String> {
    let resolved = check(base, path, extensions)?;
    std::fs::read_to_string(&resolved).map_err(|error| Error::io(resolved, error))
}

/// Files directly inside `dir` with the given extension, sorted.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|error| Error::io(dir, error))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| Error::io(dir, error))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::{check, clean, list_files, read_to_string};
    use crate::error::Error;
    use std::path::{Path, PathBuf};

    #[test]
    fn clean_folds_parent_and_current_components() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn reads_file_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.tf");
        std::fs::write(&file, "locals {}").unwrap();

        let content = read_to_string(dir.path(), &file, &["tf"]).unwrap();
        assert_eq!(content, "locals {}");
    }

    #[test]
    fn rejects_paths_escaping_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("repo");
        std::fs::create_dir(&base).unwrap();
        let outside = base.join("../secret.json");

        let error = check(&base, &outside, &["json"]).unwrap_err();
        assert!(matches!(error, Error::PathEscape { .. }));

        let error = check(&base, &base, &["json"]).unwrap_err();
        assert!(matches!(error, Error::PathEscape { .. }));
    }

    #[test]
    fn rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.sh");

        let error = check(dir.path(), &file, &["yaml", "yml"]).unwrap_err();
        assert!(matches!(error, Error::ExtensionNotAllowed { .. }));
        assert!(check(dir.path(), &dir.path().join("a.YAML"), &["yaml"]).is_ok());
    }

    #[test]
    fn list_files_is_sorted_and_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.tf"), "").unwrap();
        std::fs::write(dir.path().join("a.tf"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.tf"), "").unwrap();

        let names = list_files(dir.path(), "tf")
            .unwrap()
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.tf", "b.tf"]);
    }
}
