//! CSV export of the visible table and the directory listing behind the picker.

use crate::category::Category;
use crate::error::{Error, Result};
use crate::rows::Row;
use std::fs;
use std::path::{Path, PathBuf};

pub fn file_name(region: &str, category: Category) -> String {
    format!("{region}-{}.csv", category.title().to_lowercase())
}

pub fn export_path(dir: &Path, region: &str, category: Category) -> PathBuf {
    dir.join(file_name(region, category))
}

/// Header row first, then every row as shown.
pub fn write_csv(path: &Path, headers: &[String], rows: &[Row]) -> Result<()> {
    let export_error = |error: csv::Error| Error::action("export", path.display(), error);

    let mut wtr = csv::Writer::from_path(path).map_err(export_error)?;
    wtr.write_record(headers).map_err(export_error)?;
    for row in rows {
        wtr.write_record(row).map_err(export_error)?;
    }
    wtr.flush().map_err(|error| Error::io(path, error))
}

/// Visible sub-directories of `dir`, sorted by name.
pub fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|error| Error::io(dir, error))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| Error::io(dir, error))?;
        let is_dir = entry
            .file_type()
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::{export_path, file_name, list_dirs, write_csv};
    use crate::category::Category;
    use std::fs;

    #[test]
    fn file_name_combines_region_and_category() {
        assert_eq!(
            file_name("us-chicago-1", Category::GpuNode),
            "us-chicago-1-gpunode.csv"
        );
    }

    #[test]
    fn csv_starts_with_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_path(dir.path(), "us-phoenix-1", Category::Tenant);
        let headers = vec!["Name".to_string(), "Note".to_string()];
        let rows = vec![
            vec!["tenantA".to_string(), "a, b".to_string()],
            vec!["tenantB".to_string(), String::new()],
        ];

        write_csv(&path, &headers, &rows).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(lines, vec!["Name,Note", "tenantA,\"a, b\"", "tenantB,"]);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        assert!(write_csv(&path, &[], &[]).is_err());
    }

    #[test]
    fn listing_skips_files_and_hidden_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        assert_eq!(list_dirs(dir.path()).unwrap(), vec!["a", "b"]);
        assert!(list_dirs(&dir.path().join("nope")).is_err());
    }
}
