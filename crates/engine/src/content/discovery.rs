use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub(crate) struct DiscoveryError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

/// Every `*.xml` under `root`, ordered by `/`-joined relative path so the
/// result is the same on every platform.
pub(crate) fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_cached_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), DiscoveryError> {
    let entries = fs::read_dir(current).map_err(|source| DiscoveryError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn xml_files_are_sorted_by_relative_path_and_others_skipped() {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("scenes")).expect("mkdir");
        fs::write(root.join("templates.xml"), "<Content/>").expect("write");
        fs::write(root.join("scenes").join("icefall.XML"), "<Content/>").expect("write");
        fs::write(root.join("scenes").join("basecamp.xml"), "<Content/>").expect("write");
        fs::write(root.join("notes.txt"), "skip").expect("write");

        let files = collect_xml_files_sorted(root).expect("collect");
        let relative: Vec<String> = files
            .iter()
            .map(|path| normalize_rel_path(path.strip_prefix(root).expect("under root")))
            .collect();
        assert_eq!(
            relative,
            vec!["scenes/basecamp.xml", "scenes/icefall.XML", "templates.xml"]
        );
    }

    #[test]
    fn missing_root_reports_path() {
        let temp = TempDir::new().expect("tempdir");
        let missing = temp.path().join("absent");
        let err = collect_xml_files_sorted(&missing).expect_err("missing dir");
        assert_eq!(err.path, missing);
    }
}
