use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "gif"];

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Recursively collect PDF files under `root`, skipping anything inside
/// `exclude` (typically the pending "tbd" folder). Missing roots are logged
/// and yield an empty list so batch callers keep going.
pub fn find_pdfs(root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
    if !root.exists() {
        error!(path = %root.display(), "Scan root does not exist");
        return Vec::new();
    }
    let exclude = exclude.map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));

    let mut pdfs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                error!(error = %err, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "pdf"))
        .map(|e| e.into_path())
        .filter(|p| {
            let Some(excluded) = exclude.as_deref() else {
                return true;
            };
            let resolved = p.canonicalize().unwrap_or_else(|_| p.clone());
            if resolved.starts_with(excluded) {
                debug!(path = %p.display(), "Skipping file in excluded folder");
                false
            } else {
                true
            }
        })
        .collect();
    pdfs.sort();
    pdfs
}

/// Spreadsheets under `root`, searched recursively. Used by the order
/// extractor, which pulls rows out of exported shop order sheets.
pub fn find_xlsx(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        error!(path = %root.display(), "Scan root does not exist");
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "xlsx"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// PDFs directly inside `dir` (no recursion), optionally skipping named
/// subfolders. Used by the pending-folder tools, where `done/` and
/// `duplicates/` live under the folder being processed.
pub fn find_pdfs_shallow(dir: &Path) -> Vec<PathBuf> {
    list_by_extensions(dir, &["pdf"])
}

/// Raster images directly inside `dir` (no recursion).
pub fn find_images(dir: &Path) -> Vec<PathBuf> {
    list_by_extensions(dir, IMAGE_EXTENSIONS)
}

fn list_by_extensions(dir: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(path = %dir.display(), error = %e, "Cannot read directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && exts.iter().any(|ext| has_extension(p, ext)))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn recursive_scan_skips_excluded_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("tbd")).unwrap();
        fs::write(root.join("one.pdf"), b"x").unwrap();
        fs::write(root.join("a/b/two.PDF"), b"x").unwrap();
        fs::write(root.join("tbd/three.pdf"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let all = find_pdfs(root, None);
        assert_eq!(all.len(), 3);

        let excluded = find_pdfs(root, Some(&root.join("tbd")));
        assert_eq!(excluded.len(), 2);
        assert!(excluded.iter().all(|p| !p.starts_with(root.join("tbd"))));
    }

    #[test]
    fn missing_root_yields_empty() {
        assert!(find_pdfs(Path::new("/no/such/dir"), None).is_empty());
        assert!(find_images(Path::new("/no/such/dir")).is_empty());
    }

    #[test]
    fn shallow_scan_ignores_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("done")).unwrap();
        fs::write(root.join("a.pdf"), b"x").unwrap();
        fs::write(root.join("done/b.pdf"), b"x").unwrap();
        fs::write(root.join("c.jpg"), b"x").unwrap();

        assert_eq!(find_pdfs_shallow(root).len(), 1);
        assert_eq!(find_images(root).len(), 1);
    }
}
