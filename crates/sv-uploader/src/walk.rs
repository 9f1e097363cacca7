use std::path::{Path, PathBuf};

use sv_core::Result;

/// A regular file discovered under a folder's local root, paired with the
/// slash-separated path the catalog and index document use to address it.
pub struct DiscoveredFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Walks `root` depth-first, returning every regular file found. Symlinks
/// are not followed (mirrors `std::fs::read_dir`'s default, avoiding cycles
/// from a folder symlinked into itself). Entries are returned in the order
/// `read_dir` yields them per directory; callers that need a stable order
/// across runs should sort the result by `relative_path`.
pub async fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(rel_dir) = stack.pop() {
        let dir = root.join(&rel_dir);
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let rel_path = rel_dir.join(entry.file_name());

            if file_type.is_dir() {
                stack.push(rel_path);
            } else if file_type.is_file() {
                let relative_path = rel_path.to_string_lossy().replace('\\', "/");
                out.push(DiscoveredFile { relative_path, absolute_path: root.join(&rel_path) });
            }
        }
    }

    out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovers_nested_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"b").await.unwrap();
        tokio::fs::write(dir.path().join("sub/a.txt"), b"a").await.unwrap();

        let files = discover_files(dir.path()).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["b.txt", "sub/a.txt"]);
    }

    #[tokio::test]
    async fn empty_folder_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = discover_files(dir.path()).await.unwrap();
        assert!(files.is_empty());
    }
}
